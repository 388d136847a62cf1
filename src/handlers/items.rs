//! Item endpoints.
//!
//! Thin translation layer: deserialize, call the service, serialize. All
//! policy lives in [`ItemService`].

use actix_web::{web, HttpResponse};

use crate::beacon::RandomnessBeacon;
use crate::error::ApiError;
use crate::services::items::{CreateItemRequest, ListQuery};
use crate::services::ItemService;

pub async fn create<B: RandomnessBeacon>(
    service: web::Data<ItemService<B>>,
    body: web::Json<CreateItemRequest>,
) -> Result<HttpResponse, ApiError> {
    let view = service.create(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(view))
}

pub async fn create_batch<B: RandomnessBeacon>(
    service: web::Data<ItemService<B>>,
    body: web::Json<Vec<CreateItemRequest>>,
) -> Result<HttpResponse, ApiError> {
    let outcome = service.create_batch(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(outcome))
}

pub async fn get<B: RandomnessBeacon>(
    service: web::Data<ItemService<B>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let view = service.read(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn list<B: RandomnessBeacon>(
    service: web::Data<ItemService<B>>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let view = service.list(query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(view))
}

#[derive(Debug, serde::Deserialize)]
pub struct ExtendRequest {
    pub minutes: i64,
}

pub async fn extend<B: RandomnessBeacon>(
    service: web::Data<ItemService<B>>,
    path: web::Path<String>,
    body: web::Json<ExtendRequest>,
) -> Result<HttpResponse, ApiError> {
    let outcome = service.extend(&path.into_inner(), body.minutes).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

pub async fn delete<B: RandomnessBeacon>(
    service: web::Data<ItemService<B>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    service.delete(&path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
