//! Aggregate statistics endpoint.

use actix_web::{web, HttpResponse};

use crate::beacon::RandomnessBeacon;
use crate::error::ApiError;
use crate::services::ItemService;

pub async fn get<B: RandomnessBeacon>(
    service: web::Data<ItemService<B>>,
) -> Result<HttpResponse, ApiError> {
    let view = service.stats().await?;
    Ok(HttpResponse::Ok().json(view))
}
