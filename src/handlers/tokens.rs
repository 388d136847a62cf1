//! Token administration endpoints.
//!
//! These sit behind the same bearer-token gate as the item routes; any active
//! token can manage the allow-list.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::db::{self, DbPool};
use crate::error::ApiError;
use crate::models::api_token::ApiToken;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenView {
    pub token: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: i64,
    pub last_used_at: Option<i64>,
}

impl From<ApiToken> for TokenView {
    fn from(t: ApiToken) -> Self {
        TokenView {
            token: t.token,
            name: t.name,
            is_active: t.is_active,
            created_at: t.created_at,
            last_used_at: t.last_used_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTokenRequest {
    pub is_active: bool,
}

pub async fn list(pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let tokens = db::run(pool.get_ref(), ApiToken::list).await?;
    let views: Vec<TokenView> = tokens.into_iter().map(TokenView::from).collect();
    Ok(HttpResponse::Ok().json(views))
}

pub async fn create(
    pool: web::Data<DbPool>,
    body: web::Json<CreateTokenRequest>,
) -> Result<HttpResponse, ApiError> {
    let name = body.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::validation("Name cannot be empty"));
    }

    let now = chrono::Utc::now().timestamp_millis();
    let token = db::run(pool.get_ref(), move |conn| {
        ApiToken::create(conn, &name, now)
    })
    .await?;

    Ok(HttpResponse::Created().json(TokenView::from(token)))
}

pub async fn update(
    pool: web::Data<DbPool>,
    path: web::Path<String>,
    body: web::Json<UpdateTokenRequest>,
) -> Result<HttpResponse, ApiError> {
    let token = path.into_inner();
    let active = body.is_active;

    let updated = {
        let token = token.clone();
        db::run(pool.get_ref(), move |conn| {
            ApiToken::set_active(conn, &token, active)
        })
        .await?
    };
    if !updated {
        return Err(ApiError::TokenNotFound);
    }

    let reloaded = db::run(pool.get_ref(), move |conn| ApiToken::find(conn, &token))
        .await?
        .ok_or(ApiError::TokenNotFound)?;

    Ok(HttpResponse::Ok().json(TokenView::from(reloaded)))
}

pub async fn delete(
    pool: web::Data<DbPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let token = path.into_inner();
    let deleted = db::run(pool.get_ref(), move |conn| ApiToken::delete(conn, &token)).await?;

    if !deleted {
        return Err(ApiError::TokenNotFound);
    }
    Ok(HttpResponse::NoContent().finish())
}
