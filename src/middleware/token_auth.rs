//! Bearer token authentication middleware.
//!
//! Every `/api/v1` request must carry `Authorization: Bearer tok_xxx`. The
//! token is looked up in the allow-list; missing, unknown and disabled tokens
//! each get their own error code so clients can tell misconfiguration from
//! revocation. Lookups fail closed on database errors.

use actix_web::{
    body::{BoxBody, EitherBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, ResponseError,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use tracing::{error, warn};

use crate::db::DbPool;
use crate::error::ApiError;
use crate::models::api_token::ApiToken;

/// Authenticated token context attached to request extensions.
#[derive(Clone, Debug)]
pub struct TokenContext {
    pub token: String,
    pub name: String,
}

pub struct RequireToken {
    pool: actix_web::web::Data<DbPool>,
}

impl RequireToken {
    pub fn new(pool: actix_web::web::Data<DbPool>) -> Self {
        Self { pool }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireToken
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireTokenMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireTokenMiddleware {
            service: Rc::new(service),
            pool: self.pool.clone(),
        }))
    }
}

pub struct RequireTokenMiddleware<S> {
    service: Rc<S>,
    pool: actix_web::web::Data<DbPool>,
}

fn reject<B>(req: ServiceRequest, err: ApiError) -> ServiceResponse<EitherBody<B, BoxBody>> {
    let response = err.error_response();
    req.into_response(response).map_into_right_body()
}

impl<S, B> Service<ServiceRequest> for RequireTokenMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();
        let pool = self.pool.clone();

        Box::pin(async move {
            let raw_token = match extract_bearer_token(&req) {
                Some(token) => token,
                None => {
                    return Ok(reject(
                        req,
                        ApiError::Unauthorized {
                            code: "MISSING_TOKEN",
                            message: "Provide a token via 'Authorization: Bearer tok_xxx'",
                        },
                    ));
                }
            };

            let lookup = {
                let token = raw_token.clone();
                let pool = pool.clone();
                crate::db::run(pool.get_ref(), move |conn| ApiToken::find(conn, &token)).await
            };

            let record = match lookup {
                Ok(Some(record)) => record,
                Ok(None) => {
                    warn!("request carried an unknown API token");
                    return Ok(reject(
                        req,
                        ApiError::Unauthorized {
                            code: "INVALID_TOKEN",
                            message: "Token is not recognized",
                        },
                    ));
                }
                Err(e) => {
                    return Ok(reject(req, ApiError::Internal(e)));
                }
            };

            if !record.is_active {
                warn!(name = %record.name, "request carried a disabled API token");
                return Ok(reject(
                    req,
                    ApiError::Unauthorized {
                        code: "TOKEN_DISABLED",
                        message: "Token has been disabled",
                    },
                ));
            }

            // Best-effort usage tracking; never blocks the request.
            {
                let token = record.token.clone();
                let pool = pool.clone();
                tokio::spawn(async move {
                    let now = chrono::Utc::now().timestamp_millis();
                    let result = crate::db::run(pool.get_ref(), move |conn| {
                        ApiToken::touch_last_used(conn, &token, now)
                    })
                    .await;
                    if let Err(e) = result {
                        error!("failed to record token usage: {e:#}");
                    }
                });
            }

            req.extensions_mut().insert(TokenContext {
                token: record.token,
                name: record.name,
            });

            let res = svc.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}

fn extract_bearer_token(req: &ServiceRequest) -> Option<String> {
    let header = req.headers().get("Authorization")?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}
