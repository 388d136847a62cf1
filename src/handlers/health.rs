//! Liveness endpoint, mounted outside the auth gate.

use actix_web::{web, HttpResponse};
use diesel::prelude::*;
use diesel::sql_query;
use serde::Serialize;
use std::time::Instant;

use crate::db::{self, DbPool};

/// Process start time, registered as app data at boot.
#[derive(Clone, Copy)]
pub struct StartTime(pub Instant);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    database: &'static str,
}

pub async fn get(pool: web::Data<DbPool>, started: web::Data<StartTime>) -> HttpResponse {
    let database = match db::run(pool.get_ref(), |conn| {
        sql_query("SELECT 1;")
            .execute(conn)
            .map_err(anyhow::Error::new)
    })
    .await
    {
        Ok(_) => "ok",
        Err(e) => {
            tracing::error!("health check database probe failed: {e:#}");
            "error"
        }
    };

    let status = if database == "ok" { "ok" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: started.0.elapsed().as_secs(),
        database,
    })
}
