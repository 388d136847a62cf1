use std::sync::Arc;
use std::time::Instant;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tracing::info;

use timevault::beacon::http::HttpBeaconClient;
use timevault::config::Config;
use timevault::handlers::{self, health::StartTime};
use timevault::middleware::RequireToken;
use timevault::models::api_token;
use timevault::services::ItemService;
use timevault::{db, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_telemetry();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url)?;
    {
        let mut conn = pool.get().context("Failed to get DB connection")?;
        db::init_schema(&mut conn)?;

        let now = chrono::Utc::now().timestamp_millis();
        match &config.bootstrap_token {
            Some(token) => {
                if api_token::ApiToken::ensure_bootstrap(&mut conn, token, now)? {
                    info!("bootstrap token installed from BOOTSTRAP_TOKEN");
                }
            }
            None => {
                if api_token::ApiToken::count(&mut conn)? == 0 {
                    let generated = api_token::generate_token();
                    api_token::ApiToken::ensure_bootstrap(&mut conn, &generated, now)?;
                    // Printed once so the operator can capture the initial
                    // credential; it is never logged again.
                    info!("generated bootstrap token: {generated}");
                }
            }
        }
    }

    let beacon = Arc::new(
        HttpBeaconClient::connect(&config.beacon_url, &config.beacon_chain_hash)
            .await
            .context("Failed to connect to randomness beacon")?,
    );

    let service = web::Data::new(ItemService::new(pool.clone(), beacon));
    let pool_data = web::Data::new(pool);
    let start_time = web::Data::new(StartTime(Instant::now()));

    info!(addr = %config.bind_addr, "starting timevault server");

    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(pool_data.clone())
            .app_data(start_time.clone())
            .route("/api/health", web::get().to(handlers::health::get))
            .service(
                web::scope("/api/v1")
                    .wrap(RequireToken::new(pool_data.clone()))
                    .configure(handlers::configure::<HttpBeaconClient>),
            )
    })
    .bind(&config.bind_addr)?
    .run()
    .await?;

    Ok(())
}
