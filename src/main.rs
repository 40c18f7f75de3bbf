use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use sms_gateway::auth::Authenticator;
use sms_gateway::clients::ClientAdmin;
use sms_gateway::delivery::EgoSmsClient;
use sms_gateway::phone::PhoneNormalizer;
use sms_gateway::rate_limit::RateLimiter;
use sms_gateway::sms::{SmsService, UsageResetScheduler};
use sms_gateway::store::PgStore;
use sms_gateway::{build_app, with_metrics, Gateway, GatewayConfig};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    let config = GatewayConfig::from_env()?;
    if config.admin.is_default() {
        tracing::warn!("ADMIN_USER/ADMIN_PASSWORD not set; using default admin credentials");
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    if let Err(error) = sqlx::migrate!().run(&pool).await {
        if config.allow_migration_failure {
            tracing::warn!(
                ?error,
                "Database migrations failed but continuing due to ALLOW_MIGRATION_FAILURE"
            );
        } else {
            return Err(error).context("database migrations failed");
        }
    }

    let store = Arc::new(PgStore::new(pool));
    let delivery = Arc::new(EgoSmsClient::new(&config.provider)?);
    tracing::info!(
        endpoint = delivery.endpoint(),
        sandbox = config.provider.sandbox_mode,
        "SMS provider configured"
    );

    let gateway = Gateway {
        sms: Arc::new(SmsService::new(
            store.clone(),
            store.clone(),
            delivery,
            PhoneNormalizer::new(config.default_country_code.clone()),
            config.provider.sender_id.clone(),
        )),
        admin: Arc::new(ClientAdmin::new(store.clone(), config.client_defaults)),
        authenticator: Arc::new(Authenticator::new(store.clone(), &config.admin)),
        rate_limiter: Arc::new(RateLimiter::new()),
    };

    let resets = UsageResetScheduler::new(store).spawn();
    let app = with_metrics(build_app(gateway));

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.bind_port)
        .parse()
        .context("invalid BIND_ADDRESS/BIND_PORT")?;
    tracing::info!(%addr, "Listening for incoming connections");
    axum::Server::bind(&addr)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    resets.shutdown().await;
    Ok(())
}
