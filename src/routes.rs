use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Extension, Json, Router,
};
use axum_prometheus::PrometheusMetricLayer;
use serde_json::{json, Value};

use crate::auth::Authenticator;
use crate::clients::{self, ClientAdmin};
use crate::rate_limit::RateLimiter;
use crate::sms::{self, SmsService};

/// Shared components handed to the handlers as request extensions.
#[derive(Clone)]
pub struct Gateway {
    pub sms: Arc<SmsService>,
    pub admin: Arc<ClientAdmin>,
    pub authenticator: Arc<Authenticator>,
    pub rate_limiter: Arc<RateLimiter>,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "SMS Gateway API" }))
}

pub fn api_routes() -> Router {
    Router::new()
        .route("/api/v1/sms/send", post(sms::api::send_sms))
        .route("/api/v1/sms/send/bulk", post(sms::api::send_bulk_sms))
        .route("/api/v1/sms/logs", get(sms::api::list_logs))
        .route("/api/v1/sms/stats", get(sms::api::stats))
        .route(
            "/api/v1/admin/clients",
            get(clients::api::list_clients).post(clients::api::create_client),
        )
        .route(
            "/api/v1/admin/clients/:id",
            put(clients::api::update_client).delete(clients::api::delete_client),
        )
        .route(
            "/api/v1/admin/clients/:id/reset",
            post(clients::api::reset_client_usage),
        )
}

pub fn build_app(gateway: Gateway) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(api_routes())
        .layer(Extension(gateway.sms))
        .layer(Extension(gateway.admin))
        .layer(Extension(gateway.authenticator))
        .layer(Extension(gateway.rate_limiter))
}

/// Adds request metrics and the `/metrics` exposition route. Installs the global
/// recorder, so call it once per process.
pub fn with_metrics(app: Router) -> Router {
    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    app.route(
        "/metrics",
        get(move || async move { metrics_handle.render() }),
    )
    .layer(prometheus_layer)
}
