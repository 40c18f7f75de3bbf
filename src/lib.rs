pub mod auth;
pub mod clients;
pub mod config;
pub mod db;
pub mod delivery;
pub mod error;
pub mod extractor;
pub mod phone;
pub mod rate_limit;
pub mod routes;
pub mod sms;
pub mod store;

pub use config::GatewayConfig;
pub use routes::{build_app, with_metrics, Gateway};
