pub mod api;
pub mod models;
pub mod scheduler;
pub mod service;

pub use models::{
    BulkItemResult, BulkSendSummary, BulkSmsRequest, DeliveryStatus, LogQuery, LogQueryParams,
    ProviderResponse, RequestMetadata, SendLogEntry, SendResult, SmsRequest, DEFAULT_LOG_LIMIT,
    MAX_LOG_LIMIT,
};
pub use scheduler::{
    process_reset as run_usage_reset, Cadence, Clock, SystemClock, UsageResetHandle,
    UsageResetScheduler,
};
pub use service::SmsService;
