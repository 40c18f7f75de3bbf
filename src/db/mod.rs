pub mod api_clients;
pub mod sms_logs;
