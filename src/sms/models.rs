use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// key: sms-log-status -> pending,sent,failed
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }

    /// Lenient read of the text column; unknown values count as pending.
    pub fn from_column(value: &str) -> Self {
        value.parse().unwrap_or(DeliveryStatus::Pending)
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(DeliveryStatus::Pending),
            "sent" => Ok(DeliveryStatus::Sent),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(format!(
                "unknown status `{other}`, expected one of `pending`, `sent`, `failed`"
            )),
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// key: sms-log-entry -> append-only audit record
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendLogEntry {
    pub id: Uuid,
    pub client_id: Uuid,
    pub recipient: String,
    pub message: String,
    pub sender_id: String,
    pub priority: String,
    pub status: DeliveryStatus,
    pub provider_status: String,
    pub provider_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

/// Caller details captured alongside every log entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    pub ip_address: String,
    pub user_agent: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SmsRequest {
    pub number: String,
    pub message: String,
    #[serde(default)]
    pub senderid: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BulkSmsRequest {
    pub messages: Vec<SmsRequest>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderResponse {
    pub status: String,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendResult {
    pub log_id: Uuid,
    pub recipient: String,
    pub status: DeliveryStatus,
    pub provider_response: ProviderResponse,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkItemResult {
    pub log_id: Uuid,
    pub recipient: String,
    pub status: DeliveryStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkSendSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<BulkItemResult>,
}

pub const DEFAULT_LOG_LIMIT: i64 = 50;
pub const MAX_LOG_LIMIT: i64 = 500;

/// Treats `?field=` the same as an absent field.
pub(crate) fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LogQueryParams {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub limit: Option<i64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub offset: Option<i64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub status: Option<DeliveryStatus>,
}

/// Normalized paging window for log retrieval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogQuery {
    pub limit: i64,
    pub offset: i64,
    pub status: Option<DeliveryStatus>,
}

impl From<LogQueryParams> for LogQuery {
    fn from(params: LogQueryParams) -> Self {
        Self {
            limit: params
                .limit
                .unwrap_or(DEFAULT_LOG_LIMIT)
                .clamp(1, MAX_LOG_LIMIT),
            offset: params.offset.unwrap_or(0).max(0),
            status: params.status,
        }
    }
}

impl Default for LogQuery {
    fn default() -> Self {
        LogQueryParams::default().into()
    }
}
