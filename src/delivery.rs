//! Upstream SMS provider client.
//!
//! One request carries a whole batch. The reply is decoded into exactly one
//! [`DeliveryOutcome`] per submitted message.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ProviderConfig;

pub const DEFAULT_PRIORITY: &str = "1";
const SUCCESS_STATUS: &str = "success";

/// A message ready for the provider; `number` is already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub number: String,
    pub message: String,
    pub sender_id: Option<String>,
    pub priority: Option<String>,
}

impl OutboundMessage {
    pub fn effective_sender_id<'a>(&'a self, default_sender_id: &'a str) -> &'a str {
        self.sender_id
            .as_deref()
            .filter(|value| !value.is_empty())
            .unwrap_or(default_sender_id)
    }

    pub fn effective_priority(&self) -> &str {
        self.priority
            .as_deref()
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_PRIORITY)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Message", default)]
    pub message: String,
}

impl DeliveryOutcome {
    pub fn new(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case(SUCCESS_STATUS)
    }
}

/// The provider could not be reached or its reply could not be read.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("provider request timed out")]
    Timeout,
    #[error("failed to send SMS request: {0}")]
    Request(String),
    #[error("failed to read provider response: {0}")]
    Body(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_body() || err.is_decode() {
            TransportError::Body(err.without_url().to_string())
        } else {
            TransportError::Request(err.without_url().to_string())
        }
    }
}

#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// Returns one outcome per message, positionally aligned with `messages`.
    async fn deliver(
        &self,
        messages: &[OutboundMessage],
        default_sender_id: &str,
    ) -> Result<Vec<DeliveryOutcome>, TransportError>;
}

/// key: egosms-client -> json SendSms over https
pub struct EgoSmsClient {
    client: reqwest::Client,
    endpoint: String,
    username: String,
    password: String,
}

impl EgoSmsClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build SMS provider client")?;
        Ok(Self {
            client,
            endpoint: config.endpoint().to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn payload(&self, messages: &[OutboundMessage], default_sender_id: &str) -> serde_json::Value {
        let msgdata: Vec<serde_json::Value> = messages
            .iter()
            .map(|msg| {
                json!({
                    "number": msg.number,
                    "message": msg.message,
                    "senderid": msg.effective_sender_id(default_sender_id),
                    "priority": msg.effective_priority(),
                })
            })
            .collect();

        json!({
            "method": "SendSms",
            "userdata": {
                "username": self.username,
                "password": self.password,
            },
            "msgdata": msgdata,
        })
    }
}

#[async_trait]
impl DeliveryClient for EgoSmsClient {
    async fn deliver(
        &self,
        messages: &[OutboundMessage],
        default_sender_id: &str,
    ) -> Result<Vec<DeliveryOutcome>, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&self.payload(messages, default_sender_id))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(%status, "provider answered with a non-success HTTP status");
        }
        debug!(%status, batch = messages.len(), "provider replied");

        Ok(decode_outcomes(&body, messages.len()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProviderReply {
    Many(Vec<DeliveryOutcome>),
    One(DeliveryOutcome),
}

/// Maps a raw reply onto `count` outcomes. An object applies to every message, an array
/// is matched positionally with its first element filling gaps. Anything else becomes a
/// `Failed` outcome carrying the raw body.
pub fn decode_outcomes(body: &str, count: usize) -> Vec<DeliveryOutcome> {
    let outcomes = match serde_json::from_str::<ProviderReply>(body) {
        Ok(ProviderReply::One(outcome)) => vec![outcome],
        Ok(ProviderReply::Many(outcomes)) => outcomes,
        Err(e) => {
            warn!(?e, body, "unexpected provider response format");
            vec![DeliveryOutcome::new("Failed", body)]
        }
    };

    let Some(first) = outcomes.first().cloned() else {
        return vec![DeliveryOutcome::new("Failed", "provider returned no outcome"); count];
    };

    (0..count)
        .map(|index| outcomes.get(index).cloned().unwrap_or_else(|| first.clone()))
        .collect()
}

pub mod testing {
    use std::collections::VecDeque;

    use tokio::sync::Mutex;

    use super::*;

    /// Replays queued replies and records every batch it was asked to deliver.
    /// Once the queue drains, every message succeeds.
    #[derive(Default)]
    pub struct ScriptedDeliveryClient {
        replies: Mutex<VecDeque<Result<Vec<DeliveryOutcome>, TransportError>>>,
        batches: Mutex<Vec<Vec<OutboundMessage>>>,
    }

    impl ScriptedDeliveryClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn push_reply(&self, reply: Result<Vec<DeliveryOutcome>, TransportError>) {
            self.replies.lock().await.push_back(reply);
        }

        pub async fn push_statuses(&self, statuses: &[&str]) {
            let outcomes = statuses
                .iter()
                .map(|status| DeliveryOutcome::new(*status, format!("{status} from provider")))
                .collect();
            self.push_reply(Ok(outcomes)).await;
        }

        pub async fn batches(&self) -> Vec<Vec<OutboundMessage>> {
            self.batches.lock().await.clone()
        }
    }

    #[async_trait]
    impl DeliveryClient for ScriptedDeliveryClient {
        async fn deliver(
            &self,
            messages: &[OutboundMessage],
            _default_sender_id: &str,
        ) -> Result<Vec<DeliveryOutcome>, TransportError> {
            self.batches.lock().await.push(messages.to_vec());
            match self.replies.lock().await.pop_front() {
                Some(Ok(outcomes)) => {
                    let body = serde_json::to_string(&outcomes).unwrap_or_default();
                    Ok(decode_outcomes(&body, messages.len()))
                }
                Some(Err(err)) => Err(err),
                None => Ok(vec![
                    DeliveryOutcome::new("Success", "SMS sent successfully");
                    messages.len()
                ]),
            }
        }
    }
}
