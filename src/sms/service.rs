use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clients::{Client, ClientStats};
use crate::delivery::{DeliveryClient, DeliveryOutcome, OutboundMessage};
use crate::error::{AppError, AppResult};
use crate::phone::PhoneNormalizer;
use crate::store::{ClientStore, SendLogStore};

use super::models::{
    BulkItemResult, BulkSendSummary, DeliveryStatus, LogQuery, ProviderResponse, RequestMetadata,
    SendLogEntry, SendResult, SmsRequest,
};

/// Provider status recorded when the upstream could not be reached at all.
const TRANSPORT_FAILURE_STATUS: &str = "error";

/// key: send-orchestrator -> validate, deliver, audit, account
pub struct SmsService {
    clients: Arc<dyn ClientStore>,
    logs: Arc<dyn SendLogStore>,
    delivery: Arc<dyn DeliveryClient>,
    normalizer: PhoneNormalizer,
    sender_id: Option<String>,
}

impl SmsService {
    pub fn new(
        clients: Arc<dyn ClientStore>,
        logs: Arc<dyn SendLogStore>,
        delivery: Arc<dyn DeliveryClient>,
        normalizer: PhoneNormalizer,
        sender_id: Option<String>,
    ) -> Self {
        Self {
            clients,
            logs,
            delivery,
            normalizer,
            sender_id,
        }
    }

    /// Configured sender id, falling back to the client's display name.
    pub fn default_sender_id(&self, client: &Client) -> String {
        self.sender_id
            .clone()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| client.name.clone())
    }

    pub async fn send_single(
        &self,
        client: &Client,
        request: SmsRequest,
        metadata: &RequestMetadata,
    ) -> AppResult<SendResult> {
        let outbound = self.prepare(&request).map_err(|detail| {
            AppError::validation(detail.message(), detail.to_string())
        })?;
        let default_sender = self.default_sender_id(client);

        let outcome = match self
            .delivery
            .deliver(std::slice::from_ref(&outbound), &default_sender)
            .await
        {
            Ok(outcomes) => positional_outcome(&outcomes, 0),
            Err(err) => {
                warn!(client_id = %client.id, ?err, "provider unreachable for single send");
                let mut entry = self.log_entry(
                    client,
                    &outbound,
                    &default_sender,
                    &DeliveryOutcome::new(TRANSPORT_FAILURE_STATUS, ""),
                    metadata,
                );
                entry.error = Some(err.to_string());
                if let Err(e) = self.logs.append_log(&entry).await {
                    error!(?e, client_id = %client.id, "failed to persist transport failure log");
                }
                return Err(AppError::Transport {
                    context: "Failed to send SMS",
                    source: err,
                });
            }
        };

        let entry = self.log_entry(client, &outbound, &default_sender, &outcome, metadata);
        let persisted = self.logs.append_log(&entry).await;
        if entry.status == DeliveryStatus::Sent {
            self.record_usage(client.id, 1).await?;
        }
        persisted.map_err(|e| {
            error!(?e, log_id = %entry.id, "failed to persist send log");
            AppError::Db(e)
        })?;

        info!(
            client_id = %client.id,
            log_id = %entry.id,
            status = %entry.status,
            "single SMS processed"
        );

        Ok(SendResult {
            log_id: entry.id,
            recipient: entry.recipient,
            status: entry.status,
            provider_response: ProviderResponse {
                status: outcome.status,
                message: outcome.message,
            },
        })
    }

    pub async fn send_bulk(
        &self,
        client: &Client,
        requests: Vec<SmsRequest>,
        metadata: &RequestMetadata,
    ) -> AppResult<BulkSendSummary> {
        if requests.is_empty() {
            return Err(AppError::invalid_payload(
                "messages must contain at least one entry",
            ));
        }
        let outbound = requests
            .iter()
            .map(|request| self.prepare(request))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|detail| match detail {
                Rejected::InvalidNumber(_) => {
                    AppError::validation("Invalid phone number in messages", detail.to_string())
                }
                Rejected::EmptyMessage => AppError::invalid_payload(detail.to_string()),
            })?;

        if !client.fits_daily_quota(outbound.len()) {
            info!(
                client_id = %client.id,
                requested = outbound.len(),
                daily_usage = client.daily_usage,
                daily_limit = client.daily_limit,
                "bulk request rejected by daily quota"
            );
            return Err(AppError::QuotaExceeded);
        }

        let default_sender = self.default_sender_id(client);
        let outcomes = self
            .delivery
            .deliver(&outbound, &default_sender)
            .await
            .map_err(|err| {
                warn!(client_id = %client.id, ?err, "provider unreachable for bulk send");
                AppError::Transport {
                    context: "Failed to send bulk SMS",
                    source: err,
                }
            })?;

        let mut results = Vec::with_capacity(outbound.len());
        let mut successful = 0_usize;
        let mut persist_error = None;
        for (index, message) in outbound.iter().enumerate() {
            let outcome = positional_outcome(&outcomes, index);
            let entry = self.log_entry(client, message, &default_sender, &outcome, metadata);
            if entry.status == DeliveryStatus::Sent {
                successful += 1;
            }
            if let Err(e) = self.logs.append_log(&entry).await {
                error!(?e, log_id = %entry.id, "failed to persist bulk send log");
                persist_error.get_or_insert(e);
            }
            results.push(BulkItemResult {
                log_id: entry.id,
                recipient: entry.recipient,
                status: entry.status,
            });
        }

        if successful > 0 {
            let delta = i32::try_from(successful)
                .map_err(|_| AppError::Internal("bulk batch too large".into()))?;
            self.record_usage(client.id, delta).await?;
        }
        if let Some(e) = persist_error {
            return Err(AppError::Db(e));
        }

        let total = results.len();
        info!(
            client_id = %client.id,
            total,
            successful,
            failed = total - successful,
            "bulk SMS processed"
        );

        Ok(BulkSendSummary {
            total,
            successful,
            failed: total - successful,
            results,
        })
    }

    pub async fn list_logs(&self, client: &Client, query: LogQuery) -> AppResult<Vec<SendLogEntry>> {
        self.logs
            .list_logs(client.id, &query)
            .await
            .map_err(|e| {
                error!(?e, client_id = %client.id, "failed to load send logs");
                AppError::Db(e)
            })
    }

    pub fn stats(&self, client: &Client) -> ClientStats {
        client.stats()
    }

    fn prepare(&self, request: &SmsRequest) -> Result<OutboundMessage, Rejected> {
        if !self.normalizer.is_valid(&request.number) {
            return Err(Rejected::InvalidNumber(request.number.clone()));
        }
        if request.message.trim().is_empty() {
            return Err(Rejected::EmptyMessage);
        }
        Ok(OutboundMessage {
            number: self.normalizer.normalize(&request.number),
            message: request.message.clone(),
            sender_id: request.senderid.clone(),
            priority: request.priority.clone(),
        })
    }

    fn log_entry(
        &self,
        client: &Client,
        message: &OutboundMessage,
        default_sender: &str,
        outcome: &DeliveryOutcome,
        metadata: &RequestMetadata,
    ) -> SendLogEntry {
        let sent = outcome.is_success();
        SendLogEntry {
            id: Uuid::new_v4(),
            client_id: client.id,
            recipient: message.number.clone(),
            message: message.message.clone(),
            sender_id: message.effective_sender_id(default_sender).to_string(),
            priority: message.effective_priority().to_string(),
            status: if sent {
                DeliveryStatus::Sent
            } else {
                DeliveryStatus::Failed
            },
            provider_status: outcome.status.clone(),
            provider_message: outcome.message.clone(),
            error: (!sent).then(|| outcome.message.clone()),
            ip_address: metadata.ip_address.clone(),
            user_agent: metadata.user_agent.clone(),
            created_at: Utc::now(),
        }
    }

    async fn record_usage(&self, client_id: Uuid, delta: i32) -> AppResult<()> {
        let updated = self
            .clients
            .increment_usage(client_id, delta)
            .await
            .map_err(|e| {
                error!(?e, %client_id, delta, "failed to increment usage counters");
                AppError::Db(e)
            })?;
        if !updated {
            warn!(%client_id, delta, "usage increment matched no client");
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum Rejected {
    #[error("Phone number {0} is invalid")]
    InvalidNumber(String),
    #[error("message must not be empty")]
    EmptyMessage,
}

impl Rejected {
    fn message(&self) -> &'static str {
        match self {
            Rejected::InvalidNumber(_) => "Invalid phone number",
            Rejected::EmptyMessage => "Invalid request payload",
        }
    }
}

fn positional_outcome(outcomes: &[DeliveryOutcome], index: usize) -> DeliveryOutcome {
    outcomes
        .get(index)
        .or_else(|| outcomes.first())
        .cloned()
        .unwrap_or_else(|| DeliveryOutcome::new("Failed", "provider returned no outcome"))
}
