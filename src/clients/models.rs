use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::config::ClientDefaults;

/// key: client-model -> identity,credentials,quota state
/// Full persisted record. Carries the secret hash, so it is never serialized directly;
/// use [`ClientRecord`] for anything that leaves the process.
#[derive(Debug, Clone, FromRow)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub api_key: String,
    pub api_secret_hash: String,
    pub is_active: bool,
    pub rate_limit: i32,
    pub daily_limit: i32,
    pub monthly_limit: i32,
    pub daily_usage: i32,
    pub monthly_usage: i32,
    pub last_reset: DateTime<Utc>,
    pub daily_reset_at: DateTime<Utc>,
    pub monthly_reset_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Client {
    /// A fresh, active client with zeroed counters.
    pub fn new(
        name: String,
        email: String,
        api_key: String,
        api_secret_hash: String,
        limits: ClientDefaults,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            api_key,
            api_secret_hash,
            is_active: true,
            rate_limit: limits.rate_limit,
            daily_limit: limits.daily_limit,
            monthly_limit: limits.monthly_limit,
            daily_usage: 0,
            monthly_usage: 0,
            last_reset: now,
            daily_reset_at: now,
            monthly_reset_at: now,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn daily_limit_reached(&self) -> bool {
        self.daily_usage >= self.daily_limit
    }

    pub fn monthly_limit_reached(&self) -> bool {
        self.monthly_usage >= self.monthly_limit
    }

    /// Whether `count` more messages fit under today's ceiling.
    pub fn fits_daily_quota(&self, count: usize) -> bool {
        let requested = i64::try_from(count).unwrap_or(i64::MAX);
        i64::from(self.daily_usage).saturating_add(requested) <= i64::from(self.daily_limit)
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            client_id: self.id,
            daily_usage: self.daily_usage,
            monthly_usage: self.monthly_usage,
            daily_limit: self.daily_limit,
            monthly_limit: self.monthly_limit,
            is_active: self.is_active,
        }
    }
}

/// Redacted client view returned by the admin API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub api_key: String,
    pub is_active: bool,
    pub rate_limit: i32,
    pub daily_limit: i32,
    pub monthly_limit: i32,
    pub daily_usage: i32,
    pub monthly_usage: i32,
    pub last_reset: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Client> for ClientRecord {
    fn from(client: &Client) -> Self {
        Self {
            id: client.id,
            name: client.name.clone(),
            email: client.email.clone(),
            api_key: client.api_key.clone(),
            is_active: client.is_active,
            rate_limit: client.rate_limit,
            daily_limit: client.daily_limit,
            monthly_limit: client.monthly_limit,
            daily_usage: client.daily_usage,
            monthly_usage: client.monthly_usage,
            last_reset: client.last_reset,
            created_at: client.created_at,
            updated_at: client.updated_at,
        }
    }
}

impl From<Client> for ClientRecord {
    fn from(client: Client) -> Self {
        Self::from(&client)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientStats {
    pub client_id: Uuid,
    pub daily_usage: i32,
    pub monthly_usage: i32,
    pub daily_limit: i32,
    pub monthly_limit: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateClient {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub rate_limit: Option<i32>,
    #[serde(default)]
    pub daily_limit: Option<i32>,
    #[serde(default)]
    pub monthly_limit: Option<i32>,
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateClient {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub rate_limit: Option<i32>,
    #[serde(default)]
    pub daily_limit: Option<i32>,
    #[serde(default)]
    pub monthly_limit: Option<i32>,
}

/// Returned exactly once, when the client is created. The secret is not stored.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedCredentials {
    pub client_id: Uuid,
    pub name: String,
    pub email: String,
    pub api_key: String,
    pub api_secret: String,
    pub rate_limit: i32,
    pub daily_limit: i32,
    pub monthly_limit: i32,
    pub warning: &'static str,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListClientsQuery {
    #[serde(default, deserialize_with = "crate::sms::models::empty_as_none")]
    pub is_active: Option<bool>,
}
