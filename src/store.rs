//! Persistence seams for client records and the send log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::clients::{Client, UpdateClient};
use crate::db;
use crate::sms::{LogQuery, SendLogEntry};

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn find_by_api_key(&self, api_key: &str) -> sqlx::Result<Option<Client>>;
    async fn find_by_id(&self, id: Uuid) -> sqlx::Result<Option<Client>>;
    async fn email_in_use(&self, email: &str) -> sqlx::Result<bool>;
    async fn insert_client(&self, client: &Client) -> sqlx::Result<Client>;
    async fn list_clients(&self, is_active: Option<bool>) -> sqlx::Result<Vec<Client>>;
    async fn update_client(&self, id: Uuid, changes: &UpdateClient)
        -> sqlx::Result<Option<Client>>;
    /// Atomically adds `delta` to both the daily and monthly counters.
    async fn increment_usage(&self, id: Uuid, delta: i32) -> sqlx::Result<bool>;
    async fn reset_usage(&self, id: Uuid, now: DateTime<Utc>) -> sqlx::Result<Option<Client>>;
    async fn reset_daily_usage(
        &self,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> sqlx::Result<u64>;
    async fn reset_monthly_usage(
        &self,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> sqlx::Result<u64>;
    async fn soft_delete(&self, id: Uuid, now: DateTime<Utc>) -> sqlx::Result<bool>;
}

#[async_trait]
pub trait SendLogStore: Send + Sync {
    async fn append_log(&self, entry: &SendLogEntry) -> sqlx::Result<()>;
    async fn list_logs(&self, client_id: Uuid, query: &LogQuery)
        -> sqlx::Result<Vec<SendLogEntry>>;
}

/// Postgres-backed store shared by every component.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ClientStore for PgStore {
    async fn find_by_api_key(&self, api_key: &str) -> sqlx::Result<Option<Client>> {
        db::api_clients::find_by_api_key(&self.pool, api_key).await
    }

    async fn find_by_id(&self, id: Uuid) -> sqlx::Result<Option<Client>> {
        db::api_clients::find_by_id(&self.pool, id).await
    }

    async fn email_in_use(&self, email: &str) -> sqlx::Result<bool> {
        db::api_clients::email_in_use(&self.pool, email).await
    }

    async fn insert_client(&self, client: &Client) -> sqlx::Result<Client> {
        db::api_clients::insert(&self.pool, client).await
    }

    async fn list_clients(&self, is_active: Option<bool>) -> sqlx::Result<Vec<Client>> {
        db::api_clients::list(&self.pool, is_active).await
    }

    async fn update_client(
        &self,
        id: Uuid,
        changes: &UpdateClient,
    ) -> sqlx::Result<Option<Client>> {
        db::api_clients::update(&self.pool, id, changes).await
    }

    async fn increment_usage(&self, id: Uuid, delta: i32) -> sqlx::Result<bool> {
        db::api_clients::increment_usage(&self.pool, id, delta).await
    }

    async fn reset_usage(&self, id: Uuid, now: DateTime<Utc>) -> sqlx::Result<Option<Client>> {
        db::api_clients::reset_usage(&self.pool, id, now).await
    }

    async fn reset_daily_usage(
        &self,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> sqlx::Result<u64> {
        db::api_clients::reset_daily_usage(&self.pool, window_start, now).await
    }

    async fn reset_monthly_usage(
        &self,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> sqlx::Result<u64> {
        db::api_clients::reset_monthly_usage(&self.pool, window_start, now).await
    }

    async fn soft_delete(&self, id: Uuid, now: DateTime<Utc>) -> sqlx::Result<bool> {
        db::api_clients::soft_delete(&self.pool, id, now).await
    }
}

#[async_trait]
impl SendLogStore for PgStore {
    async fn append_log(&self, entry: &SendLogEntry) -> sqlx::Result<()> {
        db::sms_logs::insert(&self.pool, entry).await
    }

    async fn list_logs(
        &self,
        client_id: Uuid,
        query: &LogQuery,
    ) -> sqlx::Result<Vec<SendLogEntry>> {
        db::sms_logs::list_for_client(&self.pool, client_id, query).await
    }
}

pub mod testing {
    use std::collections::HashMap;

    use tokio::sync::Mutex;

    use super::*;

    /// Process-local store mirroring the Postgres semantics, including soft deletes.
    #[derive(Default)]
    pub struct InMemoryStore {
        clients: Mutex<HashMap<Uuid, Client>>,
        logs: Mutex<Vec<SendLogEntry>>,
    }

    impl InMemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every entry ever appended, in insertion order.
        pub async fn logs(&self) -> Vec<SendLogEntry> {
            self.logs.lock().await.clone()
        }

        /// Raw record lookup that also sees soft-deleted clients.
        pub async fn client(&self, id: Uuid) -> Option<Client> {
            self.clients.lock().await.get(&id).cloned()
        }

        /// Overwrites counters directly, bypassing the send path.
        pub async fn set_usage(&self, id: Uuid, daily_usage: i32, monthly_usage: i32) {
            if let Some(client) = self.clients.lock().await.get_mut(&id) {
                client.daily_usage = daily_usage;
                client.monthly_usage = monthly_usage;
            }
        }

        /// Moves reset markers back in time so the reset loops consider the client stale.
        pub async fn backdate_resets(&self, id: Uuid, at: DateTime<Utc>) {
            if let Some(client) = self.clients.lock().await.get_mut(&id) {
                client.last_reset = at;
                client.daily_reset_at = at;
                client.monthly_reset_at = at;
            }
        }
    }

    #[async_trait]
    impl ClientStore for InMemoryStore {
        async fn find_by_api_key(&self, api_key: &str) -> sqlx::Result<Option<Client>> {
            let guard = self.clients.lock().await;
            Ok(guard
                .values()
                .find(|client| client.api_key == api_key && client.deleted_at.is_none())
                .cloned())
        }

        async fn find_by_id(&self, id: Uuid) -> sqlx::Result<Option<Client>> {
            let guard = self.clients.lock().await;
            Ok(guard
                .get(&id)
                .filter(|client| client.deleted_at.is_none())
                .cloned())
        }

        async fn email_in_use(&self, email: &str) -> sqlx::Result<bool> {
            let guard = self.clients.lock().await;
            Ok(guard
                .values()
                .any(|client| {
                    client.email.eq_ignore_ascii_case(email) && client.deleted_at.is_none()
                }))
        }

        async fn insert_client(&self, client: &Client) -> sqlx::Result<Client> {
            let mut guard = self.clients.lock().await;
            guard.insert(client.id, client.clone());
            Ok(client.clone())
        }

        async fn list_clients(&self, is_active: Option<bool>) -> sqlx::Result<Vec<Client>> {
            let guard = self.clients.lock().await;
            let mut clients: Vec<Client> = guard
                .values()
                .filter(|client| client.deleted_at.is_none())
                .filter(|client| is_active.map_or(true, |active| client.is_active == active))
                .cloned()
                .collect();
            clients.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(clients)
        }

        async fn update_client(
            &self,
            id: Uuid,
            changes: &UpdateClient,
        ) -> sqlx::Result<Option<Client>> {
            let mut guard = self.clients.lock().await;
            let Some(client) = guard.get_mut(&id).filter(|c| c.deleted_at.is_none()) else {
                return Ok(None);
            };
            if let Some(name) = &changes.name {
                client.name = name.clone();
            }
            if let Some(is_active) = changes.is_active {
                client.is_active = is_active;
            }
            if let Some(rate_limit) = changes.rate_limit {
                client.rate_limit = rate_limit;
            }
            if let Some(daily_limit) = changes.daily_limit {
                client.daily_limit = daily_limit;
            }
            if let Some(monthly_limit) = changes.monthly_limit {
                client.monthly_limit = monthly_limit;
            }
            client.updated_at = Utc::now();
            Ok(Some(client.clone()))
        }

        async fn increment_usage(&self, id: Uuid, delta: i32) -> sqlx::Result<bool> {
            let mut guard = self.clients.lock().await;
            let Some(client) = guard.get_mut(&id) else {
                return Ok(false);
            };
            client.daily_usage += delta;
            client.monthly_usage += delta;
            client.updated_at = Utc::now();
            Ok(true)
        }

        async fn reset_usage(
            &self,
            id: Uuid,
            now: DateTime<Utc>,
        ) -> sqlx::Result<Option<Client>> {
            let mut guard = self.clients.lock().await;
            let Some(client) = guard.get_mut(&id).filter(|c| c.deleted_at.is_none()) else {
                return Ok(None);
            };
            client.daily_usage = 0;
            client.monthly_usage = 0;
            client.last_reset = now;
            client.daily_reset_at = now;
            client.monthly_reset_at = now;
            client.updated_at = now;
            Ok(Some(client.clone()))
        }

        async fn reset_daily_usage(
            &self,
            window_start: DateTime<Utc>,
            now: DateTime<Utc>,
        ) -> sqlx::Result<u64> {
            let mut guard = self.clients.lock().await;
            let mut affected = 0;
            for client in guard.values_mut() {
                if client.deleted_at.is_none() && client.daily_reset_at < window_start {
                    client.daily_usage = 0;
                    client.daily_reset_at = now;
                    client.last_reset = now;
                    client.updated_at = now;
                    affected += 1;
                }
            }
            Ok(affected)
        }

        async fn reset_monthly_usage(
            &self,
            window_start: DateTime<Utc>,
            now: DateTime<Utc>,
        ) -> sqlx::Result<u64> {
            let mut guard = self.clients.lock().await;
            let mut affected = 0;
            for client in guard.values_mut() {
                if client.deleted_at.is_none() && client.monthly_reset_at < window_start {
                    client.monthly_usage = 0;
                    client.monthly_reset_at = now;
                    client.last_reset = now;
                    client.updated_at = now;
                    affected += 1;
                }
            }
            Ok(affected)
        }

        async fn soft_delete(&self, id: Uuid, now: DateTime<Utc>) -> sqlx::Result<bool> {
            let mut guard = self.clients.lock().await;
            let Some(client) = guard.get_mut(&id).filter(|c| c.deleted_at.is_none()) else {
                return Ok(false);
            };
            client.deleted_at = Some(now);
            client.is_active = false;
            client.updated_at = now;
            Ok(true)
        }
    }

    #[async_trait]
    impl SendLogStore for InMemoryStore {
        async fn append_log(&self, entry: &SendLogEntry) -> sqlx::Result<()> {
            self.logs.lock().await.push(entry.clone());
            Ok(())
        }

        async fn list_logs(
            &self,
            client_id: Uuid,
            query: &LogQuery,
        ) -> sqlx::Result<Vec<SendLogEntry>> {
            let guard = self.logs.lock().await;
            let mut entries: Vec<SendLogEntry> = guard
                .iter()
                .filter(|entry| entry.client_id == client_id)
                .filter(|entry| query.status.map_or(true, |status| entry.status == status))
                .cloned()
                .collect();
            // Stable sort keeps insertion order reversed for identical timestamps.
            entries.reverse();
            entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(entries
                .into_iter()
                .skip(usize::try_from(query.offset).unwrap_or(0))
                .take(usize::try_from(query.limit).unwrap_or(0))
                .collect())
        }
    }
}
