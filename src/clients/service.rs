use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use once_cell::sync::Lazy;
use rand_core::{OsRng, RngCore};
use regex::Regex;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::hash_secret;
use crate::config::ClientDefaults;
use crate::db::api_clients::EMAIL_UNIQUE_INDEX;
use crate::error::{AppError, AppResult};
use crate::store::ClientStore;

use super::{Client, ClientRecord, CreateClient, IssuedCredentials, UpdateClient};

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static regex"));

const CREDENTIALS_WARNING: &str =
    "Save these credentials securely. The API secret will not be shown again.";
const DUPLICATE_EMAIL: &str = "Client with this email already exists";

/// key: client-admin -> create, list, update, reset, soft delete
pub struct ClientAdmin {
    store: Arc<dyn ClientStore>,
    defaults: ClientDefaults,
}

impl ClientAdmin {
    pub fn new(store: Arc<dyn ClientStore>, defaults: ClientDefaults) -> Self {
        Self { store, defaults }
    }

    pub async fn create(&self, request: CreateClient) -> AppResult<IssuedCredentials> {
        let name = request.name.trim().to_string();
        let email = request.email.trim().to_lowercase();
        if name.is_empty() {
            return Err(AppError::invalid_payload("name is required"));
        }
        if !EMAIL.is_match(&email) {
            return Err(AppError::invalid_payload("email is not a valid address"));
        }
        reject_negative(request.rate_limit, request.daily_limit, request.monthly_limit)?;

        if self.store.email_in_use(&email).await.map_err(db_error)? {
            return Err(AppError::Conflict(DUPLICATE_EMAIL.into()));
        }

        let limits = ClientDefaults {
            rate_limit: or_default(request.rate_limit, self.defaults.rate_limit),
            daily_limit: or_default(request.daily_limit, self.defaults.daily_limit),
            monthly_limit: or_default(request.monthly_limit, self.defaults.monthly_limit),
        };
        let api_key = generate_api_key();
        let api_secret = generate_api_secret();
        let secret_hash = hash_secret(&api_secret).map_err(|e| {
            error!(?e, "failed to hash api secret");
            AppError::Internal("Failed to generate credentials".into())
        })?;

        let client = Client::new(name, email, api_key, secret_hash, limits, Utc::now());
        let client = match self.store.insert_client(&client).await {
            Ok(client) => client,
            Err(sqlx::Error::Database(db_err))
                if db_err.constraint() == Some(EMAIL_UNIQUE_INDEX) =>
            {
                return Err(AppError::Conflict(DUPLICATE_EMAIL.into()));
            }
            Err(e) => return Err(db_error(e)),
        };
        info!(client_id = %client.id, "api client created");

        Ok(IssuedCredentials {
            client_id: client.id,
            name: client.name,
            email: client.email,
            api_key: client.api_key,
            api_secret,
            rate_limit: client.rate_limit,
            daily_limit: client.daily_limit,
            monthly_limit: client.monthly_limit,
            warning: CREDENTIALS_WARNING,
        })
    }

    pub async fn list(&self, is_active: Option<bool>) -> AppResult<Vec<ClientRecord>> {
        let clients = self.store.list_clients(is_active).await.map_err(db_error)?;
        Ok(clients.iter().map(ClientRecord::from).collect())
    }

    pub async fn update(&self, id: Uuid, mut changes: UpdateClient) -> AppResult<ClientRecord> {
        changes.name = changes.name.map(|name| name.trim().to_string());
        if changes.name.as_deref().map_or(false, str::is_empty) {
            return Err(AppError::invalid_payload("name must not be empty"));
        }
        reject_negative(changes.rate_limit, changes.daily_limit, changes.monthly_limit)?;

        let updated = self
            .store
            .update_client(id, &changes)
            .await
            .map_err(db_error)?
            .ok_or(AppError::NotFound("Client"))?;
        info!(client_id = %id, "api client updated");
        Ok(updated.into())
    }

    pub async fn reset_usage(&self, id: Uuid) -> AppResult<ClientRecord> {
        let client = self
            .store
            .reset_usage(id, Utc::now())
            .await
            .map_err(db_error)?
            .ok_or(AppError::NotFound("Client"))?;
        info!(client_id = %id, "api client usage reset");
        Ok(client.into())
    }

    pub async fn soft_delete(&self, id: Uuid) -> AppResult<()> {
        if !self.store.soft_delete(id, Utc::now()).await.map_err(db_error)? {
            return Err(AppError::NotFound("Client"));
        }
        info!(client_id = %id, "api client deleted");
        Ok(())
    }
}

fn db_error(e: sqlx::Error) -> AppError {
    error!(?e, "client store error");
    AppError::Db(e)
}

fn or_default(value: Option<i32>, default: i32) -> i32 {
    value.filter(|v| *v > 0).unwrap_or(default)
}

fn reject_negative(
    rate_limit: Option<i32>,
    daily_limit: Option<i32>,
    monthly_limit: Option<i32>,
) -> AppResult<()> {
    for (field, value) in [
        ("rate_limit", rate_limit),
        ("daily_limit", daily_limit),
        ("monthly_limit", monthly_limit),
    ] {
        if value.map_or(false, |v| v < 0) {
            return Err(AppError::invalid_payload(format!(
                "{field} must not be negative"
            )));
        }
    }
    Ok(())
}

fn generate_api_key() -> String {
    let mut bytes = [0_u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn generate_api_secret() -> String {
    let mut bytes = [0_u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_secret;
    use crate::store::testing::InMemoryStore;

    fn admin() -> (Arc<InMemoryStore>, ClientAdmin) {
        let store = Arc::new(InMemoryStore::new());
        (store.clone(), ClientAdmin::new(store, ClientDefaults::default()))
    }

    fn create(name: &str, email: &str) -> CreateClient {
        CreateClient {
            name: name.into(),
            email: email.into(),
            ..CreateClient::default()
        }
    }

    #[tokio::test]
    async fn create_issues_credentials_once_and_stores_only_hash() {
        let (store, admin) = admin();
        let issued = admin.create(create("Acme", "ops@acme.test")).await.unwrap();

        assert_eq!(issued.rate_limit, 100);
        assert_eq!(issued.daily_limit, 10_000);
        assert_eq!(issued.monthly_limit, 300_000);
        assert_eq!(issued.api_key.len(), 32);

        let stored = store.client(issued.client_id).await.unwrap();
        assert_ne!(stored.api_secret_hash, issued.api_secret);
        assert!(verify_secret(&issued.api_secret, &stored.api_secret_hash));
    }

    #[tokio::test]
    async fn zero_limits_fall_back_to_defaults() {
        let (_, admin) = admin();
        let issued = admin
            .create(CreateClient {
                daily_limit: Some(0),
                monthly_limit: Some(50),
                ..create("Acme", "ops@acme.test")
            })
            .await
            .unwrap();
        assert_eq!(issued.daily_limit, 10_000);
        assert_eq!(issued.monthly_limit, 50);
    }

    #[tokio::test]
    async fn create_validates_and_rejects_duplicates() {
        let (_, admin) = admin();
        assert!(matches!(
            admin.create(create("  ", "ops@acme.test")).await,
            Err(AppError::Validation { .. })
        ));
        assert!(matches!(
            admin.create(create("Acme", "not-an-email")).await,
            Err(AppError::Validation { .. })
        ));

        admin.create(create("Acme", "ops@acme.test")).await.unwrap();
        assert!(matches!(
            admin.create(create("Acme 2", "ops@acme.test")).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            admin.create(create("Acme 3", " Ops@ACME.test ")).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn create_stores_lowercased_email() {
        let (store, admin) = admin();
        let issued = admin.create(create("Acme", "Ops@Acme.Test")).await.unwrap();
        assert_eq!(issued.email, "ops@acme.test");
        assert_eq!(store.client(issued.client_id).await.unwrap().email, "ops@acme.test");
    }

    #[tokio::test]
    async fn update_trims_name_like_create() {
        let (_, admin) = admin();
        let issued = admin.create(create("  Acme  ", "ops@acme.test")).await.unwrap();
        assert_eq!(issued.name, "Acme");

        let updated = admin
            .update(
                issued.client_id,
                UpdateClient {
                    name: Some("  Acme Ltd \t".into()),
                    ..UpdateClient::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Acme Ltd");
    }

    #[tokio::test]
    async fn update_is_partial_and_validated() {
        let (_, admin) = admin();
        let issued = admin.create(create("Acme", "ops@acme.test")).await.unwrap();

        let updated = admin
            .update(
                issued.client_id,
                UpdateClient {
                    daily_limit: Some(5),
                    is_active: Some(false),
                    ..UpdateClient::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Acme");
        assert_eq!(updated.daily_limit, 5);
        assert!(!updated.is_active);

        assert!(matches!(
            admin
                .update(
                    issued.client_id,
                    UpdateClient {
                        monthly_limit: Some(-1),
                        ..UpdateClient::default()
                    }
                )
                .await,
            Err(AppError::Validation { .. })
        ));
        assert!(matches!(
            admin.update(Uuid::new_v4(), UpdateClient::default()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn reset_zeroes_counters_and_moves_last_reset() {
        let (store, admin) = admin();
        let issued = admin
            .create(CreateClient {
                daily_limit: Some(10),
                monthly_limit: Some(100),
                ..create("Acme", "ops@acme.test")
            })
            .await
            .unwrap();
        let before = Utc::now() - chrono::Duration::days(3);
        store.backdate_resets(issued.client_id, before).await;
        store.set_usage(issued.client_id, 12, 100).await;

        let started = Utc::now();
        let record = admin.reset_usage(issued.client_id).await.unwrap();
        let finished = Utc::now();
        assert_eq!((record.daily_usage, record.monthly_usage), (0, 0));
        assert!(record.last_reset > before);
        assert!(record.last_reset >= started && record.last_reset <= finished);

        let stored = store.client(issued.client_id).await.unwrap();
        assert_eq!((stored.daily_usage, stored.monthly_usage), (0, 0));
        assert_eq!(stored.last_reset, record.last_reset);
        assert!(matches!(
            admin.reset_usage(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn soft_deleted_clients_disappear_and_free_their_email() {
        let (store, admin) = admin();
        let issued = admin.create(create("Acme", "ops@acme.test")).await.unwrap();
        admin.soft_delete(issued.client_id).await.unwrap();

        assert!(admin.list(None).await.unwrap().is_empty());
        assert!(store.client(issued.client_id).await.unwrap().deleted_at.is_some());
        assert!(matches!(
            admin.soft_delete(issued.client_id).await,
            Err(AppError::NotFound(_))
        ));
        admin.create(create("Acme", "ops@acme.test")).await.unwrap();
    }

    #[tokio::test]
    async fn list_filters_by_active_flag() {
        let (_, admin) = admin();
        let a = admin.create(create("A", "a@acme.test")).await.unwrap();
        admin.create(create("B", "b@acme.test")).await.unwrap();
        admin
            .update(
                a.client_id,
                UpdateClient {
                    is_active: Some(false),
                    ..UpdateClient::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(admin.list(None).await.unwrap().len(), 2);
        let inactive = admin.list(Some(false)).await.unwrap();
        assert_eq!(inactive.len(), 1);
        assert_eq!(inactive[0].id, a.client_id);
    }
}
