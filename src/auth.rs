use std::sync::Arc;

use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use axum::http::StatusCode;
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use thiserror::Error;
use tracing::{error, warn};

use crate::clients::Client;
use crate::config::AdminCredentials;
use crate::store::ClientStore;

type HmacSha256 = Hmac<Sha256>;

/// Verified against when the API key is unknown so both failure paths cost one argon2 run.
static DUMMY_HASH: Lazy<String> =
    Lazy::new(|| hash_secret("sms-gateway-dummy-secret").unwrap_or_default());

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing API credentials")]
    MissingCredentials,
    #[error("invalid API credentials")]
    InvalidCredentials,
    #[error("API client is inactive")]
    Inactive,
    #[error("daily limit exceeded")]
    DailyLimitExceeded,
    #[error("monthly limit exceeded")]
    MonthlyLimitExceeded,
    #[error("authorization required")]
    AdminCredentialsRequired,
    #[error("invalid admin credentials")]
    InvalidAdminCredentials,
    #[error("credential lookup failed: {0}")]
    Store(#[from] sqlx::Error),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingCredentials
            | AuthError::InvalidCredentials
            | AuthError::AdminCredentialsRequired
            | AuthError::InvalidAdminCredentials => StatusCode::UNAUTHORIZED,
            AuthError::Inactive => StatusCode::FORBIDDEN,
            AuthError::DailyLimitExceeded | AuthError::MonthlyLimitExceeded => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "Missing API credentials",
            AuthError::InvalidCredentials => "Invalid API credentials",
            AuthError::Inactive => "API client is inactive",
            AuthError::DailyLimitExceeded => "Daily limit exceeded",
            AuthError::MonthlyLimitExceeded => "Monthly limit exceeded",
            AuthError::AdminCredentialsRequired => "Authorization required",
            AuthError::InvalidAdminCredentials => "Invalid credentials",
            AuthError::Store(_) => "Internal server error",
        }
    }

    /// Unknown keys and wrong secrets share one detail string.
    pub fn detail(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "X-API-Key and X-API-Secret headers are required",
            AuthError::InvalidCredentials => "API key or secret is incorrect",
            AuthError::Inactive => "Your API access has been suspended",
            AuthError::DailyLimitExceeded => "You have reached your daily SMS limit",
            AuthError::MonthlyLimitExceeded => "You have reached your monthly SMS limit",
            AuthError::AdminCredentialsRequired => "HTTP Basic credentials are required",
            AuthError::InvalidAdminCredentials => "Admin username or password is incorrect",
            AuthError::Store(_) => "internal error",
        }
    }
}

/// Hashes an API secret into an argon2 PHC string with a fresh random salt.
pub fn hash_secret(secret: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(secret.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Constant-time argon2 check. A stored hash that fails to parse never verifies.
pub fn verify_secret(secret: &str, stored_hash: &str) -> bool {
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            error!(?e, "stored secret hash is not a valid PHC string");
            return false;
        }
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

/// key: authenticator -> api key/secret, account status, quota gates, admin basic auth
pub struct Authenticator {
    store: Arc<dyn ClientStore>,
    admin_key: [u8; 32],
    admin_tag: Vec<u8>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn ClientStore>, admin: &AdminCredentials) -> Self {
        let mut admin_key = [0_u8; 32];
        OsRng.fill_bytes(&mut admin_key);
        let admin_tag = admin_tag(&admin_key, &admin.username, &admin.password);
        Self {
            store,
            admin_key,
            admin_tag,
        }
    }

    /// Checks the key/secret pair and the account flag, but not quotas.
    pub async fn verify_credentials(
        &self,
        api_key: &str,
        api_secret: &str,
    ) -> Result<Client, AuthError> {
        if api_key.is_empty() || api_secret.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let Some(client) = self.store.find_by_api_key(api_key).await? else {
            let _ = verify_secret(api_secret, DUMMY_HASH.as_str());
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_secret(api_secret, &client.api_secret_hash) {
            warn!(client_id = %client.id, "api secret mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        if !client.is_active {
            return Err(AuthError::Inactive);
        }

        Ok(client)
    }

    /// Full gate for sending: credentials, account flag, then daily and monthly quotas.
    pub async fn authenticate(&self, api_key: &str, api_secret: &str) -> Result<Client, AuthError> {
        let client = self.verify_credentials(api_key, api_secret).await?;
        if client.daily_limit_reached() {
            return Err(AuthError::DailyLimitExceeded);
        }
        if client.monthly_limit_reached() {
            return Err(AuthError::MonthlyLimitExceeded);
        }
        Ok(client)
    }

    pub fn basic_authenticate(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let mut mac = keyed_mac(&self.admin_key);
        feed_credentials(&mut mac, username, password);
        mac.verify_slice(&self.admin_tag)
            .map_err(|_| AuthError::InvalidAdminCredentials)
    }
}

fn keyed_mac(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC can use any key length")
}

// Length prefix keeps "ab"+"c" distinct from "a"+"bc".
fn feed_credentials(mac: &mut HmacSha256, username: &str, password: &str) {
    mac.update(&(username.len() as u64).to_be_bytes());
    mac.update(username.as_bytes());
    mac.update(password.as_bytes());
}

fn admin_tag(key: &[u8], username: &str, password: &str) -> Vec<u8> {
    let mut mac = keyed_mac(key);
    feed_credentials(&mut mac, username, password);
    mac.finalize().into_bytes().to_vec()
}
