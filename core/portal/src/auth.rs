//! Password hashing, login sessions and the admin guard.
//!
//! Passwords are stored as `hex(scrypt key).hex(salt)`. A login creates an
//! `auth_sessions` row whose random token travels in a cookie signed with the
//! configured session secret.

use axum::{
    extract::FromRequestParts,
    http::{header::COOKIE, request::Parts, HeaderMap},
};
use chrono::Duration;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::Serialize;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::{format_timestamp, parse_timestamp, Clock};
use crate::db::{AuthSessionRow, Db, UserRow};
use crate::error::ApiError;
use crate::state::{blocking, AppState};

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "portal_session";
pub const VISITOR_COOKIE: &str = "portal_visitor";

const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const KEY_LEN: usize = 64;
const SALT_LEN: usize = 16;
const TOKEN_LEN: usize = 32;

// ═══════════════════════════════════════════════════════════════════════════════
// Passwords
// ═══════════════════════════════════════════════════════════════════════════════

pub fn hash_password(password: &str) -> Result<String, String> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = hex::encode(salt);
    let key = derive_key(password, salt.as_bytes())?;
    Ok(format!("{}.{}", hex::encode(key), salt))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((key_hex, salt)) = stored.split_once('.') else {
        return false;
    };
    let Ok(expected) = hex::decode(key_hex) else {
        return false;
    };
    match derive_key(password, salt.as_bytes()) {
        Ok(actual) => constant_time_eq(&actual, &expected),
        Err(err) => {
            warn!(error = %err, "Password verification failed");
            false
        }
    }
}

fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; KEY_LEN], String> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LEN)
        .map_err(|err| format!("Invalid scrypt params: {}", err))?;
    let mut key = [0u8; KEY_LEN];
    scrypt::scrypt(password.as_bytes(), salt, &params, &mut key)
        .map_err(|err| format!("Failed to derive password key: {}", err))?;
    Ok(key)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cookies
// ═══════════════════════════════════════════════════════════════════════════════

/// Signs and verifies cookie values as `<token>.<hex hmac>`.
#[derive(Clone)]
pub struct SessionSigner {
    secret: Vec<u8>,
}

impl SessionSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
        }
    }

    pub fn random() -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::new(&secret)
    }

    pub fn sign(&self, token: &str) -> Result<String, String> {
        let mac = self.mac(token)?;
        Ok(format!("{}.{}", token, hex::encode(mac.finalize().into_bytes())))
    }

    pub fn verify(&self, value: &str) -> Option<String> {
        let (token, signature) = value.rsplit_once('.')?;
        let signature = hex::decode(signature).ok()?;
        self.mac(token)
            .ok()?
            .verify_slice(&signature)
            .ok()
            .map(|_| token.to_string())
    }

    fn mac(&self, token: &str) -> Result<HmacSha256, String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|err| format!("Invalid session secret: {}", err))?;
        mac.update(token.as_bytes());
        Ok(mac)
    }
}

pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

pub fn set_cookie(name: &str, value: &str, max_age: Duration) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name,
        value,
        max_age.num_seconds().max(0)
    )
}

pub fn clear_cookie(name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", name)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Accounts + sessions
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
    pub created_at: String,
}

impl From<UserRow> for PublicUser {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            is_admin: row.is_admin,
            created_at: row.created_at,
        }
    }
}

pub struct AuthService {
    db: Db,
    clock: Arc<dyn Clock>,
    signer: SessionSigner,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(db: Db, clock: Arc<dyn Clock>, signer: SessionSigner, session_ttl: Duration) -> Self {
        Self {
            db,
            clock,
            signer,
            session_ttl,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Creates the bootstrap admin unless the username is already taken.
    pub fn ensure_admin(&self, username: &str, password: &str) -> Result<bool, String> {
        if self.db.get_user_by_username(username)?.is_some() {
            return Ok(false);
        }
        let hash = hash_password(password)?;
        let now = format_timestamp(self.clock.now());
        self.db.insert_user(username, &hash, true, &now)?;
        info!(username = %username, "Bootstrap admin created");
        Ok(true)
    }

    pub fn has_admin(&self) -> Result<bool, String> {
        Ok(self.db.count_admins()? > 0)
    }

    /// Returns the user and the signed cookie value, or `None` on bad
    /// credentials.
    pub fn login(&self, username: &str, password: &str) -> Result<Option<(PublicUser, String)>, String> {
        let user = match self.db.get_user_by_username(username.trim())? {
            Some(user) if verify_password(password, &user.password_hash) => user,
            _ => {
                warn!(username = %username, "Login rejected");
                return Ok(None);
            }
        };

        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.session_ttl)
            .ok_or_else(|| "Session expiry is out of range".to_string())?;
        let token = random_token();
        self.db.insert_auth_session(&AuthSessionRow {
            token: token.clone(),
            user_id: user.id,
            created_at: format_timestamp(now),
            expires_at: format_timestamp(expires_at),
        })?;
        info!(username = %user.username, "Login succeeded");
        Ok(Some((user.into(), self.signer.sign(&token)?)))
    }

    pub fn logout(&self, cookie: &str) -> Result<(), String> {
        if let Some(token) = self.signer.verify(cookie) {
            self.db.delete_auth_session(&token)?;
        }
        Ok(())
    }

    pub fn current_user(&self, cookie: &str) -> Result<Option<PublicUser>, String> {
        let Some(token) = self.signer.verify(cookie) else {
            return Ok(None);
        };
        let Some(session) = self.db.get_auth_session(&token)? else {
            return Ok(None);
        };
        let expired = parse_timestamp(&session.expires_at)
            .map(|expires_at| expires_at <= self.clock.now())
            .unwrap_or(true);
        if expired {
            return Ok(None);
        }
        Ok(self.db.get_user(session.user_id)?.map(PublicUser::from))
    }
}

/// Extractor for routes that require a logged-in admin.
pub struct AdminUser(pub PublicUser);

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let cookie = cookie_value(&parts.headers, SESSION_COOKIE).ok_or(ApiError::Unauthorized)?;
        let auth = Arc::clone(&state.auth);
        match blocking(move || auth.current_user(&cookie)).await? {
            Some(user) if user.is_admin => Ok(AdminUser(user)),
            _ => Err(ApiError::Unauthorized),
        }
    }
}
