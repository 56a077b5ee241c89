// EduStoreOptions: the main configuration struct.
//
// Loaded from `edustore.toml` (every section optional) and overlaid with
// environment variables for secrets and deployment-specific values.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::env;
use crate::error::{EduStoreError, Result};

/// Top-level configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EduStoreOptions {
    /// HMAC key for session tokens (at least 32 bytes in production).
    #[serde(default)]
    pub secret: String,

    /// Path prefix of the HTTP surface (default: "/api").
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// sqlx connection URL.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default)]
    pub otp: OtpOptions,

    #[serde(default)]
    pub session: SessionOptions,

    #[serde(default)]
    pub orders: OrderOptions,

    #[serde(default)]
    pub downloads: DownloadOptions,

    #[serde(default)]
    pub rate_limit: RateLimitOptions,

    #[serde(default)]
    pub server: ServerOptions,
}

fn default_base_path() -> String {
    "/api".to_string()
}

fn default_database_url() -> String {
    "sqlite://edustore.db?mode=rwc".to_string()
}

impl Default for EduStoreOptions {
    fn default() -> Self {
        Self {
            secret: String::new(),
            base_path: default_base_path(),
            database_url: default_database_url(),
            otp: OtpOptions::default(),
            session: SessionOptions::default(),
            orders: OrderOptions::default(),
            downloads: DownloadOptions::default(),
            rate_limit: RateLimitOptions::default(),
            server: ServerOptions::default(),
        }
    }
}

// Secrets never reach logs.
impl fmt::Debug for EduStoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EduStoreOptions")
            .field("secret", &"[REDACTED]")
            .field("base_path", &self.base_path)
            .field("database_url", &self.database_url)
            .field("otp", &self.otp)
            .field("session", &self.session)
            .field("orders", &self.orders)
            .field("downloads", &self.downloads)
            .field("rate_limit", &self.rate_limit)
            .field("server", &self.server)
            .finish()
    }
}

impl EduStoreOptions {
    /// Options with defaults and the given secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| EduStoreError::Config(format!("invalid config: {e}")))
    }

    /// Read a TOML file, overlay the environment and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EduStoreError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut options = Self::from_toml_str(&raw)?;
        options.apply_env();
        options.validate()?;
        Ok(options)
    }

    /// Overlay `EDUSTORE_SECRET`/`JWT_SECRET`, `DATABASE_URL` and `PORT`.
    pub fn apply_env(&mut self) {
        if let Some(secret) = env::get_secret_from_env() {
            self.secret = secret;
        }
        if let Some(url) = env::get_database_url_from_env() {
            self.database_url = url;
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.secret.is_empty() {
            return Err(EduStoreError::Config(
                "secret is required (set EDUSTORE_SECRET)".into(),
            ));
        }
        if env::is_production() && self.secret.len() < 32 {
            return Err(EduStoreError::Config(
                "secret must be at least 32 characters in production".into(),
            ));
        }
        if !self.base_path.starts_with('/') {
            return Err(EduStoreError::Config("basePath must start with '/'".into()));
        }
        if self.otp.length == 0 || self.otp.expires_in == 0 {
            return Err(EduStoreError::Config("otp.length and otp.expiresIn must be positive".into()));
        }
        if self.orders.default_page_size == 0
            || self.orders.default_page_size > self.orders.max_page_size
        {
            return Err(EduStoreError::Config(
                "orders.defaultPageSize must be between 1 and orders.maxPageSize".into(),
            ));
        }
        if self.session.expires_in == 0 || self.session.short_lived_expires_in == 0 {
            return Err(EduStoreError::Config("session lifetimes must be positive".into()));
        }
        Ok(())
    }
}

// ─── OTP ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpOptions {
    /// Digits per code (default: 6).
    #[serde(default = "default_otp_length")]
    pub length: usize,

    /// Seconds a code stays valid (default: 300 = 5 minutes).
    #[serde(default = "default_otp_expires_in")]
    pub expires_in: u64,

    /// Seconds before another code may be issued to the same contact (default: 60).
    #[serde(default = "default_otp_cooldown")]
    pub cooldown: u64,
}

fn default_otp_length() -> usize { 6 }
fn default_otp_expires_in() -> u64 { 300 }
fn default_otp_cooldown() -> u64 { 60 }

impl Default for OtpOptions {
    fn default() -> Self {
        Self {
            length: default_otp_length(),
            expires_in: default_otp_expires_in(),
            cooldown: default_otp_cooldown(),
        }
    }
}

// ─── Session ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    /// Login token lifetime in seconds (default: 604800 = 7 days).
    #[serde(default = "default_session_expires_in")]
    pub expires_in: u64,

    /// Short-lived access token lifetime in seconds (default: 900 = 15 minutes).
    #[serde(default = "default_short_lived_expires_in")]
    pub short_lived_expires_in: u64,
}

fn default_session_expires_in() -> u64 { 604_800 }
fn default_short_lived_expires_in() -> u64 { 900 }

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            expires_in: default_session_expires_in(),
            short_lived_expires_in: default_short_lived_expires_in(),
        }
    }
}

// ─── Orders ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderOptions {
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,

    #[serde(default = "default_order_number_prefix")]
    pub order_number_prefix: String,

    #[serde(default = "default_download_id_prefix")]
    pub download_id_prefix: String,

    /// Allowed drift when reconciling subtotal, tax and total (default: 0.01).
    #[serde(default = "default_price_tolerance")]
    pub price_tolerance: f64,

    /// Upper bound on a single line item's quantity.
    #[serde(default = "default_max_quantity")]
    pub max_quantity: i64,
}

fn default_page_size() -> u64 { 10 }
fn default_max_page_size() -> u64 { 100 }
fn default_order_number_prefix() -> String { "ORD".to_string() }
fn default_download_id_prefix() -> String { "DL".to_string() }
fn default_price_tolerance() -> f64 { 0.01 }
fn default_max_quantity() -> i64 { 1000 }

impl Default for OrderOptions {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            order_number_prefix: default_order_number_prefix(),
            download_id_prefix: default_download_id_prefix(),
            price_tolerance: default_price_tolerance(),
            max_quantity: default_max_quantity(),
        }
    }
}

// ─── Downloads ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOptions {
    /// Entitlement lifetime in seconds, counted from order completion
    /// (default: 604800 = 7 days).
    #[serde(default = "default_entitlement_ttl")]
    pub entitlement_ttl: u64,

    /// Refuse redemption of entitlements past `expiresAt` (default: true).
    #[serde(default = "default_true")]
    pub enforce_expiry: bool,
}

fn default_entitlement_ttl() -> u64 { 604_800 }
fn default_true() -> bool { true }

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            entitlement_ttl: default_entitlement_ttl(),
            enforce_expiry: true,
        }
    }
}

// ─── Rate limiting ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitOptions {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Window size in seconds (default: 60).
    #[serde(default = "default_rate_limit_window")]
    pub window: u64,

    /// Requests per window per client IP (default: 100).
    #[serde(default = "default_rate_limit_max")]
    pub max: u64,
}

fn default_rate_limit_window() -> u64 { 60 }
fn default_rate_limit_max() -> u64 { 100 }

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            window: default_rate_limit_window(),
            max: default_rate_limit_max(),
        }
    }
}

// ─── Server ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerOptions {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 5000 }

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
