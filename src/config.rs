use std::time::Duration;

use clap::ValueEnum;

use crate::domain::Cents;

/// Used when no JWT secret is configured. Only fit for local development.
pub const DEV_JWT_SECRET: &str = "tallycalc-insecure-development-secret";

pub const DEFAULT_RANDOM_ORG_URL: &str = "https://www.random.org/strings/";

/// How concurrent charges against one user are kept from overspending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ConcurrencyMode {
    /// Serialize each user's charges behind an in-process lock.
    #[default]
    Pessimistic,
    /// Rely on the conditional balance update and retry on conflict.
    Optimistic,
}

impl ConcurrencyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConcurrencyMode::Pessimistic => "pessimistic",
            ConcurrencyMode::Optimistic => "optimistic",
        }
    }
}

impl std::fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Balance granted to newly registered users
    pub opening_balance_cents: Cents,
    pub concurrency: ConcurrencyMode,
    /// Commit attempts before a charge gives up on a contended balance
    pub max_commit_attempts: u32,
    /// Random string length when a request omits one
    pub default_random_length: u32,
    pub jwt_secret: String,
    pub token_ttl: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            opening_balance_cents: 5000,
            concurrency: ConcurrencyMode::default(),
            max_commit_attempts: 64,
            default_random_length: 10,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl ServiceConfig {
    pub fn with_concurrency(mut self, concurrency: ConcurrencyMode) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_opening_balance(mut self, cents: Cents) -> Self {
        self.opening_balance_cents = cents;
        self
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

/// Where random strings come from.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Serve a fixed string instead of calling out; for offline use.
    pub fixed: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_RANDOM_ORG_URL.to_string(),
            timeout: Duration::from_secs(5),
            fixed: None,
        }
    }
}
