// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use tallycalc::application::CalculatorService;
use tallycalc::config::{ConcurrencyMode, ServiceConfig};
use tallycalc::domain::{Cents, User};
use tallycalc::io::{FixedStringProvider, ProviderError, RandomStringProvider};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(CalculatorService, TempDir)> {
    test_service_with(
        ServiceConfig::default(),
        Arc::new(FixedStringProvider::default()),
    )
    .await
}

/// Helper to create a test service using the given concurrency mode
pub async fn test_service_in_mode(mode: ConcurrencyMode) -> Result<(CalculatorService, TempDir)> {
    test_service_with(
        ServiceConfig::default().with_concurrency(mode),
        Arc::new(FixedStringProvider::default()),
    )
    .await
}

pub async fn test_service_with(
    config: ServiceConfig,
    provider: Arc<dyn RandomStringProvider>,
) -> Result<(CalculatorService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = CalculatorService::init(db_path.to_str().unwrap(), provider, config).await?;
    Ok((service, temp_dir))
}

/// Insert a user directly, skipping password hashing.
pub async fn seed_user(
    service: &CalculatorService,
    username: &str,
    balance: Cents,
) -> Result<User> {
    let user = User::new(username.to_string(), "unused-hash".to_string(), balance);
    assert!(service.repository().insert_user(&user).await?);
    Ok(user)
}

pub async fn balance_of(service: &CalculatorService, user: &User) -> Result<Cents> {
    Ok(service.get_account(user.id).await?.balance_cents)
}

pub async fn record_count(service: &CalculatorService, user: &User) -> Result<i64> {
    Ok(service.repository().count_records(user.id, None).await?)
}

/// Provider that always fails, as if the remote service were down.
pub struct DownProvider;

#[async_trait]
impl RandomStringProvider for DownProvider {
    async fn random_string(&self, _length: u32) -> Result<String, ProviderError> {
        Err(ProviderError::Unavailable("connection refused".into()))
    }
}

/// Provider that moves every user's balance by one cent while it runs, as a
/// writer outside the service would. The opening balance moves with it so
/// reconciliation still balances.
#[derive(Default)]
pub struct BalanceShiftingProvider {
    pool: OnceLock<SqlitePool>,
}

impl BalanceShiftingProvider {
    pub fn attach(&self, service: &CalculatorService) {
        let _ = self.pool.set(service.repository().pool().clone());
    }
}

#[async_trait]
impl RandomStringProvider for BalanceShiftingProvider {
    async fn random_string(&self, _length: u32) -> Result<String, ProviderError> {
        let pool = self
            .pool
            .get()
            .ok_or_else(|| ProviderError::Unavailable("not attached".into()))?;
        sqlx::query(
            "UPDATE users SET balance_cents = balance_cents - 1, \
             opening_balance_cents = opening_balance_cents - 1",
        )
        .execute(pool)
        .await
        .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        Ok("SHIFTED".to_string())
    }
}
