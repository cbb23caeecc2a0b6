use std::sync::Arc;

use anyhow::anyhow;
use tracing::{error, info, warn};

use crate::config::{ConcurrencyMode, ServiceConfig};
use crate::domain::{
    CatalogEntry, Computation, DEFAULT_CATALOG, OperandError, Operands, OperationDefinition,
    OperationType, Reconciliation, Record, RecordId, User, UserId, UserStatus, reconcile,
};
use crate::io::RandomStringProvider;
use crate::storage::{ChargeCommit, Repository};

use super::auth::{self, TokenAuthority};
use super::{AppError, UserLocks};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Application service for the metered calculator.
/// This is the primary interface for any client (CLI, HTTP API).
pub struct CalculatorService {
    repo: Repository,
    provider: Arc<dyn RandomStringProvider>,
    locks: UserLocks,
    tokens: TokenAuthority,
    config: ServiceConfig,
}

/// Result of a paid operation
#[derive(Debug, Clone)]
pub struct ChargeOutcome {
    pub result: String,
    pub record: Record,
}

/// Paging and filtering for a user's records
#[derive(Debug, Clone)]
pub struct RecordQuery {
    pub page: i64,
    pub page_size: i64,
    /// Literal substring the result must contain
    pub search: Option<String>,
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            search: None,
        }
    }
}

impl RecordQuery {
    /// Clamp paging into range and drop an empty search term.
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, MAX_PAGE_SIZE),
            search: self.search.filter(|s| !s.is_empty()),
        }
    }
}

/// One page of records plus the totals needed to navigate.
#[derive(Debug, Clone)]
pub struct RecordPage {
    pub records: Vec<Record>,
    pub total_count: i64,
    pub total_pages: i64,
    pub page: i64,
    pub page_size: i64,
}

impl CalculatorService {
    /// Create a new service on top of an open repository.
    pub fn new(
        repo: Repository,
        provider: Arc<dyn RandomStringProvider>,
        config: ServiceConfig,
    ) -> Self {
        let tokens = TokenAuthority::new(config.jwt_secret.as_bytes(), config.token_ttl);
        Self {
            repo,
            provider,
            locks: UserLocks::new(),
            tokens,
            config,
        }
    }

    /// Open (creating if needed) the database at the given path, migrate it
    /// and seed the default catalog.
    pub async fn init(
        database_path: &str,
        provider: Arc<dyn RandomStringProvider>,
        config: ServiceConfig,
    ) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        let service = Self::new(repo, provider, config);
        service.ensure_seeded(&DEFAULT_CATALOG).await?;
        Ok(service)
    }

    /// Connect to an existing database.
    pub async fn connect(
        database_path: &str,
        provider: Arc<dyn RandomStringProvider>,
        config: ServiceConfig,
    ) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo, provider, config))
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // ========================
    // Catalog
    // ========================

    /// Insert missing catalog entries; existing prices are kept.
    pub async fn ensure_seeded(&self, entries: &[CatalogEntry]) -> Result<u64, AppError> {
        let inserted = self.repo.seed_operations(entries).await?;
        if inserted > 0 {
            info!(inserted, "seeded operation catalog");
        }
        Ok(inserted)
    }

    pub async fn list_operations(&self) -> Result<Vec<OperationDefinition>, AppError> {
        Ok(self.repo.list_operations().await?)
    }

    // ========================
    // Accounts
    // ========================

    /// Register a new user with the configured opening balance.
    pub async fn register(&self, username: &str, password: &str) -> Result<User, AppError> {
        let username = auth::normalize_username(username)?;
        auth::validate_password(password)?;
        if self.config.opening_balance_cents < 0 {
            return Err(AppError::InvalidInput(
                "opening balance must not be negative".into(),
            ));
        }

        if self.repo.get_user_by_username(&username).await?.is_some() {
            return Err(AppError::UsernameTaken(username));
        }

        let hash = auth::hash_password(password.to_string()).await?;
        let user = User::new(username, hash, self.config.opening_balance_cents);

        // A concurrent registration may have won the name since the check.
        if !self.repo.insert_user(&user).await? {
            return Err(AppError::UsernameTaken(user.username));
        }

        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(user)
    }

    /// Exchange credentials for a bearer token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, AppError> {
        let user = self
            .repo
            .get_user_by_username(username.trim())
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        let matches =
            auth::verify_password(password.to_string(), user.password_hash.clone()).await?;
        if !matches || user.status != UserStatus::Active {
            warn!(username = %user.username, "rejected login");
            return Err(AppError::InvalidCredentials);
        }

        self.tokens.issue(user.id)
    }

    /// Resolve a bearer token to the user it was issued for.
    pub fn authenticate(&self, token: &str) -> Result<UserId, AppError> {
        self.tokens.verify(token)
    }

    pub async fn get_account(&self, user_id: UserId) -> Result<User, AppError> {
        self.repo
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))
    }

    pub async fn find_user(&self, username: &str) -> Result<User, AppError> {
        self.repo
            .get_user_by_username(username.trim())
            .await?
            .ok_or_else(|| AppError::UserNotFound(username.to_string()))
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        Ok(self.repo.list_users().await?)
    }

    // ========================
    // Charging
    // ========================

    /// Run a priced operation for a user, debit its cost and record it.
    ///
    /// Either the balance is debited and exactly one record exists, or
    /// nothing changed and an error is returned.
    #[tracing::instrument(
        skip_all,
        fields(user_id = %user_id, operation = %operation_name)
    )]
    pub async fn charge_and_record(
        &self,
        user_id: UserId,
        operation_name: &str,
        operands: Operands,
    ) -> Result<ChargeOutcome, AppError> {
        let _guard = match self.config.concurrency {
            ConcurrencyMode::Pessimistic => Some(self.locks.acquire(user_id).await),
            ConcurrencyMode::Optimistic => None,
        };

        let user = self.get_account(user_id).await?;
        let operation = self.resolve_operation(operation_name).await?;
        ensure_affordable(&user, &operation)?;

        let computation = Computation::from_operands(
            operation.operation_type,
            &operands,
            self.config.default_random_length,
        )
        .map_err(|e| match e {
            OperandError::Missing(message) => AppError::MissingOperand(message.to_string()),
            invalid @ OperandError::InvalidLength { .. } => {
                AppError::InvalidOperand(invalid.to_string())
            }
        })?;

        let result = self.execute(computation).await?;
        let record = self.commit(user, operation, result).await?;

        info!(
            record_id = %record.id,
            amount_cents = record.amount_cents,
            balance_cents = record.user_balance_cents,
            "operation charged"
        );
        Ok(ChargeOutcome {
            result: record.result.clone(),
            record,
        })
    }

    async fn resolve_operation(&self, name: &str) -> Result<OperationDefinition, AppError> {
        let operation_type = OperationType::from_str(name)
            .ok_or_else(|| AppError::InvalidOperation(name.to_string()))?;
        self.repo
            .get_operation(operation_type)
            .await?
            .ok_or_else(|| AppError::InvalidOperation(name.to_string()))
    }

    async fn execute(&self, computation: Computation) -> Result<String, AppError> {
        match computation {
            Computation::Arithmetic(expr) => Ok(expr.evaluate_to_string()?),
            Computation::RandomString { length } => {
                Ok(self.provider.random_string(length).await?)
            }
        }
    }

    /// Commit the debit and record, retrying while the balance moves under us.
    async fn commit(
        &self,
        mut user: User,
        mut operation: OperationDefinition,
        result: String,
    ) -> Result<Record, AppError> {
        let max_attempts = self.config.max_commit_attempts.max(1);

        for attempt in 1..=max_attempts {
            let mut record = Record::new(&operation, user.id, result.clone());
            match self.repo.commit_charge(&mut record, user.balance_cents).await {
                Ok(ChargeCommit::Committed) => return Ok(record),
                Ok(ChargeCommit::BalanceChanged) => {
                    warn!(attempt, "balance changed before commit, retrying");
                    user = self
                        .repo
                        .get_user(user.id)
                        .await
                        .map_err(AppError::PersistenceFailed)?
                        .ok_or_else(|| AppError::UserNotFound(user.id.to_string()))?;
                    operation = self
                        .repo
                        .get_operation(operation.operation_type)
                        .await
                        .map_err(AppError::PersistenceFailed)?
                        .ok_or_else(|| {
                            AppError::InvalidOperation(operation.operation_type.to_string())
                        })?;
                    ensure_affordable(&user, &operation)?;
                }
                Err(e) => {
                    error!(error = %e, "failed to persist charge");
                    return Err(AppError::PersistenceFailed(e));
                }
            }
        }

        error!(max_attempts, "balance kept changing, giving up");
        Err(AppError::PersistenceFailed(anyhow!(
            "balance changed on every one of {max_attempts} commit attempts"
        )))
    }

    // ========================
    // Records
    // ========================

    pub async fn list_records(
        &self,
        user_id: UserId,
        query: RecordQuery,
    ) -> Result<RecordPage, AppError> {
        let query = query.normalized();
        let search = query.search.as_deref();

        let total_count = self.repo.count_records(user_id, search).await?;
        let offset = (query.page - 1).saturating_mul(query.page_size);
        let records = self
            .repo
            .list_records(user_id, search, query.page_size, offset)
            .await?;

        Ok(RecordPage {
            records,
            total_count,
            total_pages: (total_count + query.page_size - 1) / query.page_size,
            page: query.page,
            page_size: query.page_size,
        })
    }

    /// Every visible record of a user, oldest first.
    pub async fn all_records(&self, user_id: UserId) -> Result<Vec<Record>, AppError> {
        Ok(self.repo.list_records(user_id, None, i64::MAX, 0).await?)
    }

    /// Hide one of the user's records. The charge itself stands.
    pub async fn delete_record(
        &self,
        user_id: UserId,
        record_id: RecordId,
    ) -> Result<(), AppError> {
        if !self.repo.soft_delete_record(user_id, record_id).await? {
            return Err(AppError::RecordNotFound(record_id.to_string()));
        }
        info!(user_id = %user_id, record_id = %record_id, "record deleted");
        Ok(())
    }

    /// Compare a user's balance with the sum of everything charged.
    pub async fn reconcile(&self, user_id: UserId) -> Result<Reconciliation, AppError> {
        let user = self.get_account(user_id).await?;
        let totals = self.repo.charge_totals(user_id).await?;
        Ok(reconcile(&user, totals))
    }
}

fn ensure_affordable(user: &User, operation: &OperationDefinition) -> Result<(), AppError> {
    if !user.can_afford(operation.cost_cents) {
        return Err(AppError::InsufficientBalance {
            balance: user.balance_cents,
            required: operation.cost_cents,
        });
    }
    Ok(())
}
