use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    CatalogEntry, ChargeTotals, OperationDefinition, OperationType, Record, RecordId, User,
    UserId, UserStatus,
};

use super::MIGRATION_001_INITIAL;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_CONNECTIONS: u32 = 8;

const RECORD_COLUMNS: &str = "r.sequence, r.id, r.operation_id, o.operation_type, r.user_id, \
     r.amount_cents, r.user_balance_cents, r.operation_result, r.date, r.deleted_at";

/// Result of trying to debit a balance and append its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeCommit {
    /// Debit and record are both durable.
    Committed,
    /// The balance no longer matched the observed value; nothing was written.
    BalanceChanged,
}

/// Repository for users, the operation catalog and audit records.
///
/// Cloning is cheap and shares the underlying pool.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL such as `sqlite:calc.db?mode=rwc`.
    ///
    /// Connections use WAL journaling and a busy timeout so concurrent
    /// writers queue instead of failing.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Raw pool access for maintenance and tests.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========================
    // User operations
    // ========================

    /// Insert a new user. Returns `false` if the username is already taken.
    pub async fn insert_user(&self, user: &User) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, username, password_hash, status, balance_cents, opening_balance_cents, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.status.as_str())
        .bind(user.balance_cents)
        .bind(user.opening_balance_cents)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(false),
            Err(e) => Err(e).context("Failed to save user"),
        }
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, password_hash, status, balance_cents, opening_balance_cents, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// Get a user by username.
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, password_hash, status, balance_cents, opening_balance_cents, created_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by username")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// List all users, ordered by username.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(
            r#"
            SELECT id, username, password_hash, status, balance_cents, opening_balance_cents, created_at
            FROM users
            ORDER BY username
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list users")?;

        rows.iter().map(Self::row_to_user).collect()
    }

    fn row_to_user(row: &SqliteRow) -> Result<User> {
        let id_str: String = row.get("id");
        let status_str: String = row.get("status");
        let created_at_str: String = row.get("created_at");

        Ok(User {
            id: Uuid::parse_str(&id_str).context("Invalid user ID")?,
            username: row.get("username"),
            password_hash: row.get("password_hash"),
            status: UserStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid user status: {}", status_str))?,
            balance_cents: row.get("balance_cents"),
            opening_balance_cents: row.get("opening_balance_cents"),
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at")?,
        })
    }

    // ========================
    // Operation catalog
    // ========================

    /// Insert catalog entries whose type is not present yet. Existing rows,
    /// including manually adjusted prices, are left alone.
    /// Returns the number of rows inserted.
    pub async fn seed_operations(&self, entries: &[CatalogEntry]) -> Result<u64> {
        let mut inserted = 0;
        for entry in entries {
            let operation = OperationDefinition::new(entry.operation_type, entry.cost_cents);
            let result = sqlx::query(
                r#"
                INSERT INTO operations (id, operation_type, cost_cents)
                VALUES (?, ?, ?)
                ON CONFLICT(operation_type) DO NOTHING
                "#,
            )
            .bind(operation.id.to_string())
            .bind(operation.operation_type.as_str())
            .bind(operation.cost_cents)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to seed operation {}", entry.operation_type))?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    /// Get the catalog entry for an operation type.
    pub async fn get_operation(
        &self,
        operation_type: OperationType,
    ) -> Result<Option<OperationDefinition>> {
        let row = sqlx::query(
            "SELECT id, operation_type, cost_cents FROM operations WHERE operation_type = ?",
        )
        .bind(operation_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch operation")?;

        row.as_ref().map(Self::row_to_operation).transpose()
    }

    /// List the whole catalog, ordered by operation type.
    pub async fn list_operations(&self) -> Result<Vec<OperationDefinition>> {
        let rows = sqlx::query(
            "SELECT id, operation_type, cost_cents FROM operations ORDER BY operation_type",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list operations")?;

        rows.iter().map(Self::row_to_operation).collect()
    }

    fn row_to_operation(row: &SqliteRow) -> Result<OperationDefinition> {
        let id_str: String = row.get("id");
        let type_str: String = row.get("operation_type");

        Ok(OperationDefinition {
            id: Uuid::parse_str(&id_str).context("Invalid operation ID")?,
            operation_type: OperationType::from_str(&type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid operation type: {}", type_str))?,
            cost_cents: row.get("cost_cents"),
        })
    }

    // ========================
    // Charges
    // ========================

    /// Debit `record.amount_cents` from the record's user and append the
    /// record, in one transaction.
    ///
    /// The debit only applies while the balance still equals
    /// `expected_balance`; otherwise nothing is written and
    /// [`ChargeCommit::BalanceChanged`] is returned. On success the record's
    /// sequence and post-debit balance are filled in.
    pub async fn commit_charge(
        &self,
        record: &mut Record,
        expected_balance: i64,
    ) -> Result<ChargeCommit> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin charge transaction")?;

        // The write comes first so SQLite takes the write lock up front.
        let debited = sqlx::query(
            r#"
            UPDATE users
            SET balance_cents = balance_cents - ?
            WHERE id = ? AND balance_cents = ?
            RETURNING balance_cents
            "#,
        )
        .bind(record.amount_cents)
        .bind(record.user_id.to_string())
        .bind(expected_balance)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to debit balance")?;

        let Some(debited) = debited else {
            tx.rollback()
                .await
                .context("Failed to roll back charge transaction")?;
            return Ok(ChargeCommit::BalanceChanged);
        };
        let new_balance: i64 = debited.get("balance_cents");

        let inserted = sqlx::query(
            r#"
            INSERT INTO records (id, operation_id, user_id, amount_cents, user_balance_cents, operation_result, date)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING sequence
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.operation_id.to_string())
        .bind(record.user_id.to_string())
        .bind(record.amount_cents)
        .bind(new_balance)
        .bind(&record.result)
        .bind(record.date.to_rfc3339())
        .fetch_one(&mut *tx)
        .await
        .context("Failed to save record")?;
        let sequence: i64 = inserted.get("sequence");

        tx.commit()
            .await
            .context("Failed to commit charge transaction")?;

        record.user_balance_cents = new_balance;
        record.sequence = sequence;
        Ok(ChargeCommit::Committed)
    }

    // ========================
    // Record queries
    // ========================

    /// Page through a user's visible records, optionally keeping only those
    /// whose result contains `search`.
    pub async fn list_records(
        &self,
        user_id: UserId,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Record>> {
        let mut query = format!(
            "SELECT {RECORD_COLUMNS} FROM records r JOIN operations o ON o.id = r.operation_id \
             WHERE r.user_id = ? AND r.deleted_at IS NULL"
        );
        if search.is_some() {
            query.push_str(" AND instr(r.operation_result, ?) > 0");
        }
        query.push_str(" ORDER BY r.sequence LIMIT ? OFFSET ?");

        let mut sql_query = sqlx::query(&query).bind(user_id.to_string());
        if let Some(term) = search {
            sql_query = sql_query.bind(term);
        }

        let rows = sql_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list records")?;

        rows.iter().map(Self::row_to_record).collect()
    }

    /// Count a user's visible records matching the same filter as
    /// [`Repository::list_records`].
    pub async fn count_records(&self, user_id: UserId, search: Option<&str>) -> Result<i64> {
        let mut query =
            String::from("SELECT COUNT(*) as count FROM records WHERE user_id = ? AND deleted_at IS NULL");
        if search.is_some() {
            query.push_str(" AND instr(operation_result, ?) > 0");
        }

        let mut sql_query = sqlx::query(&query).bind(user_id.to_string());
        if let Some(term) = search {
            sql_query = sql_query.bind(term);
        }

        let row = sql_query
            .fetch_one(&self.pool)
            .await
            .context("Failed to count records")?;
        Ok(row.get("count"))
    }

    /// Get a single record, deleted or not.
    pub async fn get_record(&self, id: RecordId) -> Result<Option<Record>> {
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM records r JOIN operations o ON o.id = r.operation_id \
             WHERE r.id = ?"
        );
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch record")?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    /// Hide a record owned by `user_id`. Returns `false` if no visible
    /// record with that ID belongs to the user.
    pub async fn soft_delete_record(&self, user_id: UserId, id: RecordId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE records
            SET deleted_at = ?
            WHERE id = ? AND user_id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to delete record")?;

        Ok(result.rows_affected() > 0)
    }

    /// Sum every charge ever committed for a user, deleted records included.
    pub async fn charge_totals(&self, user_id: UserId) -> Result<ChargeTotals> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(amount_cents), 0) as charged,
                COUNT(*) as records,
                COALESCE(SUM(CASE WHEN deleted_at IS NOT NULL THEN 1 ELSE 0 END), 0) as deleted
            FROM records
            WHERE user_id = ?
            "#,
        )
        .bind(user_id.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum charges")?;

        Ok(ChargeTotals {
            charged_total_cents: row.get("charged"),
            record_count: row.get("records"),
            deleted_record_count: row.get("deleted"),
        })
    }

    fn row_to_record(row: &SqliteRow) -> Result<Record> {
        let id_str: String = row.get("id");
        let operation_id_str: String = row.get("operation_id");
        let operation_type_str: String = row.get("operation_type");
        let user_id_str: String = row.get("user_id");
        let date_str: String = row.get("date");
        let deleted_at_str: Option<String> = row.get("deleted_at");

        Ok(Record {
            id: Uuid::parse_str(&id_str).context("Invalid record ID")?,
            sequence: row.get("sequence"),
            operation_id: Uuid::parse_str(&operation_id_str).context("Invalid operation ID")?,
            operation_type: OperationType::from_str(&operation_type_str).ok_or_else(|| {
                anyhow::anyhow!("Invalid operation type: {}", operation_type_str)
            })?,
            user_id: Uuid::parse_str(&user_id_str).context("Invalid user ID")?,
            amount_cents: row.get("amount_cents"),
            user_balance_cents: row.get("user_balance_cents"),
            result: row.get("operation_result"),
            date: parse_timestamp(&date_str).context("Invalid record date")?,
            deleted_at: deleted_at_str
                .as_deref()
                .map(parse_timestamp)
                .transpose()
                .context("Invalid deleted_at")?,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}
