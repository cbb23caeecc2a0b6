use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, OperationDefinition, OperationId, OperationType, UserId};

pub type RecordId = Uuid;

/// One completed, paid-for operation. Records are never edited; deleting
/// one only hides it from queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    /// Store-assigned ordering key
    pub sequence: i64,
    pub operation_id: OperationId,
    pub operation_type: OperationType,
    pub user_id: UserId,
    /// Cost charged, snapshotted at charge time
    pub amount_cents: Cents,
    /// User balance right after the debit
    pub user_balance_cents: Cents,
    /// Textual result; numbers are rendered, random strings kept as-is
    pub result: String,
    pub date: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Draft a record for a charge. Sequence and the post-debit balance are
    /// filled in by the repository when the debit commits.
    pub fn new(operation: &OperationDefinition, user_id: UserId, result: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            operation_id: operation.id,
            operation_type: operation.operation_type,
            user_id,
            amount_cents: operation.cost_cents,
            user_balance_cents: 0,
            result,
            date: Utc::now(),
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
