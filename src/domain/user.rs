use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Cents;

pub type UserId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(UserStatus::Active),
            "inactive" => Some(UserStatus::Inactive),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An account that pays for operations out of its balance.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// PHC-formatted password hash; never leaves the service.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub status: UserStatus,
    pub balance_cents: Cents,
    /// Balance granted at registration, kept for reconciliation.
    pub opening_balance_cents: Cents,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: String, password_hash: String, opening_balance_cents: Cents) -> Self {
        assert!(opening_balance_cents >= 0, "Opening balance must not be negative");
        Self {
            id: Uuid::new_v4(),
            username,
            password_hash,
            status: UserStatus::Active,
            balance_cents: opening_balance_cents,
            opening_balance_cents,
            created_at: Utc::now(),
        }
    }

    pub fn can_afford(&self, cost_cents: Cents) -> bool {
        self.balance_cents >= cost_cents
    }
}
