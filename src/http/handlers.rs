use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::{AppError, DEFAULT_PAGE_SIZE, RecordQuery};
use crate::domain::{Operands, Record, format_cents};

use super::{ApiError, AppState, AuthUser};

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct OperationRequest {
    pub operation: String,
    pub number1: Option<f64>,
    pub number2: Option<f64>,
    pub length: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct OperationResponse {
    pub result: String,
}

/// Query string of the records listing. Values that do not parse fall back
/// to their defaults.
#[derive(Debug, Deserialize)]
pub struct RecordsParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
}

impl RecordsParams {
    fn into_query(self) -> RecordQuery {
        RecordQuery {
            page: parse_or(self.page, 1),
            page_size: parse_or(self.limit, DEFAULT_PAGE_SIZE),
            search: self.search,
        }
    }
}

fn parse_or(value: Option<String>, default: i64) -> i64 {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResponse {
    pub id: Uuid,
    pub amount: String,
    pub user_balance: String,
    pub date: String,
    pub result: String,
    pub operation: String,
}

impl From<Record> for RecordResponse {
    fn from(record: Record) -> Self {
        Self {
            id: record.id,
            amount: format_cents(record.amount_cents),
            user_balance: format_cents(record.user_balance_cents),
            date: record
                .date
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            result: record.result,
            operation: record.operation_type.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsResponse {
    pub records: Vec<RecordResponse>,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub username: String,
    pub status: String,
    pub balance: String,
}

// === Handlers ===

/// POST /register
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = payload?;
    state
        .service
        .register(&request.username, &request.password)
        .await?;

    Ok(Json(MessageResponse {
        message: "User registered successfully".to_string(),
    }))
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(request) = payload?;
    let token = state
        .service
        .login(&request.username, &request.password)
        .await?;

    Ok(Json(TokenResponse { token }))
}

/// POST /api/v1/operation
pub async fn perform_operation(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    payload: Result<Json<OperationRequest>, JsonRejection>,
) -> Result<Json<OperationResponse>, ApiError> {
    let Json(request) = payload?;
    let operands = Operands {
        number1: request.number1,
        number2: request.number2,
        length: request.length,
    };

    let outcome = state
        .service
        .charge_and_record(user_id, &request.operation, operands)
        .await?;

    Ok(Json(OperationResponse {
        result: outcome.result,
    }))
}

/// GET /api/v1/records
pub async fn list_records(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    params: Result<Query<RecordsParams>, QueryRejection>,
) -> Result<Json<RecordsResponse>, ApiError> {
    let Query(params) = params?;
    let page = state
        .service
        .list_records(user_id, params.into_query())
        .await?;

    Ok(Json(RecordsResponse {
        records: page.records.into_iter().map(RecordResponse::from).collect(),
        total_pages: page.total_pages,
    }))
}

/// DELETE /api/v1/records/{id}
pub async fn delete_record(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(id) = id?;
    // A malformed id cannot name one of the caller's records.
    let record_id = Uuid::parse_str(&id).map_err(|_| AppError::RecordNotFound(id.clone()))?;

    state.service.delete_record(user_id, record_id).await?;

    Ok(Json(MessageResponse {
        message: "Record deleted successfully".to_string(),
    }))
}

/// GET /api/v1/account
pub async fn get_account(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<AccountResponse>, ApiError> {
    let user = state.service.get_account(user_id).await?;

    Ok(Json(AccountResponse {
        id: user.id,
        username: user.username,
        status: user.status.to_string(),
        balance: format_cents(user.balance_cents),
    }))
}

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparsable_paging_falls_back_to_defaults() {
        let params = RecordsParams {
            page: Some("abc".into()),
            limit: None,
            search: Some("42".into()),
        };
        let query = params.into_query();
        assert_eq!(query.page, 1);
        assert_eq!(query.page_size, 10);
        assert_eq!(query.search.as_deref(), Some("42"));
    }
}
