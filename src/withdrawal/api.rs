//! Withdrawal API Layer
//!
//! The surface the (external) HTTP gateway binds: request/response DTOs with
//! string amounts, a uniform response envelope, and standalone async
//! handlers over the service. No routing lives here - the gateway owns
//! transport, authentication and payload normalization, and hands this layer
//! one canonical request shape.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use super::error::WithdrawalError;
use super::expirer::ExpirerWorker;
use super::service::WithdrawalService;
use super::types::{CreateWithdrawal, OtpIssueOutcome, Withdrawal, WithdrawalId};
use crate::balance::BalanceSnapshot;
use crate::money;

// ============================================================================
// API Request/Response Types
// ============================================================================

/// API request for creating a withdrawal
#[derive(Debug, Deserialize)]
pub struct CreateWithdrawalRequest {
    /// Amount as string (to avoid float precision issues)
    pub amount: String,
    pub payout_address: String,
}

/// API request for confirming the OTP on a withdrawal
#[derive(Debug, Deserialize)]
pub struct ConfirmOtpRequest {
    pub withdrawal_id: String,
    pub otp_id: String,
    pub otp_code: String,
}

/// API request for marking a withdrawal paid
#[derive(Debug, Deserialize)]
pub struct MarkPaidRequest {
    pub withdrawal_id: String,
    pub tx_hash: String,
    pub idempotency_key: String,
}

/// API request for rejecting a withdrawal
#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub withdrawal_id: String,
    pub reason: String,
}

/// One withdrawal rendered for clients
#[derive(Debug, Serialize)]
pub struct WithdrawalView {
    pub id: String,
    pub amount: String,
    /// Informational fee quote; not deducted from the ledger
    pub fee: String,
    pub payout_address: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Present on create/re-issue responses when OTP issuance failed;
    /// the withdrawal stands and issuance may be retried
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_error: Option<String>,
}

impl WithdrawalView {
    fn from_withdrawal(w: &Withdrawal, fee: u64) -> Self {
        Self {
            id: w.id.to_string(),
            amount: money::format_amount(w.amount),
            fee: money::format_amount(fee),
            payout_address: w.payout_address.clone(),
            status: w.status.as_str().to_string(),
            otp_id: w.otp_id.clone(),
            paid_tx_hash: w.paid_tx_hash.clone(),
            notes: w.notes.clone(),
            created_at: w.created_at.timestamp_millis(),
            updated_at: w.updated_at.timestamp_millis(),
            otp_error: None,
        }
    }
}

/// Balance snapshot rendered for clients, six fractional digits throughout
#[derive(Debug, Serialize)]
pub struct BalanceView {
    pub available: String,
    pub pending_withdrawals: String,
    pub total_earned: String,
    pub pending_commissions: String,
}

impl BalanceView {
    fn from_snapshot(s: &BalanceSnapshot) -> Self {
        Self {
            available: money::format_amount(s.available),
            pending_withdrawals: money::format_amount(s.pending_withdrawals),
            total_earned: money::format_amount(s.total_earned),
            pending_commissions: money::format_amount(s.pending_commissions),
        }
    }
}

/// Expiry sweep result
#[derive(Debug, Serialize)]
pub struct SweepView {
    pub found: usize,
    pub processed_count: usize,
}

/// API wrapper for standard response format
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            data: Some(data),
            msg: None,
        }
    }

    pub fn error(code: i32, msg: impl ToString) -> Self {
        Self {
            code,
            data: None,
            msg: Some(msg.to_string()),
        }
    }
}

/// Error type every handler returns alongside the suggested HTTP status
pub type ApiError = (StatusCode, ApiResponse<()>);

// ============================================================================
// Error Codes
// ============================================================================

pub mod error_codes {
    pub const INVALID_PARAMETER: i32 = -1001;
    pub const INVALID_AMOUNT: i32 = -1002;
    pub const BELOW_MINIMUM: i32 = -1003;
    pub const MISSING_PAYOUT_ADDRESS: i32 = -1004;
    pub const MISSING_TX_HASH: i32 = -1005;
    pub const INSUFFICIENT_BALANCE: i32 = -2001;
    pub const INVALID_OTP: i32 = -3001;
    pub const IDEMPOTENCY_CONFLICT: i32 = -3002;
    pub const UNAUTHORIZED: i32 = -4003;
    pub const SERVICE_UNAVAILABLE: i32 = -5001;
    pub const INTERNAL_ERROR: i32 = -5000;
    pub const WITHDRAWAL_NOT_FOUND: i32 = -6001;
    pub const INVALID_STATE: i32 = -6002;
}

// ============================================================================
// Helper Functions
// ============================================================================

fn parse_withdrawal_id(s: &str) -> Result<WithdrawalId, ApiError> {
    s.parse().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            ApiResponse::error(
                error_codes::INVALID_PARAMETER,
                format!("Invalid withdrawal id: {}", s),
            ),
        )
    })
}

fn parse_request_amount(s: &str) -> Result<u64, ApiError> {
    money::parse_amount(s).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            ApiResponse::error(error_codes::INVALID_AMOUNT, e),
        )
    })
}

/// Map WithdrawalError to (StatusCode, error_code, message)
fn map_error(e: &WithdrawalError) -> (StatusCode, i32, String) {
    let status = match e.http_status() {
        400 => StatusCode::BAD_REQUEST,
        403 => StatusCode::FORBIDDEN,
        404 => StatusCode::NOT_FOUND,
        409 => StatusCode::CONFLICT,
        422 => StatusCode::UNPROCESSABLE_ENTITY,
        503 => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let code = match e.code() {
        "INVALID_AMOUNT" => error_codes::INVALID_AMOUNT,
        "BELOW_MINIMUM" => error_codes::BELOW_MINIMUM,
        "MISSING_PAYOUT_ADDRESS" => error_codes::MISSING_PAYOUT_ADDRESS,
        "MISSING_TX_HASH" => error_codes::MISSING_TX_HASH,
        "MISSING_IDEMPOTENCY_KEY" => error_codes::INVALID_PARAMETER,
        "INSUFFICIENT_BALANCE" => error_codes::INSUFFICIENT_BALANCE,
        "INVALID_OTP" | "OTP_OWNERSHIP_MISMATCH" => error_codes::INVALID_OTP,
        "IDEMPOTENCY_CONFLICT" => error_codes::IDEMPOTENCY_CONFLICT,
        "UNAUTHORIZED" => error_codes::UNAUTHORIZED,
        "NOT_FOUND" => error_codes::WITHDRAWAL_NOT_FOUND,
        "INVALID_STATE_TRANSITION" => error_codes::INVALID_STATE,
        "EXTERNAL_SERVICE_FAILURE" => error_codes::SERVICE_UNAVAILABLE,
        _ => error_codes::INTERNAL_ERROR,
    };

    (status, code, e.to_string())
}

fn api_error(e: &WithdrawalError) -> ApiError {
    let (status, code, msg) = map_error(e);
    (status, ApiResponse::error(code, msg))
}

// ============================================================================
// Handlers (for integration with the gateway)
// ============================================================================

/// GET withdrawals for the authenticated user
pub async fn list_withdrawals(
    service: &WithdrawalService,
    user_id: i64,
) -> Result<Vec<WithdrawalView>, ApiError> {
    let fee = service.withdrawal_fee().await;
    let withdrawals = service
        .list_for_user(user_id)
        .await
        .map_err(|e| api_error(&e))?;

    Ok(withdrawals
        .iter()
        .map(|w| WithdrawalView::from_withdrawal(w, fee))
        .collect())
}

/// GET the balance snapshot for the authenticated user
pub async fn get_balance(
    service: &WithdrawalService,
    user_id: i64,
) -> Result<BalanceView, ApiError> {
    let snapshot = service.balance(user_id).await.map_err(|e| api_error(&e))?;
    Ok(BalanceView::from_snapshot(&snapshot))
}

/// POST a new withdrawal request
pub async fn create_withdrawal(
    service: &WithdrawalService,
    user_id: i64,
    req: CreateWithdrawalRequest,
) -> Result<WithdrawalView, ApiError> {
    let amount = parse_request_amount(&req.amount)?;

    let (withdrawal, otp_outcome) = service
        .create(CreateWithdrawal {
            user_id,
            amount,
            payout_address: req.payout_address,
        })
        .await
        .map_err(|e| api_error(&e))?;

    let fee = service.withdrawal_fee().await;
    let mut view = WithdrawalView::from_withdrawal(&withdrawal, fee);
    if let OtpIssueOutcome::Failed { reason } = otp_outcome {
        view.otp_error = Some(reason);
    }

    Ok(view)
}

/// POST an OTP confirmation
pub async fn confirm_otp(
    service: &WithdrawalService,
    user_id: i64,
    req: ConfirmOtpRequest,
) -> Result<WithdrawalView, ApiError> {
    let id = parse_withdrawal_id(&req.withdrawal_id)?;

    let withdrawal = service
        .confirm_otp(id, user_id, &req.otp_id, &req.otp_code)
        .await
        .map_err(|e| api_error(&e))?;

    let fee = service.withdrawal_fee().await;
    Ok(WithdrawalView::from_withdrawal(&withdrawal, fee))
}

/// POST an OTP re-issue request
pub async fn resend_otp(
    service: &WithdrawalService,
    user_id: i64,
    withdrawal_id: &str,
) -> Result<WithdrawalView, ApiError> {
    let id = parse_withdrawal_id(withdrawal_id)?;

    let withdrawal = service
        .request_otp(id, user_id)
        .await
        .map_err(|e| api_error(&e))?;

    let fee = service.withdrawal_fee().await;
    Ok(WithdrawalView::from_withdrawal(&withdrawal, fee))
}

/// DELETE (cancel) a requested withdrawal
pub async fn cancel_withdrawal(
    service: &WithdrawalService,
    user_id: i64,
    withdrawal_id: &str,
) -> Result<WithdrawalView, ApiError> {
    let id = parse_withdrawal_id(withdrawal_id)?;

    let withdrawal = service
        .cancel(id, user_id)
        .await
        .map_err(|e| api_error(&e))?;

    let fee = service.withdrawal_fee().await;
    Ok(WithdrawalView::from_withdrawal(&withdrawal, fee))
}

/// POST admin approval
pub async fn admin_approve(
    service: &WithdrawalService,
    admin_id: i64,
    withdrawal_id: &str,
) -> Result<WithdrawalView, ApiError> {
    let id = parse_withdrawal_id(withdrawal_id)?;

    let withdrawal = service
        .approve(id, admin_id)
        .await
        .map_err(|e| api_error(&e))?;

    let fee = service.withdrawal_fee().await;
    Ok(WithdrawalView::from_withdrawal(&withdrawal, fee))
}

/// POST admin mark-paid (idempotent via the caller-supplied key)
pub async fn admin_mark_paid(
    service: &WithdrawalService,
    admin_id: i64,
    req: MarkPaidRequest,
) -> Result<WithdrawalView, ApiError> {
    let id = parse_withdrawal_id(&req.withdrawal_id)?;

    let withdrawal = service
        .mark_paid(id, &req.tx_hash, admin_id, &req.idempotency_key)
        .await
        .map_err(|e| api_error(&e))?;

    let fee = service.withdrawal_fee().await;
    Ok(WithdrawalView::from_withdrawal(&withdrawal, fee))
}

/// POST admin rejection
pub async fn admin_reject(
    service: &WithdrawalService,
    admin_id: i64,
    req: RejectRequest,
) -> Result<WithdrawalView, ApiError> {
    let id = parse_withdrawal_id(&req.withdrawal_id)?;

    let withdrawal = service
        .reject(id, admin_id, &req.reason)
        .await
        .map_err(|e| api_error(&e))?;

    let fee = service.withdrawal_fee().await;
    Ok(WithdrawalView::from_withdrawal(&withdrawal, fee))
}

/// POST a manual expiry sweep (also driven on a timer by the worker)
pub async fn run_expiry_sweep(worker: &ExpirerWorker) -> Result<SweepView, ApiError> {
    let report = worker.sweep().await.map_err(|e| api_error(&e))?;

    Ok(SweepView {
        found: report.found,
        processed_count: report.expired,
    })
}

// ============================================================================
// Unit Tests
// ============================================================================
