use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::consts::RECENT_BONUS_LIMIT;
use crate::error::AppError;
use crate::identity::{self, Resolved};
use crate::model::{Address, Package, ReferralNode, UserBonus, UserStats};
use crate::purchase::{self, PurchaseOutcome};
use crate::session::SessionState;
use crate::state::AppState;
use crate::units::Wei;
use crate::wallet;

async fn require_account(state: &AppState) -> Result<Address, AppError> {
    state
        .session
        .account()
        .await
        .ok_or_else(|| AppError::BadRequest("Wallet is not connected".into()))
}

async fn require_user(state: &AppState) -> Result<u64, AppError> {
    state
        .session
        .user_id()
        .await
        .ok_or_else(|| AppError::BadRequest("Claim a referral slot first".into()))
}

/// Connect the wallet: request accounts, move the wallet onto the program's
/// chain (adding it if unknown), then resolve the address to a user.
pub async fn connect(State(state): State<AppState>) -> Result<Json<SessionState>, AppError> {
    let accounts = state.wallet.request_accounts().await?;
    let account = accounts
        .into_iter()
        .next()
        .ok_or(AppError::Wallet(wallet::WalletError::NoAccounts))?;

    wallet::ensure_chain(state.wallet.as_ref(), &state.chain).await?;

    state.session.connect(account.clone(), Arc::clone(&state.wallet)).await;

    match identity::resolve_wallet(state.backend.as_ref(), &account).await? {
        Resolved::Existing(user) => state.session.set_identity(user.user_id).await,
        Resolved::NeedsClaim => state.session.set_needs_claim().await,
    }

    if let Ok(balance) = state.wallet.balance(&account).await {
        state.session.set_balance(balance.to_native_string()).await;
    }

    Ok(Json(state.session.snapshot().await))
}

pub async fn disconnect(State(state): State<AppState>) -> Json<SessionState> {
    state.session.disconnect().await;
    Json(state.session.snapshot().await)
}

pub async fn session(State(state): State<AppState>) -> Json<SessionState> {
    Json(state.session.snapshot().await)
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub referral_code: Option<String>,
}

pub async fn claim(
    State(state): State<AppState>,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<SessionState>, AppError> {
    let account = require_account(&state).await?;
    let user = identity::claim(state.backend.as_ref(), &account, req.referral_code.as_deref()).await?;
    state.session.set_identity(user.user_id).await;
    Ok(Json(state.session.snapshot().await))
}

pub async fn packages(State(state): State<AppState>) -> Result<Json<Vec<Package>>, AppError> {
    Ok(Json(state.backend.packages().await?))
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub package_id: String,
}

pub async fn purchase(
    State(state): State<AppState>,
    Json(req): Json<PurchaseRequest>,
) -> Result<Json<PurchaseOutcome>, AppError> {
    let account = require_account(&state).await?;
    let user_id = require_user(&state).await?;

    let package = state
        .backend
        .package_by_id(&req.package_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("package {} not found", req.package_id)))?;

    let outcome = purchase::execute(
        state.backend.as_ref(),
        state.wallet.as_ref(),
        &state.processing,
        &state.company_wallet,
        &account,
        user_id,
        &package,
    )
    .await?;

    Ok(Json(outcome))
}

pub async fn referral_tree(State(state): State<AppState>) -> Result<Json<ReferralNode>, AppError> {
    let user_id = require_user(&state).await?;
    Ok(Json(state.backend.referral_tree(user_id).await?))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: UserStats,
    pub recent_bonuses: Vec<UserBonus>,
    pub total_bonuses: BTreeMap<String, String>,
}

/// Aggregate stats, the latest bonuses, and per-category bonus totals.
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let user_id = require_user(&state).await?;

    let stats = state.backend.user_stats(user_id).await?;
    let recent_bonuses = state.backend.recent_bonuses(user_id, RECENT_BONUS_LIMIT).await?;

    let mut totals: BTreeMap<String, Wei> = BTreeMap::new();
    for bonus in state.backend.bonuses(user_id).await? {
        let amount = Wei::from_native_str(&bonus.amount).unwrap_or_default();
        let slot = totals.entry(bonus.bonus_type).or_default();
        *slot = *slot + amount;
    }
    let total_bonuses = totals
        .into_iter()
        .map(|(category, total)| (category, total.to_native_string()))
        .collect();

    Ok(Json(StatsResponse {
        stats,
        recent_bonuses,
        total_bonuses,
    }))
}
