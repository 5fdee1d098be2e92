use crate::backend::{Backend, BackendError};
use crate::consts::{REFERRAL_CODE_DIGITS, REFERRAL_CODE_PREFIX};
use crate::error::AppError;
use crate::model::{Address, UserRecord};

/// Shareable referral code for a user id: fixed prefix plus the zero-padded
/// numeric id ("242424000007" for user 7).
pub fn referral_code(user_id: u64) -> String {
    format!("{REFERRAL_CODE_PREFIX}{user_id:0width$}", width = REFERRAL_CODE_DIGITS)
}

/// Inverse of [`referral_code`]. Returns `None` for anything that does not
/// look like a code this program issued.
pub fn parse_referral_code(code: &str) -> Option<u64> {
    let digits = code.strip_prefix(REFERRAL_CODE_PREFIX)?;
    if digits.len() < REFERRAL_CODE_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Outcome of resolving a connected wallet against the store.
pub enum Resolved {
    Existing(UserRecord),
    /// Address has never been seen; the user must submit a claim first.
    NeedsClaim,
}

pub async fn resolve_wallet(backend: &dyn Backend, address: &Address) -> Result<Resolved, BackendError> {
    match backend.user_by_wallet(address).await? {
        Some(user) => Ok(Resolved::Existing(user)),
        None => Ok(Resolved::NeedsClaim),
    }
}

/// Create the user row for a newly connected wallet. An optional referral
/// code links the new user under its referrer; without one the user becomes
/// a forest root. Re-claiming a known address returns the existing row
/// instead of inserting a duplicate.
pub async fn claim(backend: &dyn Backend, address: &Address, code: Option<&str>) -> Result<UserRecord, AppError> {
    if let Some(existing) = backend.user_by_wallet(address).await? {
        return Ok(existing);
    }

    let referrer_id = match code.map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => {
            let referrer = backend
                .user_by_referral_code(code)
                .await?
                .ok_or_else(|| AppError::BadRequest("Invalid referral code".into()))?;
            Some(referrer.user_id)
        }
        None => None,
    };

    Ok(backend.create_user(address, referrer_id).await?)
}
