use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::backend::Backend;
use crate::distribution;
use crate::error::AppError;
use crate::model::{Address, Distribution, Package, PurchaseRecord, TxHash};
use crate::units::Wei;
use crate::wallet::WalletProvider;

/// Single-flight guard for the purchase flow. One session, one purchase at a
/// time; the flag is released when the guard drops, success or failure.
#[derive(Default)]
pub struct ProcessingFlag(AtomicBool);

impl ProcessingFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<ProcessingGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Acquire)
            .ok()?;
        Some(ProcessingGuard(&self.0))
    }

    pub fn is_processing(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Serialize)]
pub struct PurchaseOutcome {
    pub package_id: String,
    pub amount: String,
    pub distributions: Vec<Distribution>,
    pub tx_hashes: Vec<TxHash>,
}

/// Run a package purchase end to end: compute the split, submit one transfer
/// per payee strictly in order (each confirmed before the next goes out),
/// then record the purchase in the store.
///
/// A failed transfer aborts the remaining sequence; transfers already
/// confirmed stay on chain. The closing record write is likewise not
/// transactional with the transfers.
pub async fn execute(
    backend: &dyn Backend,
    wallet: &dyn WalletProvider,
    flag: &ProcessingFlag,
    company: &Address,
    buyer: &Address,
    user_id: u64,
    package: &Package,
) -> Result<PurchaseOutcome, AppError> {
    let _guard = flag.try_acquire().ok_or(AppError::Busy)?;

    let total = Wei::from_native_str(&package.bnb_amount)
        .map_err(|err| AppError::BadRequest(format!("invalid package price: {err}")))?;

    let distributions = distribution::calculate_distributions(backend, company, user_id, total).await;

    let mut tx_hashes = Vec::with_capacity(distributions.len());
    for dist in &distributions {
        let value = Wei::from_native_str(&dist.amount)
            .map_err(|err| AppError::Internal(format!("computed amount failed to parse: {err}")))?;
        let tx = wallet.send_transfer(buyer, &dist.address, value).await?;
        wallet.await_confirmation(&tx).await?;
        tracing::info!(%tx, to = %dist.address, amount = %dist.amount, label = %dist.label, "transfer confirmed");
        tx_hashes.push(tx);
    }

    let record = PurchaseRecord {
        user_id,
        package_id: package.id.clone(),
        amount: package.bnb_amount.clone(),
        distributions: distributions.clone(),
    };
    backend.record_purchase(&record).await?;

    Ok(PurchaseOutcome {
        package_id: package.id.clone(),
        amount: package.bnb_amount.clone(),
        distributions,
        tx_hashes,
    })
}
