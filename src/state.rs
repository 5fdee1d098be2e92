use std::sync::Arc;

use crate::backend::Backend;
use crate::model::Address;
use crate::purchase::ProcessingFlag;
use crate::session::Session;
use crate::wallet::{ChainSpec, WalletProvider};

/// Shared handles for the HTTP layer.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn Backend>,
    pub wallet: Arc<dyn WalletProvider>,
    pub session: Arc<Session>,
    pub processing: Arc<ProcessingFlag>,
    pub company_wallet: Address,
    pub chain: ChainSpec,
}

impl AppState {
    pub fn new(
        backend: Arc<dyn Backend>,
        wallet: Arc<dyn WalletProvider>,
        company_wallet: Address,
        chain: ChainSpec,
    ) -> Self {
        AppState {
            backend,
            wallet,
            session: Arc::new(Session::new()),
            processing: Arc::new(ProcessingFlag::new()),
            company_wallet,
            chain,
        }
    }
}
