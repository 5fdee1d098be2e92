use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::backend::Backend;
use crate::consts::BALANCE_REFRESH_SECS;
use crate::identity::{self, Resolved};
use crate::model::Address;
use crate::wallet::{WalletEvent, WalletProvider};

/// What the dashboard shows: connection state, identity, cached balance.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SessionState {
    pub connected: bool,
    pub account: Option<Address>,
    pub balance: Option<String>,
    pub user_id: Option<u64>,
    pub referral_code: Option<String>,
    pub needs_claim: bool,
}

/// The single interactive session this service fronts. Holds the state
/// snapshot and the handle of the periodic balance-refresh task.
pub struct Session {
    state: RwLock<SessionState>,
    refresh: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn new() -> Self {
        Session {
            state: RwLock::new(SessionState::default()),
            refresh: Mutex::new(None),
        }
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn account(&self) -> Option<Address> {
        self.state.read().await.account.clone()
    }

    pub async fn user_id(&self) -> Option<u64> {
        self.state.read().await.user_id
    }

    pub async fn set_identity(&self, user_id: u64) {
        let mut state = self.state.write().await;
        state.user_id = Some(user_id);
        state.referral_code = Some(identity::referral_code(user_id));
        state.needs_claim = false;
    }

    pub async fn set_needs_claim(&self) {
        let mut state = self.state.write().await;
        state.user_id = None;
        state.referral_code = None;
        state.needs_claim = true;
    }

    pub async fn set_balance(&self, balance: String) {
        self.state.write().await.balance = Some(balance);
    }

    /// Mark the session connected and (re)start the balance refresh for the
    /// new account. Any refresh task for a previous account is torn down.
    pub async fn connect(self: &Arc<Self>, account: Address, wallet: Arc<dyn WalletProvider>) {
        {
            let mut state = self.state.write().await;
            state.connected = true;
            state.account = Some(account.clone());
            state.balance = None;
            state.user_id = None;
            state.referral_code = None;
            state.needs_claim = false;
        }
        self.start_balance_refresh(account, wallet).await;
    }

    /// Tear down the refresh task and drop all session state.
    pub async fn disconnect(&self) {
        if let Some(handle) = self.refresh.lock().await.take() {
            handle.abort();
        }
        *self.state.write().await = SessionState::default();
    }

    async fn start_balance_refresh(self: &Arc<Self>, account: Address, wallet: Arc<dyn WalletProvider>) {
        let session = Arc::clone(self);
        let handle = tokio::spawn(async move {
            // First tick fires immediately, then every BALANCE_REFRESH_SECS.
            let mut ticker = tokio::time::interval(Duration::from_secs(BALANCE_REFRESH_SECS));
            loop {
                ticker.tick().await;
                match wallet.balance(&account).await {
                    Ok(balance) => session.set_balance(balance.to_native_string()).await,
                    Err(err) => tracing::warn!(%account, "balance refresh failed: {err}"),
                }
            }
        });
        if let Some(previous) = self.refresh.lock().await.replace(handle) {
            previous.abort();
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

/// React to provider notifications: an account change re-resolves identity,
/// an empty account list disconnects, and a chain change resets the session
/// outright rather than reconciling state in place.
pub fn spawn_wallet_watcher(
    session: Arc<Session>,
    backend: Arc<dyn Backend>,
    wallet: Arc<dyn WalletProvider>,
) -> JoinHandle<()> {
    let mut events = wallet.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(WalletEvent::AccountsChanged(accounts)) => match accounts.into_iter().next() {
                    Some(account) => {
                        tracing::info!(%account, "wallet account changed");
                        session.connect(account.clone(), Arc::clone(&wallet)).await;
                        match identity::resolve_wallet(backend.as_ref(), &account).await {
                            Ok(Resolved::Existing(user)) => session.set_identity(user.user_id).await,
                            Ok(Resolved::NeedsClaim) => session.set_needs_claim().await,
                            Err(err) => {
                                tracing::warn!("identity lookup failed after account change: {err}")
                            }
                        }
                    }
                    None => {
                        tracing::info!("wallet reported no accounts, disconnecting");
                        session.disconnect().await;
                    }
                },
                Ok(WalletEvent::ChainChanged(chain_id)) => {
                    tracing::warn!(%chain_id, "chain changed, resetting session");
                    session.disconnect().await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "wallet event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
