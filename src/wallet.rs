use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::consts::*;
use crate::model::{Address, TxHash};
use crate::units::Wei;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("user rejected the request")]
    Rejected,
    #[error("no account available in the wallet")]
    NoAccounts,
    #[error("provider error {code}: {message}")]
    Provider { code: i64, message: String },
    #[error("transfer {0} reverted on chain")]
    TransferReverted(TxHash),
    #[error("timed out waiting for confirmation of {0}")]
    ConfirmationTimeout(TxHash),
    #[error("malformed provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Clone, Debug)]
pub enum WalletEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(String),
}

// ============================================================
// Chain metadata for the switch/add flow
// ============================================================

#[derive(Clone, Debug, Serialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Parameter block for `wallet_addEthereumChain`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSpec {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

impl ChainSpec {
    pub fn bnb_smart_chain() -> Self {
        ChainSpec {
            chain_id: CHAIN_ID_HEX.into(),
            chain_name: CHAIN_NAME.into(),
            native_currency: NativeCurrency {
                name: NATIVE_NAME.into(),
                symbol: NATIVE_SYMBOL.into(),
                decimals: NATIVE_DECIMALS,
            },
            rpc_urls: vec![CHAIN_RPC_URL.into()],
            block_explorer_urls: vec![CHAIN_EXPLORER_URL.into()],
        }
    }
}

// ============================================================
// Provider capability
// ============================================================

/// The slice of the EIP-1193 provider surface the dashboard needs. Everything
/// is awaited sequentially by callers; nothing here retries.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError>;
    async fn chain_id(&self) -> Result<String, WalletError>;
    async fn switch_chain(&self, chain_id: &str) -> Result<(), WalletError>;
    async fn add_chain(&self, spec: &ChainSpec) -> Result<(), WalletError>;
    async fn balance(&self, address: &Address) -> Result<Wei, WalletError>;
    async fn send_transfer(&self, from: &Address, to: &Address, value: Wei) -> Result<TxHash, WalletError>;
    async fn await_confirmation(&self, tx: &TxHash) -> Result<(), WalletError>;
    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;
}

/// Switch the wallet to `spec`, falling back to an add-chain prompt when the
/// provider does not know the chain (code 4902).
pub async fn ensure_chain(wallet: &dyn WalletProvider, spec: &ChainSpec) -> Result<(), WalletError> {
    match wallet.switch_chain(&spec.chain_id).await {
        Err(WalletError::Provider { code, .. }) if code == UNRECOGNIZED_CHAIN_CODE => {
            wallet.add_chain(spec).await
        }
        other => other,
    }
}

// ============================================================
// JSON-RPC implementation
// ============================================================

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct TransactionReceipt {
    status: Option<String>,
}

pub struct JsonRpcWallet {
    client: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
    events: broadcast::Sender<WalletEvent>,
}

impl JsonRpcWallet {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        let (events, _) = broadcast::channel(16);
        JsonRpcWallet {
            client,
            endpoint: endpoint.into(),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    fn map_error(err: RpcErrorBody) -> WalletError {
        if err.code == USER_REJECTED_CODE {
            WalletError::Rejected
        } else {
            WalletError::Provider {
                code: err.code,
                message: err.message,
            }
        }
    }

    /// One request/response round trip; `result: null` comes back as `None`.
    async fn call_opt<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>, WalletError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });
        let resp = self.client.post(&self.endpoint).json(&body).send().await?;
        let parsed: RpcResponse<T> = resp.json().await?;
        if let Some(err) = parsed.error {
            return Err(Self::map_error(err));
        }
        Ok(parsed.result)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, WalletError> {
        self.call_opt(method, params)
            .await?
            .ok_or_else(|| WalletError::InvalidResponse(format!("{method} returned no result")))
    }

    /// Methods like `wallet_switchEthereumChain` answer with `null` on success.
    async fn call_void(&self, method: &str, params: Value) -> Result<(), WalletError> {
        self.call_opt::<Value>(method, params).await.map(|_| ())
    }

    /// HTTP transports carry no provider push notifications, so account and
    /// chain changes are observed by polling.
    pub fn spawn_watcher(self: &Arc<Self>) -> JoinHandle<()> {
        let wallet = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(WALLET_POLL_SECS));
            let mut last_accounts: Option<Vec<Address>> = None;
            let mut last_chain: Option<String> = None;
            loop {
                ticker.tick().await;
                if let Ok(accounts) = wallet.call::<Vec<Address>>("eth_accounts", json!([])).await {
                    if last_accounts.as_ref().is_some_and(|prev| *prev != accounts) {
                        let _ = wallet.events.send(WalletEvent::AccountsChanged(accounts.clone()));
                    }
                    last_accounts = Some(accounts);
                }
                if let Ok(chain) = wallet.call::<String>("eth_chainId", json!([])).await {
                    if last_chain.as_ref().is_some_and(|prev| *prev != chain) {
                        let _ = wallet.events.send(WalletEvent::ChainChanged(chain.clone()));
                    }
                    last_chain = Some(chain);
                }
            }
        })
    }
}

#[async_trait]
impl WalletProvider for JsonRpcWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        let accounts: Vec<Address> = self.call("eth_requestAccounts", json!([])).await?;
        if accounts.is_empty() {
            return Err(WalletError::NoAccounts);
        }
        Ok(accounts)
    }

    async fn chain_id(&self) -> Result<String, WalletError> {
        self.call("eth_chainId", json!([])).await
    }

    async fn switch_chain(&self, chain_id: &str) -> Result<(), WalletError> {
        self.call_void("wallet_switchEthereumChain", json!([{ "chainId": chain_id }]))
            .await
    }

    async fn add_chain(&self, spec: &ChainSpec) -> Result<(), WalletError> {
        self.call_void("wallet_addEthereumChain", json!([spec])).await
    }

    async fn balance(&self, address: &Address) -> Result<Wei, WalletError> {
        let raw: String = self
            .call("eth_getBalance", json!([address.as_str(), "latest"]))
            .await?;
        Wei::from_hex_str(&raw).map_err(|_| WalletError::InvalidResponse(format!("bad balance quantity {raw:?}")))
    }

    async fn send_transfer(&self, from: &Address, to: &Address, value: Wei) -> Result<TxHash, WalletError> {
        self.call(
            "eth_sendTransaction",
            json!([{
                "from": from.as_str(),
                "to": to.as_str(),
                "value": value.to_hex(),
            }]),
        )
        .await
    }

    async fn await_confirmation(&self, tx: &TxHash) -> Result<(), WalletError> {
        for _ in 0..RECEIPT_POLL_ATTEMPTS {
            let receipt: Option<TransactionReceipt> = self
                .call_opt("eth_getTransactionReceipt", json!([tx.0]))
                .await?;
            if let Some(receipt) = receipt {
                return match receipt.status.as_deref() {
                    Some("0x1") => Ok(()),
                    _ => Err(WalletError::TransferReverted(tx.clone())),
                };
            }
            tokio::time::sleep(Duration::from_millis(RECEIPT_POLL_INTERVAL_MS)).await;
        }
        Err(WalletError::ConfirmationTimeout(tx.clone()))
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}
