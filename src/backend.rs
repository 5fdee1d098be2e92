use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;

use crate::model::{Address, Package, PurchaseRecord, ReferralNode, UserBonus, UserRecord, UserStats};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("backend request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed backend response: {0}")]
    InvalidResponse(String),
}

/// Query/command surface of the managed store. Point reads return `Ok(None)`
/// for an absent row; `Err` means the store itself failed.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn user_by_wallet(&self, address: &Address) -> Result<Option<UserRecord>, BackendError>;
    async fn user_by_id(&self, user_id: u64) -> Result<Option<UserRecord>, BackendError>;
    async fn user_by_referral_code(&self, code: &str) -> Result<Option<UserRecord>, BackendError>;
    async fn create_user(&self, address: &Address, referrer_id: Option<u64>) -> Result<UserRecord, BackendError>;
    async fn packages(&self) -> Result<Vec<Package>, BackendError>;
    async fn package_by_id(&self, id: &str) -> Result<Option<Package>, BackendError>;
    async fn record_purchase(&self, purchase: &PurchaseRecord) -> Result<(), BackendError>;
    async fn referral_tree(&self, root_user_id: u64) -> Result<ReferralNode, BackendError>;
    async fn user_stats(&self, user_id: u64) -> Result<UserStats, BackendError>;
    async fn recent_bonuses(&self, user_id: u64, limit: u32) -> Result<Vec<UserBonus>, BackendError>;
    async fn bonuses(&self, user_id: u64) -> Result<Vec<UserBonus>, BackendError>;
}

// ============================================================
// REST implementation (PostgREST-style endpoint)
// ============================================================

const USER_COLUMNS: &str = "user_id,wallet_address,referrer_id";

pub struct RestBackend {
    base: String,
    key: String,
    client: reqwest::Client,
}

impl RestBackend {
    pub fn new(base: impl Into<String>, key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        RestBackend {
            base,
            key: key.into(),
            client,
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base)
    }

    fn rpc_url(&self, procedure: &str) -> String {
        format!("{}/rest/v1/rpc/{procedure}", self.base)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.key).bearer_auth(&self.key)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<T>, BackendError> {
        let req = self.authed(self.client.get(self.table_url(table))).query(query);
        let resp = Self::check(req.send().await?).await?;
        Ok(resp.json().await?)
    }

    async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, BackendError> {
        let mut query = query.to_vec();
        query.push(("limit", "1".into()));
        Ok(self.select(table, &query).await?.into_iter().next())
    }

    async fn user_where(&self, column: &str, value: String) -> Result<Option<UserRecord>, BackendError> {
        self.select_one(
            "wallet_users",
            &[("select", USER_COLUMNS.into()), (column, value)],
        )
        .await
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn user_by_wallet(&self, address: &Address) -> Result<Option<UserRecord>, BackendError> {
        self.user_where("wallet_address", format!("eq.{address}")).await
    }

    async fn user_by_id(&self, user_id: u64) -> Result<Option<UserRecord>, BackendError> {
        self.user_where("user_id", format!("eq.{user_id}")).await
    }

    async fn user_by_referral_code(&self, code: &str) -> Result<Option<UserRecord>, BackendError> {
        self.user_where("referral_id", format!("eq.{code}")).await
    }

    async fn create_user(&self, address: &Address, referrer_id: Option<u64>) -> Result<UserRecord, BackendError> {
        let req = self
            .authed(self.client.post(self.table_url("wallet_users")))
            .header("Prefer", "return=representation")
            .query(&[("select", USER_COLUMNS)])
            .json(&json!([{
                "wallet_address": address,
                "referrer_id": referrer_id,
            }]));
        let resp = Self::check(req.send().await?).await?;
        let mut rows: Vec<UserRecord> = resp.json().await?;
        rows.pop()
            .ok_or_else(|| BackendError::InvalidResponse("insert returned no row".into()))
    }

    async fn packages(&self) -> Result<Vec<Package>, BackendError> {
        self.select(
            "packages",
            &[("select", "*".into()), ("order", "bnb_amount.asc".into())],
        )
        .await
    }

    async fn package_by_id(&self, id: &str) -> Result<Option<Package>, BackendError> {
        self.select_one("packages", &[("select", "*".into()), ("id", format!("eq.{id}"))])
            .await
    }

    async fn record_purchase(&self, purchase: &PurchaseRecord) -> Result<(), BackendError> {
        let req = self
            .authed(self.client.post(self.table_url("package_purchases")))
            .header("Prefer", "return=minimal")
            .json(&json!([purchase]));
        Self::check(req.send().await?).await?;
        Ok(())
    }

    async fn referral_tree(&self, root_user_id: u64) -> Result<ReferralNode, BackendError> {
        let req = self
            .authed(self.client.post(self.rpc_url("get_referral_tree")))
            .json(&json!({ "root_user_id": root_user_id }));
        let resp = Self::check(req.send().await?).await?;
        Ok(resp.json().await?)
    }

    async fn user_stats(&self, user_id: u64) -> Result<UserStats, BackendError> {
        self.select_one("user_stats", &[("select", "*".into()), ("user_id", format!("eq.{user_id}"))])
            .await?
            .ok_or(BackendError::NotFound("user stats"))
    }

    async fn recent_bonuses(&self, user_id: u64, limit: u32) -> Result<Vec<UserBonus>, BackendError> {
        self.select(
            "user_bonuses",
            &[
                ("select", "*".into()),
                ("user_id", format!("eq.{user_id}")),
                ("order", "created_at.desc".into()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn bonuses(&self, user_id: u64) -> Result<Vec<UserBonus>, BackendError> {
        self.select(
            "user_bonuses",
            &[("select", "*".into()), ("user_id", format!("eq.{user_id}"))],
        )
        .await
    }
}

#[cfg(test)]
pub mod testing {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;
    use crate::identity;

    /// In-memory store with per-user failure injection for exercising the
    /// distribution fallback and the purchase flow.
    pub struct MockBackend {
        pub users: Mutex<HashMap<u64, UserRecord>>,
        pub packages: Vec<Package>,
        pub purchases: Mutex<Vec<PurchaseRecord>>,
        pub bonuses: Vec<UserBonus>,
        pub stats: Option<UserStats>,
        /// `user_by_id` for these ids fails as a store error, not a miss.
        pub fail_user_ids: HashSet<u64>,
        pub fail_record_purchase: bool,
        next_user_id: AtomicU64,
    }

    impl MockBackend {
        pub fn new() -> Self {
            MockBackend {
                users: Mutex::new(HashMap::new()),
                packages: Vec::new(),
                purchases: Mutex::new(Vec::new()),
                bonuses: Vec::new(),
                stats: None,
                fail_user_ids: HashSet::new(),
                fail_record_purchase: false,
                next_user_id: AtomicU64::new(1),
            }
        }

        pub fn with_user(self, user_id: u64, wallet: &str, referrer_id: Option<u64>) -> Self {
            let record = UserRecord {
                user_id,
                wallet_address: wallet.parse().expect("test wallet address"),
                referrer_id,
            };
            self.users.lock().unwrap().insert(user_id, record);
            let next = self.next_user_id.load(Ordering::Relaxed).max(user_id + 1);
            self.next_user_id.store(next, Ordering::Relaxed);
            self
        }

        /// Linear referrer chain: user 1 is the buyer, user n+1 refers user n.
        pub fn with_chain(mut self, len: u64) -> Self {
            for id in 1..=len + 1 {
                let referrer = if id <= len { Some(id + 1) } else { None };
                self = self.with_user(id, &test_wallet(id), referrer);
            }
            self
        }

        pub fn with_package(mut self, id: &str, name: &str, bnb_amount: &str) -> Self {
            self.packages.push(Package {
                id: id.into(),
                name: name.into(),
                bnb_amount: bnb_amount.into(),
            });
            self
        }

        pub fn with_bonus(mut self, bonus_type: &str, amount: &str) -> Self {
            self.bonuses.push(UserBonus {
                bonus_type: bonus_type.into(),
                amount: amount.into(),
                created_at: Utc::now(),
            });
            self
        }

        pub fn fail_user(mut self, user_id: u64) -> Self {
            self.fail_user_ids.insert(user_id);
            self
        }

        pub fn fail_record_purchase(mut self) -> Self {
            self.fail_record_purchase = true;
            self
        }

        fn store_error() -> BackendError {
            BackendError::Status {
                status: 500,
                body: "injected failure".into(),
            }
        }
    }

    pub fn test_wallet(id: u64) -> String {
        format!("0x{id:040x}")
    }

    #[async_trait]
    impl Backend for MockBackend {
        async fn user_by_wallet(&self, address: &Address) -> Result<Option<UserRecord>, BackendError> {
            let users = self.users.lock().unwrap();
            Ok(users.values().find(|u| u.wallet_address == *address).cloned())
        }

        async fn user_by_id(&self, user_id: u64) -> Result<Option<UserRecord>, BackendError> {
            if self.fail_user_ids.contains(&user_id) {
                return Err(Self::store_error());
            }
            Ok(self.users.lock().unwrap().get(&user_id).cloned())
        }

        async fn user_by_referral_code(&self, code: &str) -> Result<Option<UserRecord>, BackendError> {
            let Some(user_id) = identity::parse_referral_code(code) else {
                return Ok(None);
            };
            self.user_by_id(user_id).await
        }

        async fn create_user(&self, address: &Address, referrer_id: Option<u64>) -> Result<UserRecord, BackendError> {
            let user_id = self.next_user_id.fetch_add(1, Ordering::Relaxed);
            let record = UserRecord {
                user_id,
                wallet_address: address.clone(),
                referrer_id,
            };
            self.users.lock().unwrap().insert(user_id, record.clone());
            Ok(record)
        }

        async fn packages(&self) -> Result<Vec<Package>, BackendError> {
            Ok(self.packages.clone())
        }

        async fn package_by_id(&self, id: &str) -> Result<Option<Package>, BackendError> {
            Ok(self.packages.iter().find(|p| p.id == id).cloned())
        }

        async fn record_purchase(&self, purchase: &PurchaseRecord) -> Result<(), BackendError> {
            if self.fail_record_purchase {
                return Err(Self::store_error());
            }
            self.purchases.lock().unwrap().push(purchase.clone());
            Ok(())
        }

        async fn referral_tree(&self, root_user_id: u64) -> Result<ReferralNode, BackendError> {
            Ok(ReferralNode {
                user_id: root_user_id,
                referral_id: identity::referral_code(root_user_id),
                children: Vec::new(),
            })
        }

        async fn user_stats(&self, _user_id: u64) -> Result<UserStats, BackendError> {
            self.stats.clone().ok_or(BackendError::NotFound("user stats"))
        }

        async fn recent_bonuses(&self, _user_id: u64, limit: u32) -> Result<Vec<UserBonus>, BackendError> {
            Ok(self.bonuses.iter().take(limit as usize).cloned().collect())
        }

        async fn bonuses(&self, _user_id: u64) -> Result<Vec<UserBonus>, BackendError> {
            Ok(self.bonuses.clone())
        }
    }
}
