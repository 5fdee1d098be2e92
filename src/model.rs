use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::units::Percent;

// ============================================================
// Chain-side primitives
// ============================================================

#[derive(Debug, Error)]
#[error("invalid address: {0:?}")]
pub struct AddressParseError(String);

/// 20-byte account address in 0x-hex form. Case is preserved as received.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix("0x").ok_or_else(|| AddressParseError(s.into()))?;
        if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AddressParseError(s.into()));
        }
        Ok(Address(s.to_owned()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================
// Backend rows
// ============================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: u64,
    pub wallet_address: Address,
    pub referrer_id: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    pub name: String,
    #[serde(deserialize_with = "decimal_string")]
    pub bnb_amount: String,
}

/// Prebuilt referral tree returned by the backend procedure.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralNode {
    pub user_id: u64,
    pub referral_id: String,
    #[serde(default)]
    pub children: Vec<ReferralNode>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserStats {
    pub direct_referrals_count: u64,
    pub community_size: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserBonus {
    pub bonus_type: String,
    #[serde(deserialize_with = "decimal_string")]
    pub amount: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================
// Purchase records
// ============================================================

/// One payee of a package payment. `amount` is a native-unit decimal string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub address: Address,
    pub amount: String,
    pub percentage: Percent,
    #[serde(rename = "type")]
    pub label: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct PurchaseRecord {
    pub user_id: u64,
    pub package_id: String,
    pub amount: String,
    pub distributions: Vec<Distribution>,
}

/// The store serializes numeric columns as JSON numbers; keep them as decimal
/// strings so amounts never pass through floating point on the money path.
fn decimal_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    struct DecimalVisitor;

    impl Visitor<'_> for DecimalVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a decimal number or string")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_owned())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(DecimalVisitor)
}
