pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:54321";
pub const DEFAULT_WALLET_RPC_URL: &str = "http://127.0.0.1:8545";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: &str = "3001";

/// Program payout wallet, overridable via `COMPANY_WALLET`
pub const DEFAULT_COMPANY_WALLET: &str = "0xE484201328c61Fbc8aCc316B9Ea4b2dC3A4EDEA9";

/// BNB Smart Chain mainnet
pub const CHAIN_ID_HEX: &str = "0x38";
pub const CHAIN_NAME: &str = "BNB Smart Chain";
pub const NATIVE_NAME: &str = "BNB";
pub const NATIVE_SYMBOL: &str = "BNB";
pub const NATIVE_DECIMALS: u8 = 18;
pub const CHAIN_RPC_URL: &str = "https://bsc-dataseed.binance.org/";
pub const CHAIN_EXPLORER_URL: &str = "https://bscscan.com/";

/// Payout split, carried in tenths of a percent
pub const RATE_DENOMINATOR: u32 = 1000;
pub const COMPANY_RATE: u32 = 100;
pub const DIRECT_REFERRER_RATE: u32 = 702;
pub const LEVEL_RATE: u32 = 18;

/// Upline walk depth: level 1 is the direct referrer, levels 2..=11 earn 1.8%
pub const MAX_REFERRAL_LEVELS: u32 = 11;

/// Referral codes: fixed prefix + zero-padded numeric user id
pub const REFERRAL_CODE_PREFIX: &str = "242424";
pub const REFERRAL_CODE_DIGITS: usize = 6;

pub const BALANCE_REFRESH_SECS: u64 = 10;
pub const WALLET_POLL_SECS: u64 = 3;
pub const RECEIPT_POLL_INTERVAL_MS: u64 = 3_000;
pub const RECEIPT_POLL_ATTEMPTS: u32 = 60;
pub const RECENT_BONUS_LIMIT: u32 = 10;

/// EIP-1193 provider error codes
pub const USER_REJECTED_CODE: i64 = 4001;
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;
