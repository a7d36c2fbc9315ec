use lazy_static::lazy_static;
use regex::Regex;

pub const BANK_REFERENCE_PREFIX: &str = "ABS";
pub const BANK_REFERENCE_LEN: usize = 8;

pub const MAX_INITIATE_ATTEMPTS: u32 = 3;
pub const INITIATE_BACKOFF_MS: u64 = 500;

pub const MAX_ORDER_SYNC_ATTEMPTS: u32 = 3;
pub const ORDER_SYNC_BACKOFF_MS: u64 = 500;

pub const SWEEP_BATCH_SIZE: i64 = 100;

/// Sandbox MSISDNs published by the mobile-money networks for integration
/// testing. Push requests against these numbers must never leave a
/// production deployment.
pub const SANDBOX_MSISDNS: [&str; 3] = ["254708374149", "254711111111", "254700000000"];

lazy_static! {
    pub static ref MSISDN_PATTERN: Regex = Regex::new(r"^(?:\+?254|0)([17]\d{8})$")
        .expect("Failed to compile regex pattern");
}
