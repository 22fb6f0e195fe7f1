//! Token/Cost Accountant.
//!
//! - [`ledger`]: `TokenAccountant`, usage records, `TokenUsageSummary`
//! - [`estimate_tokens`]: character-based fallback when an endpoint omits usage

pub mod ledger;

pub use ledger::{
    ServiceTokenStats, TokenAccountant, TokenStats, TokenUsageRecord, TokenUsageSummary,
    UnitTokenStats,
};

/// Rough token count: 4 characters per token, rounded up.
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    chars.div_ceil(4)
}
