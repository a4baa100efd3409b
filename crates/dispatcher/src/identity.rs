//! Dispatcher instance identity

use chrono::Utc;
use rand::Rng;

/// Separator between the creation time and the random suffix
pub const INSTANCE_ID_SEPARATOR: &str = "__SEP__";

/// Exclusive upper bound of the random suffix
const RANDOM_SUFFIX_BOUND: u32 = 1_000_000;

/// Generate a fresh instance identity: `"<epoch-ms>__SEP__<random-int>"`
///
/// Uniqueness between live instances is probabilistic, not cryptographic.
pub fn generate_instance_id() -> String {
    let created_ms = Utc::now().timestamp_millis();
    let suffix = rand::rng().random_range(0..RANDOM_SUFFIX_BOUND);
    format!("{created_ms}{INSTANCE_ID_SEPARATOR}{suffix}")
}
