//! Placement metrics.

use metrics::{counter, describe_counter};

/// Cache lookups, labelled `result=hit|miss|error`.
pub const CACHE_REQUESTS: &str = "yoda_cache_requests_total";

/// ARB decisions, labelled by decision.
pub const ARB_DECISIONS: &str = "yoda_arb_decisions_total";

/// Registers placement metric descriptions.
pub fn register_metrics() {
    describe_counter!(CACHE_REQUESTS, "Cached data manager lookups by result");
    describe_counter!(ARB_DECISIONS, "ARB resolutions by decision");
}

pub(crate) fn record_cache(result: &'static str) {
    counter!(CACHE_REQUESTS, "result" => result).increment(1);
}

pub(crate) fn record_decision(decision: &'static str) {
    counter!(ARB_DECISIONS, "decision" => decision).increment(1);
}
