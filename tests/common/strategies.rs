use proptest::prelude::*;
use std::time::Duration;
use strata_core::resilience::RetryConfig;
use strata_core::{Failure, Outcome};

/// Strategy for generating failures across every kind
pub fn failure_strategy() -> impl Strategy<Value = Failure> {
    let message = "[a-z ]{1,24}";
    prop_oneof![
        message.prop_map(Failure::network),
        message.prop_map(Failure::timeout),
        message.prop_map(|m| Failure::validation(m, Vec::new())),
        message.prop_map(Failure::auth),
        message.prop_map(Failure::forbidden),
        message.prop_map(Failure::not_found),
        message.prop_map(Failure::conflict),
        (message, prop::option::of(0u64..120))
            .prop_map(|(m, secs)| Failure::rate_limit(m, secs.map(Duration::from_secs))),
        (500u16..600, message).prop_map(|(status, m)| Failure::server(status, m)),
        "[a-z_]{1,16}".prop_map(|name| Failure::circuit_open(&name)),
        message.prop_map(Failure::cache),
        message.prop_map(Failure::unexpected),
    ]
}

/// Strategy for generating outcomes over small integers
pub fn outcome_strategy() -> impl Strategy<Value = Outcome<i64>> {
    prop_oneof![
        3 => (-1000i64..1000).prop_map(Ok),
        1 => failure_strategy().prop_map(Err),
    ]
}

/// Strategy for generating valid retry configurations
pub fn retry_config_strategy() -> impl Strategy<Value = RetryConfig> {
    (0u32..10, 1u64..1_000, 1u64..60_000).prop_map(|(max_retries, base_ms, extra_ms)| {
        RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(base_ms + extra_ms),
            jitter_factor: 0.0,
        }
    })
}

/// Operations applied to an LRU store in property tests
#[derive(Debug, Clone)]
pub enum CacheOp {
    Set(u8),
    Get(u8),
}

/// Strategy for generating a sequence of cache operations over a small key space
pub fn cache_ops_strategy() -> impl Strategy<Value = Vec<CacheOp>> {
    prop::collection::vec(
        prop_oneof![
            (0u8..16).prop_map(CacheOp::Set),
            (0u8..16).prop_map(CacheOp::Get),
        ],
        1..64,
    )
}

/// Strategy for generating (total items, page size) pairs
pub fn paging_strategy() -> impl Strategy<Value = (u64, u32)> {
    (0u64..200, 1u32..25)
}
