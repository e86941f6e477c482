use proptest::prelude::*;

/// Cumulative counter readings as a gateway would report them
pub fn used_bytes_strategy() -> impl Strategy<Value = i64> {
    prop_oneof![
        Just(0i64),
        0i64..1_000_000,
        0i64..=i64::MAX,
    ]
}

/// Optional previous reading; `None` models a key seen for the first time
pub fn previous_reading_strategy() -> impl Strategy<Value = Option<i64>> {
    prop::option::of(used_bytes_strategy())
}

/// Sequence of cumulative readings with occasional counter resets
pub fn reading_sequence_strategy() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0i64..10_000_000_000, 1..20)
}

/// Floor and cap in seconds with cap >= floor
pub fn backoff_bounds_strategy() -> impl Strategy<Value = (u64, u64)> {
    (1u64..600).prop_flat_map(|floor| (Just(floor), floor..floor * 64))
}
