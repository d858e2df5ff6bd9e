//! Property-Based Tests for Cache and Queue Logic
//!
//! Uses proptest to check staleness, capacity, invalidation and accounting
//! over generated inputs. Async store calls run through `tokio_test::block_on`.

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

use super::stats::rates;
use crate::cache::{CacheEntry, CacheManager};
use crate::config::{CacheStrategy, CacheStrategyConfig, SyncPolicy};
use crate::storage::MemoryStore;
use crate::sync::{
    insert_ordered, queue_order, retry_delay_ms, HttpMethod, NewOperation, Priority, SyncOperation,
};

// == Test Configuration ==
const TEST_VERSION: &str = "1.0.0";
const TEST_TTL: u64 = 60_000;

fn manager() -> CacheManager {
    CacheManager::new(Arc::new(MemoryStore::new()), TEST_VERSION)
}

fn bucket(max_size: usize) -> CacheStrategyConfig {
    CacheStrategyConfig::new(TEST_TTL, max_size, CacheStrategy::CacheFirst)
}

// == Strategies ==
/// Generates key suffixes that never contain the bucket separator
fn suffix_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,12}"
}

fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![Just(Priority::Low), Just(Priority::Medium), Just(Priority::High)]
}

/// Generates a sequence of cache reads and writes for accounting checks
#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: u32 },
    Get { key: String },
    Delete { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    let key = "k[0-4]";
    prop_oneof![
        (key, any::<u32>()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        key.prop_map(|key| CacheOp::Get { key }),
        key.prop_map(|key| CacheOp::Delete { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // An entry is fresh while its age is at most its TTL and stale afterwards.
    #[test]
    fn prop_staleness_boundary(timestamp in 0u64..1 << 40, ttl in 0u64..1 << 30, offset in 0u64..1 << 31) {
        let entry = CacheEntry::new((), ttl, TEST_VERSION, 0);
        let entry = CacheEntry { timestamp, ..entry };
        let now = timestamp + offset;

        prop_assert_eq!(entry.is_stale_at(now), offset > ttl);
        prop_assert!(!entry.is_stale_at(timestamp + ttl));
        prop_assert!(entry.is_stale_at(timestamp + ttl + 1));
    }

    // Every read counts exactly once as a hit or a miss.
    #[test]
    fn prop_hit_miss_accounting(ops in prop::collection::vec(cache_op_strategy(), 1..40)) {
        let cache = manager();
        let config = bucket(100);
        let mut present = HashSet::new();
        let mut expected_hits = 0u64;
        let mut expected_misses = 0u64;

        tokio_test::block_on(async {
            for op in ops {
                match op {
                    CacheOp::Set { key, value } => {
                        cache.set(&key, &value, &config).await.unwrap();
                        present.insert(key);
                    }
                    CacheOp::Get { key } => {
                        let lookup = cache.get::<u32>(&key).await;
                        if present.contains(&key) {
                            assert!(lookup.is_from_cache());
                            expected_hits += 1;
                        } else {
                            assert!(!lookup.is_from_cache());
                            expected_misses += 1;
                        }
                    }
                    CacheOp::Delete { key } => {
                        cache.delete(&key).await.unwrap();
                        present.remove(&key);
                    }
                }
            }
        });

        let stats = tokio_test::block_on(cache.stats());
        prop_assert_eq!(stats.hits, expected_hits);
        prop_assert_eq!(stats.misses, expected_misses);
        prop_assert_eq!(stats.total_entries, present.len());
    }

    // A bucket never holds more than its capacity and always keeps the latest write.
    #[test]
    fn prop_bucket_capacity(
        suffixes in prop::collection::hash_set(suffix_strategy(), 1..30),
        max_size in 1usize..10,
    ) {
        let cache = manager();
        let config = bucket(max_size);
        let written = suffixes.len();

        tokio_test::block_on(async {
            // An unrelated bucket is never touched by eviction
            cache.set("other", &0u32, &bucket(1)).await.unwrap();

            for suffix in suffixes {
                let key = format!("routes:{}", suffix);
                cache.set(&key, &1u32, &config).await.unwrap();

                let keys = cache.keys().await.unwrap();
                let in_bucket = keys.iter().filter(|k| k.starts_with("routes:")).count();
                assert!(in_bucket <= max_size);
                assert!(keys.contains(&key));
                assert!(keys.contains(&"other".to_string()));
            }
        });

        let keys = tokio_test::block_on(cache.keys()).unwrap();
        let in_bucket = keys.iter().filter(|k| k.starts_with("routes:")).count();
        prop_assert_eq!(in_bucket, written.min(max_size));
    }

    // Invalidation removes exactly the keys containing the pattern.
    #[test]
    fn prop_invalidate_precision(
        keys in prop::collection::hash_set("[a-c]{1,4}", 1..20),
        pattern in "[a-c]{1,2}",
    ) {
        let cache = manager();
        let config = bucket(100);

        let removed = tokio_test::block_on(async {
            for key in &keys {
                cache.set(key, &1u32, &config).await.unwrap();
            }
            cache.invalidate(&pattern).await.unwrap()
        });

        let expected: HashSet<&String> = keys.iter().filter(|k| !k.contains(&pattern)).collect();
        let remaining = tokio_test::block_on(cache.keys()).unwrap();
        let remaining: HashSet<&String> = remaining.iter().collect();

        prop_assert_eq!(removed, keys.len() - expected.len());
        prop_assert_eq!(remaining, expected);
    }

    // Rates always sum to one once anything has been read.
    #[test]
    fn prop_rates_sum(hits in 0u64..10_000, misses in 0u64..10_000) {
        let (hit_rate, miss_rate) = rates(hits, misses);
        if hits + misses == 0 {
            prop_assert_eq!((hit_rate, miss_rate), (0.0, 0.0));
        } else {
            prop_assert!((hit_rate + miss_rate - 1.0).abs() < 1e-9);
        }
    }

    // Backoff delays strictly increase with the retry count.
    #[test]
    fn prop_backoff_increasing(base in 100u64..5_000, multiplier in 1.5f64..4.0, retries in 1u32..10) {
        let policy = SyncPolicy {
            retry_delay_ms: base,
            backoff_multiplier: multiplier,
            ..SyncPolicy::default()
        };

        for count in 0..retries {
            prop_assert!(retry_delay_ms(&policy, count + 1) > retry_delay_ms(&policy, count));
        }
    }

    // Ordered insertion keeps the queue sorted by priority, then timestamp.
    #[test]
    fn prop_insert_ordered_sorted(ops in prop::collection::vec((priority_strategy(), 0u64..100), 0..40)) {
        let mut queue: Vec<SyncOperation> = Vec::new();
        for (priority, timestamp) in ops {
            let mut op = SyncOperation::from_new(
                NewOperation::new("t", HttpMethod::Post, "/x", serde_json::Value::Null)
                    .with_priority(priority),
            );
            op.timestamp = timestamp;
            insert_ordered(&mut queue, op);
        }

        for pair in queue.windows(2) {
            prop_assert_ne!(queue_order(&pair[0], &pair[1]), std::cmp::Ordering::Greater);
        }
    }
}
