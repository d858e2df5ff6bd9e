//! Queue ordering and retry scheduling.

use std::cmp::Ordering;

use crate::config::SyncPolicy;
use crate::sync::{OperationStatus, SyncOperation};

// == Ordering ==
/// Queue order: priority descending, then enqueue time ascending.
pub fn queue_order(a: &SyncOperation, b: &SyncOperation) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.timestamp.cmp(&b.timestamp))
}

/// Inserts `op` after every operation that sorts before or equal to it, so
/// operations with equal priority and timestamp keep arrival order.
pub fn insert_ordered(queue: &mut Vec<SyncOperation>, op: SyncOperation) {
    let index = queue.partition_point(|existing| queue_order(existing, &op) != Ordering::Greater);
    queue.insert(index, op);
}

// == Backoff ==
/// Delay before the next attempt of an operation that has failed
/// `retry_count` times: `retry_delay * backoff_multiplier ^ retry_count`.
pub fn retry_delay_ms(policy: &SyncPolicy, retry_count: u32) -> u64 {
    let factor = policy.backoff_multiplier.powi(retry_count as i32);
    let delay = policy.retry_delay_ms as f64 * factor;
    if delay.is_finite() && delay < u64::MAX as f64 {
        delay as u64
    } else {
        u64::MAX
    }
}

// == Record Failure ==
/// Applies one failed attempt to `op`: bumps the retry count and either
/// schedules the next attempt or marks the operation failed.
pub fn record_failure(op: &mut SyncOperation, error: String, policy: &SyncPolicy, now: u64) {
    op.retry_count += 1;
    op.last_error = Some(error);

    if op.retry_count >= op.max_retries {
        op.status = OperationStatus::Failed;
    } else {
        op.next_attempt_at = now.saturating_add(retry_delay_ms(policy, op.retry_count));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{HttpMethod, NewOperation, Priority};
    use serde_json::json;

    fn op(priority: Priority, timestamp: u64) -> SyncOperation {
        let mut op = SyncOperation::from_new(
            NewOperation::new("t", HttpMethod::Post, "/x", json!({})).with_priority(priority),
        );
        op.timestamp = timestamp;
        op
    }

    #[test]
    fn test_insert_ordered_priority_then_time() {
        let mut queue = Vec::new();
        insert_ordered(&mut queue, op(Priority::Low, 1));
        insert_ordered(&mut queue, op(Priority::High, 2));
        insert_ordered(&mut queue, op(Priority::Medium, 3));
        insert_ordered(&mut queue, op(Priority::High, 0));

        let order: Vec<(Priority, u64)> = queue.iter().map(|o| (o.priority, o.timestamp)).collect();
        assert_eq!(
            order,
            vec![
                (Priority::High, 0),
                (Priority::High, 2),
                (Priority::Medium, 3),
                (Priority::Low, 1),
            ]
        );
    }

    #[test]
    fn test_insert_ordered_ties_keep_arrival() {
        let mut queue = Vec::new();
        let first = op(Priority::Medium, 7);
        let second = op(Priority::Medium, 7);
        let (first_id, second_id) = (first.id.clone(), second.id.clone());

        insert_ordered(&mut queue, first);
        insert_ordered(&mut queue, second);
        assert_eq!(queue[0].id, first_id);
        assert_eq!(queue[1].id, second_id);
    }

    #[test]
    fn test_retry_delay_grows() {
        let policy = SyncPolicy::default();
        assert_eq!(retry_delay_ms(&policy, 0), 1000);
        assert_eq!(retry_delay_ms(&policy, 1), 2000);
        assert_eq!(retry_delay_ms(&policy, 2), 4000);
    }

    #[test]
    fn test_retry_delay_saturates() {
        let policy = SyncPolicy {
            backoff_multiplier: 10.0,
            ..SyncPolicy::default()
        };
        assert_eq!(retry_delay_ms(&policy, 400), u64::MAX);
    }

    #[test]
    fn test_record_failure_schedules_then_fails() {
        let policy = SyncPolicy::default();
        let mut operation = op(Priority::High, 0);
        operation.max_retries = 2;

        record_failure(&mut operation, "boom".to_string(), &policy, 10_000);
        assert_eq!(operation.retry_count, 1);
        assert_eq!(operation.status, OperationStatus::Pending);
        assert_eq!(operation.next_attempt_at, 12_000);
        assert_eq!(operation.last_error.as_deref(), Some("boom"));

        record_failure(&mut operation, "boom again".to_string(), &policy, 20_000);
        assert_eq!(operation.retry_count, 2);
        assert_eq!(operation.status, OperationStatus::Failed);
        assert!(operation.is_failed());
    }
}
