//! Bounded-concurrency mapping.
//!
//! [`map_bounded`] runs an async transform over a slice with at most `limit`
//! invocations in flight. Workers claim indices from a shared atomic counter,
//! and outputs are placed into a pre-sized slot list, so output order always
//! matches input order.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::try_join_all;

/// Map `f` over `items` with at most `limit` concurrent invocations.
///
/// `limit` is clamped to at least 1. The first error aborts the whole mapping:
/// in-flight siblings are dropped and no partial results are returned.
pub async fn map_bounded<'a, T, R, E, F, Fut>(
    items: &'a [T],
    limit: usize,
    f: F,
) -> Result<Vec<R>, E>
where
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let total = items.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let workers = limit.max(1).min(total);
    let next = AtomicUsize::new(0);
    let next = &next;
    let f = &f;

    let batches = try_join_all((0..workers).map(|_| async move {
        let mut produced = Vec::new();
        loop {
            let index = next.fetch_add(1, Ordering::SeqCst);
            if index >= total {
                break;
            }
            let value = f(&items[index]).await?;
            produced.push((index, value));
        }
        Ok::<_, E>(produced)
    }))
    .await?;

    let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(total).collect();
    for (index, value) in batches.into_iter().flatten() {
        slots[index] = Some(value);
    }

    // Every index below `total` is claimed exactly once, so every slot is filled.
    Ok(slots.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::{sleep, Duration};

    #[derive(Default)]
    struct InFlight {
        current: AtomicUsize,
        max: AtomicUsize,
    }

    impl InFlight {
        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_empty_input_yields_empty_output() {
        let items: Vec<u32> = Vec::new();
        let out = map_bounded(&items, 4, |x| async move { Ok::<_, ()>(*x) })
            .await
            .expect("map");
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_output_order_matches_input_despite_completion_order() {
        let items: Vec<u64> = (0..8).collect();
        let out = map_bounded(&items, 3, |x| async move {
            // Later items finish first.
            sleep(Duration::from_millis(40 - *x * 5)).await;
            Ok::<_, ()>(x * 10)
        })
        .await
        .expect("map");
        assert_eq!(out, vec![0, 10, 20, 30, 40, 50, 60, 70]);
    }

    #[tokio::test]
    async fn test_never_exceeds_limit() {
        for limit in [1usize, 2, 4] {
            let probe = Arc::new(InFlight::default());
            let items: Vec<usize> = (0..12).collect();
            let out = map_bounded(&items, limit, |x| {
                let probe = Arc::clone(&probe);
                async move {
                    probe.enter();
                    sleep(Duration::from_millis(10)).await;
                    probe.exit();
                    Ok::<_, ()>(*x)
                }
            })
            .await
            .expect("map");

            assert_eq!(out.len(), 12);
            let max = probe.max.load(Ordering::SeqCst);
            assert!(max <= limit, "limit {limit} exceeded: {max}");
            assert_eq!(max, limit, "expected the pool to saturate all {limit} workers");
        }
    }

    #[tokio::test]
    async fn test_zero_limit_is_clamped_to_one() {
        let probe = Arc::new(InFlight::default());
        let items = vec![1, 2, 3];
        let out = map_bounded(&items, 0, |x| {
            let probe = Arc::clone(&probe);
            async move {
                probe.enter();
                sleep(Duration::from_millis(5)).await;
                probe.exit();
                Ok::<_, ()>(*x + 1)
            }
        })
        .await
        .expect("map");
        assert_eq!(out, vec![2, 3, 4]);
        assert_eq!(probe.max.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_aborts_mapping() {
        let items: Vec<u32> = (0..6).collect();
        let result = map_bounded(&items, 2, |x| async move {
            if *x == 3 {
                Err(format!("item {x} failed"))
            } else {
                Ok(*x)
            }
        })
        .await;
        assert_eq!(result, Err("item 3 failed".to_string()));
    }

    #[tokio::test]
    async fn test_each_item_processed_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let items: Vec<usize> = (0..50).collect();
        let out = map_bounded(&items, 7, |x| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok::<_, ()>(*x)
            }
        })
        .await
        .expect("map");
        assert_eq!(calls.load(Ordering::SeqCst), 50);
        assert_eq!(out, items);
    }
}
