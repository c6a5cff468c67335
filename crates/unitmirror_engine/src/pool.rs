//! Bounded worker pool.

use parking_lot::Mutex;
use std::thread;

/// Runs `f` over `items` on at most `workers` scoped threads.
///
/// Results are returned in input order. With one worker, or one item, `f`
/// runs on the calling thread.
pub fn run_bounded<T, R, F>(items: Vec<T>, workers: usize, f: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    let workers = workers.max(1).min(items.len());
    if workers <= 1 {
        return items.into_iter().map(f).collect();
    }

    let len = items.len();
    let queue = Mutex::new(items.into_iter().enumerate());
    let results: Mutex<Vec<Option<R>>> = Mutex::new((0..len).map(|_| None).collect());

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let next = queue.lock().next();
                let Some((index, item)) = next else {
                    break;
                };
                let result = f(item);
                results.lock()[index] = Some(result);
            });
        }
    });

    results.into_inner().into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn preserves_order() {
        let items: Vec<u32> = (0..50).collect();
        let results = run_bounded(items, 8, |n| {
            thread::sleep(Duration::from_micros(u64::from(50 - n)));
            n * 2
        });
        assert_eq!(results, (0..50).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn respects_worker_bound() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        run_bounded((0..32).collect(), 3, |_: u32| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
            active.fetch_sub(1, Ordering::SeqCst);
        });

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn empty_and_single_worker() {
        let empty: Vec<u8> = run_bounded(Vec::<u8>::new(), 4, |n| n);
        assert!(empty.is_empty());

        let serial = run_bounded(vec![1, 2, 3], 1, |n| n + 1);
        assert_eq!(serial, vec![2, 3, 4]);

        let zero_workers = run_bounded(vec![1, 2], 0, |n| n);
        assert_eq!(zero_workers, vec![1, 2]);
    }
}
