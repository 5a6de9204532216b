//! Fan-out/fan-in over a `JoinSet` with index-ordered results.
//!
//! Tasks complete in any order; [`FanOut::join`] places each result by the
//! index it was spawned with, so the output order is the spawn order. The
//! first failure aborts every remaining task.

use std::future::Future;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::SummarizeError;

pub struct FanOut<T> {
    label: &'static str,
    set: JoinSet<(usize, Result<T, SummarizeError>)>,
    spawned: usize,
}

impl<T: Send + 'static> FanOut<T> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            set: JoinSet::new(),
            spawned: 0,
        }
    }

    /// Spawn a task. Its result lands at position `self.len()` (before the
    /// call) of the joined output.
    pub fn spawn<F>(&mut self, fut: F)
    where
        F: Future<Output = Result<T, SummarizeError>> + Send + 'static,
    {
        let idx = self.spawned;
        self.spawned += 1;
        self.set.spawn(async move { (idx, fut.await) });
    }

    pub fn len(&self) -> usize {
        self.spawned
    }

    pub fn is_empty(&self) -> bool {
        self.spawned == 0
    }

    /// Wait for every task. Returns results in spawn order, or the first
    /// error after aborting the rest.
    pub async fn join(mut self) -> Result<Vec<T>, SummarizeError> {
        let mut slots: Vec<Option<T>> = (0..self.spawned).map(|_| None).collect();

        while let Some(joined) = self.set.join_next().await {
            match joined {
                Ok((idx, Ok(value))) => {
                    slots[idx] = Some(value);
                }
                Ok((idx, Err(e))) => {
                    warn!("{} task {idx} failed: {e}; aborting {} others", self.label, self.set.len());
                    self.set.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    self.set.abort_all();
                    return Err(SummarizeError::Internal(format!(
                        "{} task panicked or was cancelled: {e}",
                        self.label
                    )));
                }
            }
        }

        debug!("{}: joined {} tasks", self.label, slots.len());
        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| {
                    SummarizeError::Internal(format!("{} task {i} produced no result", self.label))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn results_follow_spawn_order_not_completion_order() {
        let mut fan = FanOut::new("test");
        for i in 0..5u64 {
            fan.spawn(async move {
                tokio::time::sleep(Duration::from_millis(50 - i * 10)).await;
                Ok(i)
            });
        }
        assert_eq!(fan.len(), 5);
        assert_eq!(fan.join().await.unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn empty_fan_out_joins_to_nothing() {
        let fan: FanOut<u32> = FanOut::new("empty");
        assert!(fan.is_empty());
        assert!(fan.join().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn first_error_aborts_the_rest() {
        let finished = Arc::new(AtomicBool::new(false));
        let mut fan = FanOut::new("test");
        let flag = finished.clone();
        fan.spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(1)
        });
        fan.spawn(async { Err(SummarizeError::EmptyInput) });

        let err = fan.join().await.unwrap_err();
        assert!(matches!(err, SummarizeError::EmptyInput));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panics_become_internal_errors() {
        let mut fan: FanOut<u32> = FanOut::new("test");
        fan.spawn(async {
            if true {
                panic!("boom");
            }
            Ok(0)
        });
        let err = fan.join().await.unwrap_err();
        assert!(matches!(err, SummarizeError::Internal(_)));
    }
}
