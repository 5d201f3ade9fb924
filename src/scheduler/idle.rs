//! Idle-time signalling and the background batch queue.
//!
//! Background loading must never starve foreground work. Between batches the
//! idle worker waits on an [`IdleSignal`]; hosts without a real idle callback
//! use [`TimerIdle`], a short fixed delay.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::domain::Priority;

/// Host primitive that completes when the host is otherwise idle.
#[async_trait]
pub trait IdleSignal: Send + Sync {
    async fn idle(&self);
}

/// Fixed-delay fallback for hosts without an idle callback.
#[derive(Debug, Clone, Copy)]
pub struct TimerIdle {
    delay: Duration,
}

impl TimerIdle {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl IdleSignal for TimerIdle {
    async fn idle(&self) {
        tokio::time::sleep(self.delay).await;
    }
}

/// Idle signal released explicitly, one idle period per permit.
///
/// Useful for hosts that pump idle time themselves, and for tests.
#[derive(Debug)]
pub struct ManualIdle {
    permits: Semaphore,
}

impl ManualIdle {
    pub fn new() -> Self {
        Self {
            permits: Semaphore::new(0),
        }
    }

    /// Let `count` idle periods through.
    pub fn release(&self, count: usize) {
        self.permits.add_permits(count);
    }
}

impl Default for ManualIdle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdleSignal for ManualIdle {
    async fn idle(&self) {
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }
}

/// One background unit of work: a root resource and its load order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdleBatch {
    pub root: String,
    pub priority: Priority,
    /// Dependency closure of `root`, dependencies first
    pub order: Vec<String>,
}

/// FIFO of background batches, at most one per root.
#[derive(Debug, Default)]
pub struct IdleQueue {
    batches: VecDeque<IdleBatch>,
    roots: HashSet<String>,
}

impl IdleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch. Returns false if its root is already queued.
    pub fn push(&mut self, batch: IdleBatch) -> bool {
        if !self.roots.insert(batch.root.clone()) {
            return false;
        }
        self.batches.push_back(batch);
        true
    }

    /// Put a batch back at the front. Returns false if its root is already queued.
    pub fn requeue(&mut self, batch: IdleBatch) -> bool {
        if !self.roots.insert(batch.root.clone()) {
            return false;
        }
        self.batches.push_front(batch);
        true
    }

    pub fn pop(&mut self) -> Option<IdleBatch> {
        let batch = self.batches.pop_front()?;
        self.roots.remove(&batch.root);
        Some(batch)
    }

    /// Drop every batch for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(&IdleBatch) -> bool) {
        let roots = &mut self.roots;
        self.batches.retain(|batch| {
            let kept = keep(batch);
            if !kept {
                roots.remove(&batch.root);
            }
            kept
        });
    }

    pub fn contains(&self, root: &str) -> bool {
        self.roots.contains(root)
    }

    /// Queued roots in processing order.
    pub fn roots(&self) -> Vec<String> {
        self.batches.iter().map(|b| b.root.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn batch(root: &str, priority: Priority) -> IdleBatch {
        IdleBatch {
            root: root.to_string(),
            priority,
            order: vec![root.to_string()],
        }
    }

    #[test]
    fn test_queue_fifo_and_dedup() {
        let mut queue = IdleQueue::new();
        assert!(queue.push(batch("charts", Priority::Medium)));
        assert!(queue.push(batch("toast", Priority::Low)));
        assert!(!queue.push(batch("charts", Priority::Medium)));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.roots(), vec!["charts".to_string(), "toast".to_string()]);
        assert_eq!(queue.pop().unwrap().root, "charts");
        assert!(!queue.contains("charts"));

        // Root can be queued again once popped
        assert!(queue.push(batch("charts", Priority::Medium)));
    }

    #[test]
    fn test_queue_retain_updates_roots() {
        let mut queue = IdleQueue::new();
        queue.push(batch("a", Priority::Medium));
        queue.push(batch("b", Priority::Low));
        queue.retain(|b| b.root != "a");

        assert_eq!(queue.roots(), vec!["b".to_string()]);
        assert!(!queue.contains("a"));
        assert!(queue.push(batch("a", Priority::Medium)));
    }

    #[test]
    fn test_requeue_goes_to_front() {
        let mut queue = IdleQueue::new();
        queue.push(batch("a", Priority::Medium));
        queue.push(batch("b", Priority::Low));
        let first = queue.pop().unwrap();

        assert!(queue.requeue(first));
        assert_eq!(queue.roots(), vec!["a".to_string(), "b".to_string()]);
        assert!(!queue.requeue(batch("b", Priority::Low)));
    }

    #[tokio::test]
    async fn test_manual_idle_waits_for_release() {
        let idle = Arc::new(ManualIdle::new());
        let waiter = {
            let idle = idle.clone();
            tokio::spawn(async move { idle.idle().await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        idle.release(1);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_timer_idle_completes() {
        TimerIdle::new(Duration::from_millis(1)).idle().await;
    }
}
