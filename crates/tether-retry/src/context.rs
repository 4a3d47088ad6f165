//! Call context: deadline and cancellation for one logical remote call
//!
//! A `CallContext` is cheap to clone. Deriving a context (`with_timeout`,
//! `with_deadline`, `with_cancel`) produces a child that is done whenever the
//! parent is done, and additionally when its own deadline passes or its own
//! handle is cancelled. The earlier of the parent's and child's deadlines wins.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a context finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    Cancelled,
    DeadlineExceeded,
}

impl std::fmt::Display for DoneReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DoneReason::Cancelled => write!(f, "cancelled"),
            DoneReason::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Node of the cancellation tree. Cancelling a node cancels all of its
/// live descendants.
#[derive(Debug)]
struct CancelNode {
    flag: watch::Sender<bool>,
    children: Mutex<Vec<Weak<CancelNode>>>,
}

impl CancelNode {
    fn new() -> Arc<Self> {
        let (flag, _) = watch::channel(false);
        Arc::new(Self {
            flag,
            children: Mutex::new(Vec::new()),
        })
    }

    fn child(&self) -> Arc<Self> {
        let child = CancelNode::new();
        let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
        // checked under the lock so a concurrent cancel() cannot miss the child
        if self.is_cancelled() {
            drop(children);
            child.cancel();
        } else {
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }
        child
    }

    fn cancel(&self) {
        self.flag.send_replace(true);
        let children = {
            let mut guard = self.children.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    async fn cancelled(&self) {
        let mut rx = self.flag.subscribe();
        // the sender lives in `self`, so wait_for can only end by observing `true`
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Deadline and cancellation scope passed to every remote operation
#[derive(Debug, Clone)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: Arc<CancelNode>,
}

impl CallContext {
    /// Root context: no deadline, never cancelled unless derived from
    pub fn background() -> Self {
        Self {
            deadline: None,
            cancel: CancelNode::new(),
        }
    }

    /// Derive a context that expires after `timeout`.
    ///
    /// A timeout too large to be represented as an instant adds no deadline
    /// of its own; the parent's deadline, if any, still applies.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => Self {
                deadline: self.deadline,
                cancel: self.cancel.child(),
            },
        }
    }

    /// Derive a context that expires at `deadline` (or earlier, if the parent does)
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        Self {
            deadline: Some(deadline),
            cancel: self.cancel.child(),
        }
    }

    /// Derive a context together with the handle that cancels it
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let node = self.cancel.child();
        let ctx = Self {
            deadline: self.deadline,
            cancel: node.clone(),
        };
        (ctx, CancelHandle { node })
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline; `None` when there is no deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Reason the context is finished, if it is
    pub fn done_reason(&self) -> Option<DoneReason> {
        if self.cancel.is_cancelled() {
            return Some(DoneReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(DoneReason::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done_reason().is_some()
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) -> DoneReason {
        if let Some(reason) = self.done_reason() {
            return reason;
        }

        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => DoneReason::Cancelled,
            _ = expired => DoneReason::DeadlineExceeded,
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::background()
    }
}

/// Cancels the context returned alongside it by [`CallContext::with_cancel`]
#[derive(Debug, Clone)]
pub struct CancelHandle {
    node: Arc<CancelNode>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.node.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.node.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_is_never_done() {
        let ctx = CallContext::background();
        assert!(!ctx.is_done());
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_nests_inside_parent() {
        let root = CallContext::background();
        let parent = root.with_timeout(Duration::from_secs(5));
        let child = parent.with_timeout(Duration::from_secs(60));

        assert_eq!(child.deadline(), parent.deadline());

        let reason = child.done().await;
        assert_eq!(reason, DoneReason::DeadlineExceeded);
        assert!(parent.is_done());
    }

    #[tokio::test]
    async fn test_parent_cancel_propagates() {
        let (parent, handle) = CallContext::background().with_cancel();
        let child = parent.with_timeout(Duration::from_secs(60));
        let grandchild = child.with_cancel().0;

        handle.cancel();

        assert!(handle.is_cancelled());
        assert_eq!(child.done_reason(), Some(DoneReason::Cancelled));
        assert_eq!(grandchild.done().await, DoneReason::Cancelled);
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_touch_parent() {
        let parent = CallContext::background();
        let (child, handle) = parent.with_cancel();

        handle.cancel();

        assert!(child.is_done());
        assert!(!parent.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_keeps_parent_deadline() {
        let unbounded = CallContext::background().with_timeout(Duration::MAX);
        assert!(unbounded.deadline().is_none());
        assert!(!unbounded.is_done());

        let parent = CallContext::background().with_timeout(Duration::from_secs(5));
        let child = parent.with_timeout(Duration::MAX);
        assert_eq!(child.deadline(), parent.deadline());
        assert_eq!(child.done().await, DoneReason::DeadlineExceeded);
    }

    #[test]
    fn test_derive_from_cancelled_parent() {
        let (parent, handle) = CallContext::background().with_cancel();
        handle.cancel();

        let child = parent.with_timeout(Duration::from_secs(1));
        assert_eq!(child.done_reason(), Some(DoneReason::Cancelled));
    }
}
