//! Types for the worker pool.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::engine::CodecEngine;

/// One engine instance owned by the pool.
#[derive(Clone)]
pub struct PoolSlot {
    /// Slot index, `0..W`.
    pub id: usize,
    /// The slot's private engine.
    pub engine: Arc<dyn CodecEngine>,
}

impl std::fmt::Debug for PoolSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolSlot")
            .field("id", &self.id)
            .field("namespace", &self.engine.namespace())
            .finish()
    }
}

/// Errors surfaced through a [`TaskHandle`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The pool was created without slots.
    #[error("Worker pool needs at least one slot")]
    NoSlots,

    /// The pool was torn down before the task settled.
    #[error("Worker pool was terminated")]
    Terminated,

    /// The task panicked; the slot stays usable.
    #[error("Task panicked: {0}")]
    TaskPanicked(String),
}

/// Snapshot of pool activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Number of slots.
    pub slots: usize,
    /// Tasks currently executing.
    pub active: usize,
    /// Tasks waiting for a slot.
    pub queued: usize,
    /// Tasks handed to a slot so far.
    pub dispatched: u64,
    /// Tasks that settled on their slot.
    pub completed: u64,
    /// Highest number of tasks executing at once.
    pub peak_active: usize,
    /// Whether the pool has been torn down.
    pub terminated: bool,
}

/// Future resolving to a submitted task's output.
#[derive(Debug)]
pub struct TaskHandle<T> {
    pub(crate) rx: oneshot::Receiver<Result<T, PoolError>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, PoolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(PoolError::Terminated)))
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
