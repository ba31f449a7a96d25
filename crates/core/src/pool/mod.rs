//! Worker pool.
//!
//! A [`WorkerPool`] owns a fixed array of engine slots. Tasks submitted with
//! [`WorkerPool::submit`] return a [`TaskHandle`] future; a task's failure
//! only resolves its own handle.

mod executor;
mod types;

pub use executor::{PoolDrain, WorkerPool};
pub use types::{PoolError, PoolSlot, PoolStatus, TaskHandle};
pub(crate) use types::panic_message;
