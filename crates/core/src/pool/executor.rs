//! Bounded worker pool over isolated engine instances.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::types::{panic_message, PoolError, PoolSlot, PoolStatus, TaskHandle};
use crate::engine::CodecEngine;

/// Hands a settled result to its [`TaskHandle`].
type Deliver = Box<dyn FnOnce() + Send>;

type Job = Box<dyn FnOnce(PoolSlot) -> BoxFuture<'static, Deliver> + Send>;

/// A fixed set of engine slots executing tasks one at a time each.
///
/// Submissions beyond the slot count wait in a FIFO queue. Idle slots are
/// picked round-robin; a slot that settles takes the next queued task
/// immediately. Dropping the pool terminates it.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    slots: Vec<PoolSlot>,
    state: Mutex<PoolState>,
    dispatched: AtomicU64,
    completed: AtomicU64,
}

struct PoolState {
    busy: Vec<bool>,
    running: Vec<Option<JoinHandle<()>>>,
    aborted: Vec<JoinHandle<()>>,
    queue: VecDeque<Job>,
    cursor: usize,
    active: usize,
    peak_active: usize,
    terminated: bool,
}

impl PoolState {
    fn next_idle_slot(&mut self) -> Option<usize> {
        let count = self.busy.len();
        let slot = (0..count)
            .map(|offset| (self.cursor + offset) % count)
            .find(|&slot| !self.busy[slot])?;
        self.cursor = (slot + 1) % count;
        Some(slot)
    }
}

impl WorkerPool {
    /// Creates a pool with one slot per engine.
    pub fn new(engines: Vec<Arc<dyn CodecEngine>>) -> Result<Self, PoolError> {
        if engines.is_empty() {
            return Err(PoolError::NoSlots);
        }

        let count = engines.len();
        let slots = engines
            .into_iter()
            .enumerate()
            .map(|(id, engine)| PoolSlot { id, engine })
            .collect();

        Ok(Self {
            inner: Arc::new(PoolInner {
                slots,
                state: Mutex::new(PoolState {
                    busy: vec![false; count],
                    running: (0..count).map(|_| None).collect(),
                    aborted: Vec::new(),
                    queue: VecDeque::new(),
                    cursor: 0,
                    active: 0,
                    peak_active: 0,
                    terminated: false,
                }),
                dispatched: AtomicU64::new(0),
                completed: AtomicU64::new(0),
            }),
        })
    }

    /// Number of slots.
    pub fn size(&self) -> usize {
        self.inner.slots.len()
    }

    /// Submits a task; it runs on the first slot that becomes free.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit<F, Fut, T>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce(PoolSlot) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |slot| {
            async move {
                let result = AssertUnwindSafe(task(slot))
                    .catch_unwind()
                    .await
                    .map_err(|payload| PoolError::TaskPanicked(panic_message(payload)));
                Box::new(move || {
                    let _ = tx.send(result);
                }) as Deliver
            }
            .boxed()
        });

        let mut state = self.inner.state.lock();
        if state.terminated {
            // Dropping the job drops the sender; the handle reports Terminated.
            return TaskHandle { rx };
        }

        match state.next_idle_slot() {
            Some(slot) => PoolInner::dispatch(&self.inner, &mut state, slot, job),
            None => {
                state.queue.push_back(job);
                debug!("All slots busy, {} task(s) queued", state.queue.len());
            }
        }

        TaskHandle { rx }
    }

    /// Tears down every slot immediately.
    ///
    /// In-flight tasks are aborted (dropping their engine invocations),
    /// queued tasks are discarded, and every pending handle resolves to
    /// [`PoolError::Terminated`]. Later submissions resolve the same way.
    ///
    /// Aborting is asynchronous; use [`drain`](Self::drain) to wait until
    /// the aborted tasks are gone.
    pub fn terminate_all(&self) {
        let mut state = self.inner.state.lock();
        if state.terminated {
            return;
        }
        state.terminated = true;

        let in_flight: Vec<_> = state.running.iter_mut().filter_map(Option::take).collect();
        for handle in &in_flight {
            handle.abort();
        }
        let aborted = in_flight.len();
        state.aborted.extend(in_flight);
        let discarded = state.queue.len();
        state.queue.clear();
        state.busy.iter_mut().for_each(|busy| *busy = false);
        state.active = 0;

        if aborted + discarded > 0 {
            info!(
                "Worker pool terminated ({} in-flight aborted, {} queued discarded)",
                aborted, discarded
            );
        } else {
            debug!("Worker pool shut down");
        }
    }

    /// Handle that outlives the pool and waits for its aborted tasks.
    pub fn drain(&self) -> PoolDrain {
        PoolDrain {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Whether [`terminate_all`](Self::terminate_all) has run.
    pub fn is_terminated(&self) -> bool {
        self.inner.state.lock().terminated
    }

    /// Current activity snapshot.
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            slots: self.inner.slots.len(),
            active: state.active,
            queued: state.queue.len(),
            dispatched: self.inner.dispatched.load(Ordering::Relaxed),
            completed: self.inner.completed.load(Ordering::Relaxed),
            peak_active: state.peak_active,
            terminated: state.terminated,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.terminate_all();
    }
}

/// Waits for the tasks aborted by [`WorkerPool::terminate_all`] to unwind.
#[derive(Clone)]
pub struct PoolDrain {
    inner: Arc<PoolInner>,
}

impl PoolDrain {
    /// Resolves once every aborted task has been dropped.
    ///
    /// Tasks still running on a live pool are not waited for.
    pub async fn wait(&self) {
        let aborted = std::mem::take(&mut self.inner.state.lock().aborted);
        if aborted.is_empty() {
            return;
        }

        let count = aborted.len();
        for handle in aborted {
            // Cancelled is the expected outcome.
            let _ = handle.await;
        }
        debug!("Drained {} aborted task(s)", count);
    }
}

impl PoolInner {
    fn dispatch(inner: &Arc<PoolInner>, state: &mut PoolState, slot: usize, job: Job) {
        state.busy[slot] = true;
        state.active += 1;
        state.peak_active = state.peak_active.max(state.active);
        inner.dispatched.fetch_add(1, Ordering::Relaxed);

        let slot_handle = inner.slots[slot].clone();
        let pool = Arc::clone(inner);
        // The completion hook needs the state lock, which we hold until the
        // join handle is stored. The slot is freed before the result is
        // delivered.
        let handle = tokio::spawn(async move {
            let deliver = job(slot_handle).await;
            PoolInner::on_complete(&pool, slot);
            deliver();
        });
        state.running[slot] = Some(handle);
        debug!("Dispatched task to slot {}", slot);
    }

    fn on_complete(inner: &Arc<PoolInner>, slot: usize) {
        let mut state = inner.state.lock();
        inner.completed.fetch_add(1, Ordering::Relaxed);
        if state.terminated {
            return;
        }

        state.running[slot] = None;
        state.busy[slot] = false;
        state.active -= 1;

        if let Some(job) = state.queue.pop_front() {
            PoolInner::dispatch(inner, &mut state, slot, job);
        }
    }
}
