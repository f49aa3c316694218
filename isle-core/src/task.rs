//! Host scheduling primitives.
//!
//! The runtime interleaves with its host through three mechanisms:
//!
//! - **Microtasks**: run after the current synchronous work. Pending getters
//!   are consolidated here.
//! - **Frames**: run after the next paint. Watch callbacks flush here so
//!   several rapid changes cost one run.
//! - **Cooperative yields**: `split_task` hands control back to the tokio
//!   scheduler between islands during hydration.
//!
//! Microtask and frame queues are thread-local and are drained by the host
//! (or by tests) through [`run_microtasks`] and [`run_frame`].

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;

use tokio::runtime::{Handle, RuntimeFlavor};

type Task = Box<dyn FnOnce()>;

#[derive(Default)]
struct HostQueue {
    microtasks: VecDeque<Task>,
    frame: Vec<Task>,
}

thread_local! {
    static QUEUE: RefCell<HostQueue> = RefCell::new(HostQueue::default());
}

/// Queue `f` to run once the current synchronous work is done.
pub fn queue_microtask(f: impl FnOnce() + 'static) {
    QUEUE.with(|queue| queue.borrow_mut().microtasks.push_back(Box::new(f)));
}

/// Drain the microtask queue, including microtasks queued while draining.
///
/// Returns the number of tasks run.
pub fn run_microtasks() -> usize {
    let mut ran = 0;
    loop {
        let next = QUEUE.with(|queue| queue.borrow_mut().microtasks.pop_front());
        match next {
            Some(task) => {
                task();
                ran += 1;
            }
            None => return ran,
        }
    }
}

/// Queue `f` to run after the next frame is painted.
pub fn after_next_frame(f: impl FnOnce() + 'static) {
    QUEUE.with(|queue| queue.borrow_mut().frame.push(Box::new(f)));
}

/// Paint a frame: run the callbacks queued before it started, then drain
/// microtasks. Callbacks queued during the frame wait for the next one.
///
/// Returns the number of tasks run.
pub fn run_frame() -> usize {
    let callbacks = QUEUE.with(|queue| std::mem::take(&mut queue.borrow_mut().frame));
    let mut ran = callbacks.len();
    for callback in callbacks {
        callback();
    }
    ran += run_microtasks();
    ran
}

pub fn pending_frame_callbacks() -> usize {
    QUEUE.with(|queue| queue.borrow().frame.len())
}

/// Yield to the host scheduler so input and rendering can interleave.
pub async fn split_task() {
    tokio::task::yield_now().await;
}

/// The ambient tokio runtime, if it drives this thread only.
///
/// Reactive state is thread-local, so work that writes to it must not land
/// on a worker of a multi-thread runtime.
fn local_handle() -> Option<Handle> {
    let handle = Handle::try_current().ok()?;
    (handle.runtime_flavor() == RuntimeFlavor::CurrentThread).then_some(handle)
}

/// Run `future` on the ambient current-thread tokio runtime.
///
/// Returns `false` when there is no such runtime; the future is dropped.
pub fn spawn<F>(future: F) -> bool
where
    F: Future<Output = ()> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::CurrentThread => {
            handle.spawn(future);
            true
        }
        Ok(handle) => {
            tracing::error!(
                flavor = ?handle.runtime_flavor(),
                "async action started on a multi-thread tokio runtime; use a current-thread runtime. Dropped"
            );
            false
        }
        Err(_) => {
            tracing::error!("async action started outside a tokio runtime; dropped");
            false
        }
    }
}

/// Run `f` in a later task: after a yield on the ambient current-thread
/// runtime when there is one, otherwise as a microtask.
pub fn defer(f: impl FnOnce() + Send + 'static) {
    if local_handle().is_some() {
        spawn(async move {
            split_task().await;
            f();
        });
    } else {
        queue_microtask(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn microtasks_run_in_order_and_drain_nested() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (a, b) = (log.clone(), log.clone());
        queue_microtask(move || {
            a.borrow_mut().push(1);
            let c = a.clone();
            queue_microtask(move || c.borrow_mut().push(3));
        });
        queue_microtask(move || b.borrow_mut().push(2));

        assert_eq!(run_microtasks(), 3);
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn frame_callbacks_queued_during_frame_wait() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = log.clone();
        after_next_frame(move || {
            a.borrow_mut().push("first");
            let b = a.clone();
            after_next_frame(move || b.borrow_mut().push("second"));
        });

        assert_eq!(run_frame(), 1);
        assert_eq!(*log.borrow(), vec!["first"]);
        assert_eq!(pending_frame_callbacks(), 1);

        run_frame();
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn deferred_work_waits_for_the_microtask_queue() {
        let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = ran.clone();
        defer(move || flag.store(true, std::sync::atomic::Ordering::SeqCst));
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
        run_microtasks();
        assert!(ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn spawn_without_runtime_is_rejected() {
        assert!(!spawn(async {}));
    }

    #[tokio::test]
    async fn spawn_runs_on_current_runtime() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        assert!(spawn(async move {
            let _ = tx.send(7);
        }));
        assert_eq!(rx.await.unwrap(), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn spawn_on_multi_thread_runtime_is_rejected() {
        let (tx, mut rx) = tokio::sync::oneshot::channel::<()>();
        assert!(!spawn(async move {
            let _ = tx.send(());
        }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn defer_on_multi_thread_runtime_uses_microtasks() {
        let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = ran.clone();
        defer(move || flag.store(true, std::sync::atomic::Ordering::SeqCst));
        assert_eq!(run_microtasks(), 1);
        assert!(ran.load(std::sync::atomic::Ordering::SeqCst));
    }
}
