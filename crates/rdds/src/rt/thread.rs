// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Library-internal thread management.
//!
//! Threads spawned here carry a name, optional scheduling class/priority
//! hints and an optional stack size, and run a per-thread cleanup stack:
//! handlers pushed with [`cleanup_push`] execute in reverse registration
//! order when the thread routine returns (or earlier via [`cleanup_pop`]
//! with `execute = true`). Internal service threads (listener dispatch,
//! deadline monitoring) rely on this to tear down registrations even when
//! the routine exits through an error path.

use std::cell::RefCell;
use std::thread::JoinHandle;

use crate::retcode::{ReturnCode, Result};

/// Scheduling class hint for a spawned thread.
///
/// A plain hint: the host scheduler may ignore it. Carried through the
/// per-thread configuration surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedClass {
    /// Default time-sharing scheduling.
    #[default]
    TimeShare,
    /// Real-time scheduling request.
    RealTime,
}

/// Thread creation attributes.
#[derive(Debug, Clone, Default)]
pub struct ThreadAttributes {
    /// Scheduling class hint.
    pub class: SchedClass,
    /// Priority hint within the class; `None` leaves the host default.
    pub priority: Option<i32>,
    /// Stack size in bytes; `None` leaves the host default.
    pub stack_size: Option<usize>,
}

type CleanupFn = Box<dyn FnOnce() + Send>;

thread_local! {
    static CLEANUP_STACK: RefCell<Vec<CleanupFn>> = const { RefCell::new(Vec::new()) };
}

/// Push a cleanup handler onto the calling thread's cleanup stack.
pub fn cleanup_push(routine: impl FnOnce() + Send + 'static) {
    CLEANUP_STACK.with(|stack| stack.borrow_mut().push(Box::new(routine)));
}

/// Pop the most recently pushed handler; runs it when `execute` is true.
///
/// Returns `PreconditionNotMet` when the stack is empty.
pub fn cleanup_pop(execute: bool) -> Result<()> {
    let routine = CLEANUP_STACK
        .with(|stack| stack.borrow_mut().pop())
        .ok_or(ReturnCode::PreconditionNotMet)?;
    if execute {
        routine();
    }
    Ok(())
}

/// Run all pending handlers in reverse registration order.
fn run_cleanup_stack() {
    loop {
        let routine = CLEANUP_STACK.with(|stack| stack.borrow_mut().pop());
        match routine {
            Some(r) => r(),
            None => break,
        }
    }
}

/// Spawn a named thread that drains its cleanup stack on exit.
pub fn spawn_named<F>(name: &str, attrs: &ThreadAttributes, routine: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let mut builder = std::thread::Builder::new().name(name.to_string());
    if let Some(stack_size) = attrs.stack_size {
        builder = builder.stack_size(stack_size);
    }
    if attrs.class == SchedClass::RealTime {
        // Host priority elevation needs platform privileges; record the intent.
        log::debug!("[rt] thread '{}' requested real-time class", name);
    }
    builder
        .spawn(move || {
            routine();
            run_cleanup_stack();
        })
        .map_err(|e| {
            log::error!("[rt] thread spawn failed: {}", e);
            ReturnCode::OutOfResources
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_cleanup_pop_empty_stack() {
        let handle = spawn_named("t_pop_empty", &ThreadAttributes::default(), || {
            assert_eq!(cleanup_pop(true), Err(ReturnCode::PreconditionNotMet));
        })
        .expect("spawn should succeed");
        handle.join().expect("thread should not panic");
    }

    #[test]
    fn test_cleanup_runs_in_reverse_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let order2 = Arc::clone(&order);

        let handle = spawn_named("t_cleanup_order", &ThreadAttributes::default(), move || {
            for i in 0..3 {
                let order = Arc::clone(&order2);
                cleanup_push(move || order.lock().push(i));
            }
        })
        .expect("spawn should succeed");
        handle.join().expect("thread should not panic");

        assert_eq!(*order.lock(), vec![2, 1, 0]);
    }

    #[test]
    fn test_cleanup_pop_executes() {
        let count = Arc::new(AtomicU32::new(0));
        let count2 = Arc::clone(&count);

        let handle = spawn_named("t_cleanup_pop", &ThreadAttributes::default(), move || {
            let c1 = Arc::clone(&count2);
            let c2 = Arc::clone(&count2);
            cleanup_push(move || {
                c1.fetch_add(1, Ordering::SeqCst);
            });
            cleanup_push(move || {
                c2.fetch_add(10, Ordering::SeqCst);
            });
            // Popped without executing: only the first handler remains.
            cleanup_pop(false).expect("stack should not be empty");
        })
        .expect("spawn should succeed");
        handle.join().expect("thread should not panic");

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_spawn_named_sets_name() {
        let handle = spawn_named("t_named", &ThreadAttributes::default(), || {
            assert_eq!(std::thread::current().name(), Some("t_named"));
        })
        .expect("spawn should succeed");
        handle.join().expect("thread should not panic");
    }

    #[test]
    fn test_spawn_with_stack_size() {
        let attrs = ThreadAttributes {
            stack_size: Some(256 * 1024),
            ..Default::default()
        };
        let handle = spawn_named("t_stack", &attrs, || {}).expect("spawn should succeed");
        handle.join().expect("thread should not panic");
    }
}
