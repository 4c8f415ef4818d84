//! The interface between the semaphore core and the task scheduler.
use crate::{Priority, TaskId};

/// The scheduler operations consumed by the semaphore core.
///
/// The semaphore core never decides *which* task runs; it only tells the
/// scheduler when a task must stop running, when it may run again, and when
/// its effective priority changed because of priority inheritance.
///
/// # Wakeup contract
///
/// [`block`] is called *after* the calling task has left the critical
/// section, so an [`unblock`] for that task may be issued before the matching
/// [`block`] is entered. Implementations must not lose such an early
/// `unblock`: `block` must then return promptly (this is the contract of
/// `std::thread::park` and `Thread::unpark`). `block` is allowed to return
/// spuriously; the semaphore core re-checks the task's state and blocks again
/// if it is still waiting.
///
/// [`unblock`] and [`priority_changed`] are called from *inside* the
/// critical section, possibly from an interrupt handler or the timer
/// subsystem, and must not call back into the [`Kernel`](crate::Kernel).
///
/// [`block`]: Scheduler::block
/// [`unblock`]: Scheduler::unblock
/// [`priority_changed`]: Scheduler::priority_changed
pub trait Scheduler {
    /// Suspends `task`, which is the calling task, until it is unblocked.
    fn block(&self, task: TaskId);

    /// Makes `task` runnable again.
    fn unblock(&self, task: TaskId);

    /// Notifies the scheduler that `task`'s effective priority is now
    /// `priority`.
    ///
    /// A scheduler that keeps its run queue ordered by priority should
    /// reposition the task here. The default implementation does nothing.
    fn priority_changed(&self, task: TaskId, priority: Priority) {
        let _ = (task, priority);
    }
}

impl<S: Scheduler + ?Sized> Scheduler for &S {
    #[inline]
    fn block(&self, task: TaskId) {
        S::block(self, task)
    }

    #[inline]
    fn unblock(&self, task: TaskId) {
        S::unblock(self, task)
    }

    #[inline]
    fn priority_changed(&self, task: TaskId, priority: Priority) {
        S::priority_changed(self, task, priority)
    }
}

#[cfg(any(test, feature = "std"))]
impl<S: Scheduler + ?Sized> Scheduler for std::sync::Arc<S> {
    #[inline]
    fn block(&self, task: TaskId) {
        S::block(self, task)
    }

    #[inline]
    fn unblock(&self, task: TaskId) {
        S::unblock(self, task)
    }

    #[inline]
    fn priority_changed(&self, task: TaskId, priority: Priority) {
        S::priority_changed(self, task, priority)
    }
}
