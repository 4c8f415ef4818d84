//! Cancelling blocked waits.
//!
//! A task blocked in [`Kernel::wait`] (or [`Kernel::tickwait`]) may have to
//! stop waiting before anyone posts the semaphore: a signal was delivered to
//! it, or its timeout elapsed. The signal-delivery and timer code call
//! [`Kernel::notify_wait_interrupted`], which unwinds the wait and leaves the
//! reason in the task's record for the resumed task to return.
//!
//! Cancellation is asynchronous with respect to the waiting task, and may race
//! with a [`post`](Kernel::post) granting the semaphore to the same task. The
//! critical section serializes the two; whichever runs second finds the task
//! no longer waiting and does nothing.
use crate::{
    kernel::State, task::WaitState, Error, Kernel, RawCriticalSection, Scheduler, SemId, TaskId,
};
use alloc::vec::Vec;

/// Why a blocked wait is being cancelled.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CancelReason {
    /// A signal was delivered to the waiting task.
    Interrupted,
    /// The wait's deadline elapsed.
    TimedOut,
}

impl From<CancelReason> for Error {
    fn from(reason: CancelReason) -> Self {
        match reason {
            CancelReason::Interrupted => Error::Interrupted,
            CancelReason::TimedOut => Error::TimedOut,
        }
    }
}

// === impl State ===

impl State {
    pub(crate) fn wait_interrupted(
        &mut self,
        task: TaskId,
        reason: CancelReason,
        sched: &impl Scheduler,
    ) {
        let Some(t) = self.tasks.get(task) else {
            tracing::debug!(%task, ?reason, "cancelled task does not exist");
            return;
        };

        if t.wait_state != WaitState::WaitSem {
            tracing::debug!(
                %task,
                ?reason,
                state = ?t.wait_state,
                "task is no longer waiting; nothing to cancel"
            );
            return;
        }

        let sem = self.unwind_wait(task, sched);
        self.tasks.expect_mut(task).pending_error = Some(reason.into());
        tracing::trace!(%sem, %task, ?reason, "cancelled wait");
        sched.unblock(task);
    }

    /// Removes `task` from the semaphore it is blocked on, giving back the
    /// unit its wait claimed and withdrawing its priority demand.
    ///
    /// Returns the semaphore `task` was waiting on.
    fn unwind_wait(&mut self, task: TaskId, sched: &impl Scheduler) -> SemId {
        let t = self.tasks.expect_mut(task);
        let Some(sem) = t.wait_target.take() else {
            panic!("{task} is waiting on a semaphore, but has no wait target");
        };
        t.wait_state = WaitState::Running;

        let Ok(s) = self.sems.get_mut(sem) else {
            panic!("{task} is waiting on {sem}, which does not exist");
        };
        kernel_assert!(
            s.count < 0,
            "{task} is waiting on {sem}, but its count is {}",
            s.count
        );
        kernel_assert!(
            s.remove_waiter(task),
            "{task} is waiting on {sem}, but is not in its waiter list"
        );
        s.count += 1;

        let holders: Vec<TaskId> = s.holders.tasks().collect();
        self.restore_priorities(holders, sched);
        sem
    }

    pub(crate) fn task_exit(&mut self, task: TaskId, sched: &impl Scheduler) -> Result<(), Error> {
        let t = self.tasks.get(task).ok_or(Error::InvalidArgument)?;
        if t.wait_state == WaitState::WaitSem {
            let sem = self.unwind_wait(task, sched);
            tracing::debug!(%sem, %task, "exiting task was waiting; wait unwound");
        }

        // units held by an exiting task are not given back, they are just no
        // longer attributed to anyone. no other task's priority depends on the
        // exiting task's, so nothing needs to be restored.
        for (sem, s) in self.sems.iter_mut() {
            let held = s.holders.remove(task);
            if held > 0 {
                tracing::debug!(%sem, %task, held, "exiting task still held semaphore");
            }
        }

        self.tasks.remove(task);
        tracing::trace!(%task, "removed task");
        Ok(())
    }
}

// === impl Kernel ===

impl<S, C> Kernel<S, C>
where
    S: Scheduler,
    C: RawCriticalSection,
{
    /// Cancels `task`'s wait on a semaphore.
    ///
    /// This is called by signal delivery (with [`CancelReason::Interrupted`])
    /// or by timer expiry (with [`CancelReason::TimedOut`]), possibly from
    /// interrupt context. It never suspends the caller.
    ///
    /// If `task` is blocked on a semaphore, the wait is unwound: the count is
    /// incremented to give back the unit the wait claimed, `task` leaves the
    /// waiter list, priority boosts it caused are undone, and `task` is
    /// unblocked. Its wait then returns the error corresponding to `reason`.
    ///
    /// If `task` is not blocked on a semaphore (for instance, because a
    /// [`post`](Self::post) already granted it the semaphore), this does
    /// nothing.
    ///
    /// # Panics
    ///
    /// If `task` is recorded as waiting on a semaphore but that semaphore's
    /// state disagrees.
    pub fn notify_wait_interrupted(&self, task: TaskId, reason: CancelReason) {
        self.state
            .with(|state| state.wait_interrupted(task, reason, &self.sched))
    }

    /// Removes `task` from the task table.
    ///
    /// If `task` is blocked on a semaphore, its wait is unwound as if it were
    /// cancelled (without unblocking it). Any holds it still has are dropped:
    /// the units are *not* returned to their semaphores.
    ///
    /// Any timer armed for `task` by [`tickwait`](Self::tickwait) must be
    /// disarmed by the caller, as task ids are reused.
    pub fn task_exit(&self, task: TaskId) -> Result<(), Error> {
        self.state.with(|state| state.task_exit(task, &self.sched))
    }
}
