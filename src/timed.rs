//! Waiting with a deadline.
//!
//! [`Kernel::tickwait`] bounds a [`wait`](Kernel::wait) by a number of timer
//! ticks. The deadline is computed from a caller-supplied start time rather
//! than from the time the wait actually begins, so that any delay between the
//! caller deciding to wait and the wait starting (such as being preempted)
//! neither extends nor shortens the caller's intended deadline.
//!
//! Timeouts are delivered by the platform's timer subsystem, through the
//! [`Timer`] trait: the semaphore core arms a one-shot timer for the waiting
//! task, and when that timer fires, the timer subsystem must call
//! [`Kernel::notify_wait_interrupted`] with [`CancelReason::TimedOut`].
//!
//! [`CancelReason::TimedOut`]: crate::CancelReason::TimedOut
use crate::{
    kernel::State, wait::Begin, Error, Kernel, RawCriticalSection, Scheduler, SemId, TaskId,
};

/// A timestamp or duration in timer ticks.
///
/// Tick counters may wrap around; all arithmetic on `Ticks` is wrapping.
pub type Ticks = u64;

/// The timer operations consumed by [`Kernel::tickwait`].
///
/// [`now`](Timer::now) and [`arm`](Timer::arm) are called from inside the
/// kernel's critical section, and must not call back into the [`Kernel`].
pub trait Timer {
    /// Returns the current tick count.
    fn now(&self) -> Ticks;

    /// Arms a one-shot timer for `task` that expires at `deadline`.
    ///
    /// When it expires, the timer subsystem must call
    /// [`Kernel::notify_wait_interrupted`]`(task, `[`CancelReason::TimedOut`]`)`.
    /// A task has at most one timer armed at a time.
    ///
    /// [`CancelReason::TimedOut`]: crate::CancelReason::TimedOut
    fn arm(&self, task: TaskId, deadline: Ticks);

    /// Disarms `task`'s timer, if it is armed. Disarming a timer that already
    /// fired, or was never armed, does nothing.
    fn disarm(&self, task: TaskId);
}

impl<T: Timer + ?Sized> Timer for &T {
    #[inline]
    fn now(&self) -> Ticks {
        T::now(self)
    }

    #[inline]
    fn arm(&self, task: TaskId, deadline: Ticks) {
        T::arm(self, task, deadline)
    }

    #[inline]
    fn disarm(&self, task: TaskId) {
        T::disarm(self, task)
    }
}

// === impl State ===

impl State {
    pub(crate) fn begin_tickwait(
        &mut self,
        sem: SemId,
        task: TaskId,
        timer: &impl Timer,
        start: Ticks,
        delay: Ticks,
        sched: &impl Scheduler,
    ) -> Result<Begin, Error> {
        match self.trywait(sem, task, sched) {
            Ok(()) => return Ok(Begin::Acquired),
            Err(Error::WouldBlock) => {}
            Err(error) => return Err(error),
        }

        let elapsed = timer.now().wrapping_sub(start);
        if elapsed >= delay {
            tracing::trace!(%sem, %task, start, delay, elapsed, "deadline already passed");
            return Err(Error::TimedOut);
        }

        let begin = self.begin_wait(sem, task, sched)?;
        debug_assert_eq!(begin, Begin::Blocked, "trywait failed, so the wait must block");

        let deadline = start.wrapping_add(delay);
        tracing::trace!(%sem, %task, deadline, "arming timeout");
        timer.arm(task, deadline);
        Ok(begin)
    }
}

// === impl Kernel ===

impl<S, C> Kernel<S, C>
where
    S: Scheduler,
    C: RawCriticalSection,
{
    /// Acquires a unit of `sem` on behalf of `task`, waiting at most until
    /// `delay` ticks after `start`.
    ///
    /// `start` is a tick count, usually read from `timer` by the caller shortly
    /// before calling `tickwait`. If `delay` is zero, this is exactly
    /// [`trywait`](Self::trywait). Otherwise, if the semaphore cannot be
    /// acquired immediately and the deadline has already passed, this fails
    /// without waiting.
    ///
    /// # Returns
    ///
    /// - `Ok(())` once the semaphore has been acquired.
    /// - `Err(`[`Error::TimedOut`]`)` if the deadline passed first.
    /// - `Err(`[`Error::Interrupted`]`)` if the wait was cancelled by a signal.
    /// - `Err(`[`Error::Reset`]`)` if the semaphore was reset while waiting.
    /// - `Err(`[`Error::WouldBlock`]`)` if `delay` is zero and no unit was
    ///   available.
    /// - `Err(`[`Error::InvalidArgument`]`)` if `sem` or `task` does not exist.
    pub fn tickwait(
        &self,
        sem: SemId,
        task: TaskId,
        timer: &impl Timer,
        start: Ticks,
        delay: Ticks,
    ) -> Result<(), Error> {
        if delay == 0 {
            return self.trywait(sem, task);
        }

        let begin = self
            .state
            .with(|state| state.begin_tickwait(sem, task, timer, start, delay, &self.sched))?;
        if begin == Begin::Acquired {
            return Ok(());
        }

        let result = self.suspend(task);
        // the timer may have fired already; disarming it is harmless.
        timer.disarm(task);
        result
    }
}
