//! Waiting for and posting semaphores.
//!
//! A task that finds a unit available takes it without ever leaving the
//! critical section. A task that does not decrements the count anyway (so
//! that the count's magnitude records it as a waiter), joins the semaphore's
//! waiter list, boosts the semaphore's holders if the semaphore uses a
//! priority protocol, and suspends. It then resumes for one of three reasons:
//!
//! - a [`post`](crate::Kernel::post) granted it the semaphore,
//! - the semaphore was [`reset`](crate::Kernel::reset), or
//! - its wait was [cancelled](crate::cancel) by a signal or a timeout.
//!
//! Whoever ends the wait does all of the bookkeeping (count, waiter list,
//! holders, priorities) before unblocking the task; the resumed task only
//! reads the outcome left in its task record.
use crate::{
    kernel::State, task::WaitState, Error, Kernel, RawCriticalSection, Scheduler, SemId, TaskId,
    SEM_VALUE_MAX,
};
use alloc::vec::Vec;

/// The result of the first, non-suspending half of a wait.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Begin {
    /// The semaphore was acquired on the fast path.
    Acquired,
    /// The task is now registered as a waiter and must suspend.
    Blocked,
}

// === impl State ===

impl State {
    /// Takes a unit of `sem` for `task` if one is available.
    pub(crate) fn trywait(
        &mut self,
        sem: SemId,
        task: TaskId,
        sched: &impl Scheduler,
    ) -> Result<(), Error> {
        self.check_running(task)?;
        let s = self.sems.get_mut(sem)?;
        if s.count <= 0 {
            return Err(Error::WouldBlock);
        }

        s.count -= 1;
        tracing::trace!(%sem, %task, count = s.count, "acquired");
        self.add_holder(sem, task, sched);
        Ok(())
    }

    /// Takes a unit of `sem` for `task`, or registers `task` as a waiter.
    pub(crate) fn begin_wait(
        &mut self,
        sem: SemId,
        task: TaskId,
        sched: &impl Scheduler,
    ) -> Result<Begin, Error> {
        match self.trywait(sem, task, sched) {
            Ok(()) => return Ok(Begin::Acquired),
            Err(Error::WouldBlock) => {}
            Err(error) => return Err(error),
        }

        let State { tasks, sems, .. } = self;
        let s = sems.expect_mut(sem);
        s.count -= 1;
        s.waiters.push(task);
        kernel_assert!(
            s.waiters.len() == s.count.unsigned_abs() as usize,
            "{sem} has {} waiters but a count of {}",
            s.waiters.len(),
            s.count
        );

        let t = tasks.expect_mut(task);
        t.wait_state = WaitState::WaitSem;
        t.wait_target = Some(sem);
        t.pending_error = None;
        tracing::trace!(%sem, %task, count = s.count, priority = %t.effective_priority, "blocking");

        if s.protocol.tracks_holders() {
            self.boost_holders(sem, task, sched);
        }
        Ok(Begin::Blocked)
    }

    /// Returns the outcome of `task`'s wait, or `None` if it is still waiting.
    pub(crate) fn finish_wait(&mut self, task: TaskId) -> Option<Result<(), Error>> {
        let t = self.tasks.expect_mut(task);
        if t.wait_state == WaitState::WaitSem {
            return None;
        }

        Some(match t.pending_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        })
    }

    pub(crate) fn post(
        &mut self,
        sem: SemId,
        poster: Option<TaskId>,
        sched: &impl Scheduler,
    ) -> Result<(), Error> {
        let s = self.sems.get_mut(sem)?;
        if s.count >= SEM_VALUE_MAX {
            return Err(Error::Overflow);
        }

        let mut affected = Vec::new();
        if let Some(poster) = poster {
            if self.release_holder(sem, poster) {
                affected.push(poster);
            } else if self.sems.expect(sem).protocol.tracks_holders() {
                tracing::debug!(%sem, task = %poster, "posted by a task that does not hold it");
            }
        }

        let State { tasks, sems, .. } = self;
        let s = sems.expect_mut(sem);
        s.count += 1;
        tracing::trace!(%sem, poster = ?poster, count = s.count, "posted");

        if s.count <= 0 {
            let Some(waiter) = s.take_waiter(tasks) else {
                panic!("{sem} has a count of {} but no waiters", s.count);
            };

            let t = tasks.expect_mut(waiter);
            kernel_assert!(
                t.is_waiting_on(sem),
                "{waiter} is in the waiter list of {sem} but is not waiting on it"
            );
            t.wait_state = WaitState::Running;
            t.wait_target = None;
            t.pending_error = None;
            tracing::trace!(%sem, task = %waiter, "granted to waiter");

            // the remaining holders no longer inherit from the granted task,
            // and the granted task may now inherit from the remaining waiters.
            affected.extend(s.holders.tasks());
            self.add_holder(sem, waiter, sched);
            self.restore_priorities(affected, sched);
            sched.unblock(waiter);
        } else {
            self.restore_priorities(affected, sched);
        }

        Ok(())
    }

    fn check_running(&self, task: TaskId) -> Result<(), Error> {
        let t = self.tasks.get(task).ok_or(Error::InvalidArgument)?;
        kernel_assert!(
            t.wait_state == WaitState::Running,
            "{task} tried to wait on a semaphore while in state {:?}",
            t.wait_state
        );
        Ok(())
    }
}

// === impl Kernel ===

impl<S, C> Kernel<S, C>
where
    S: Scheduler,
    C: RawCriticalSection,
{
    /// Acquires a unit of `sem` on behalf of `task`, suspending `task` until
    /// one becomes available.
    ///
    /// `task` must be the calling task. If the semaphore uses a priority
    /// protocol, `task` becomes one of its holders once it acquires it, and
    /// must eventually [`post`](Self::post) it to release that hold.
    ///
    /// # Returns
    ///
    /// - `Ok(())` once the semaphore has been acquired.
    /// - `Err(`[`Error::Interrupted`]`)` if the wait was cancelled by a
    ///   signal.
    /// - `Err(`[`Error::TimedOut`]`)` if the wait was cancelled by a timer
    ///   (see [`tickwait`](Self::tickwait)).
    /// - `Err(`[`Error::Reset`]`)` if the semaphore was
    ///   [`reset`](Self::reset) while waiting.
    /// - `Err(`[`Error::InvalidArgument`]`)` if `sem` or `task` does not exist.
    ///
    /// In every error case the semaphore was not acquired, and its state is
    /// consistent, so the wait may simply be retried.
    ///
    /// # Panics
    ///
    /// If `task` is not running, or if blocking would complete a cycle of
    /// tasks waiting on each other under priority inheritance.
    pub fn wait(&self, sem: SemId, task: TaskId) -> Result<(), Error> {
        let begin = self.state.with(|state| state.begin_wait(sem, task, &self.sched))?;
        match begin {
            Begin::Acquired => Ok(()),
            Begin::Blocked => self.suspend(task),
        }
    }

    /// Acquires a unit of `sem` on behalf of `task` only if one is available
    /// right now.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if the semaphore was acquired.
    /// - `Err(`[`Error::WouldBlock`]`)` if no unit was available. Nothing
    ///   about the semaphore changed.
    /// - `Err(`[`Error::InvalidArgument`]`)` if `sem` or `task` does not exist.
    pub fn trywait(&self, sem: SemId, task: TaskId) -> Result<(), Error> {
        self.state.with(|state| state.trywait(sem, task, &self.sched))
    }

    /// Releases a unit of `sem`.
    ///
    /// If tasks are blocked on the semaphore, exactly one of them is granted
    /// the unit and unblocked: the one with the highest effective priority,
    /// and among those, the one that has waited longest.
    ///
    /// `poster` is the posting task, or `None` when posting from an interrupt
    /// handler. If the poster is a registered holder of the semaphore, one of
    /// its holds is released and its priority restored. Posting a semaphore
    /// the poster never acquired is allowed (this is how semaphores are used
    /// for signaling), and leaves the poster's priority alone.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if the semaphore was posted.
    /// - `Err(`[`Error::Overflow`]`)` if the count is already
    ///   [`SEM_VALUE_MAX`]. Nothing changed.
    /// - `Err(`[`Error::InvalidArgument`]`)` if `sem` does not exist.
    pub fn post(&self, sem: SemId, poster: Option<TaskId>) -> Result<(), Error> {
        self.state.with(|state| state.post(sem, poster, &self.sched))
    }

    /// Suspends `task`, which has registered as a waiter, until its wait ends.
    pub(crate) fn suspend(&self, task: TaskId) -> Result<(), Error> {
        loop {
            self.sched.block(task);
            if let Some(result) = self.state.with(|state| state.finish_wait(task)) {
                tracing::trace!(%task, ?result, "resumed");
                return result;
            }
            tracing::trace!(%task, "spurious wakeup; still waiting");
        }
    }
}
