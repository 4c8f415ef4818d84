use crate::{
    critical::Protected, semaphore::SemTable, task::TaskTable, Config, Error, Priority,
    RawCriticalSection, Scheduler, Spinlock, TaskId, WaitState,
};
use core::fmt;

/// The semaphore core of a kernel.
///
/// A `Kernel` owns the task and semaphore tables that the semaphore
/// operations act on, the [`RawCriticalSection`] protecting them, and the
/// [`Scheduler`] used to block and unblock tasks. Operations never discover
/// "the current task" on their own: each one is told which semaphore it acts
/// on and which task is acting, as [`TaskId`] and [`SemId`](crate::SemId)
/// handles.
///
/// The operations themselves are documented where they are implemented:
///
/// - [`sem_init`], [`sem_destroy`], [`get_value`], [`reset`],
///   [`get_protocol`] and [`set_protocol`] manage semaphores.
/// - [`wait`], [`trywait`] and [`post`] acquire and release them.
/// - [`tickwait`] waits with a deadline.
/// - [`notify_wait_interrupted`] cancels a blocked wait, and [`task_exit`]
///   removes a task.
///
/// [`sem_init`]: Kernel::sem_init
/// [`sem_destroy`]: Kernel::sem_destroy
/// [`get_value`]: Kernel::get_value
/// [`reset`]: Kernel::reset
/// [`get_protocol`]: Kernel::get_protocol
/// [`set_protocol`]: Kernel::set_protocol
/// [`wait`]: Kernel::wait
/// [`trywait`]: Kernel::trywait
/// [`post`]: Kernel::post
/// [`tickwait`]: Kernel::tickwait
/// [`notify_wait_interrupted`]: Kernel::notify_wait_interrupted
/// [`task_exit`]: Kernel::task_exit
pub struct Kernel<S, C: RawCriticalSection = Spinlock> {
    pub(crate) state: Protected<State, C>,
    pub(crate) sched: S,
}

/// Everything protected by the critical section.
#[derive(Debug)]
pub(crate) struct State {
    pub(crate) tasks: TaskTable,
    pub(crate) sems: SemTable,
    pub(crate) config: Config,
}

// === impl Kernel ===

impl<S: Scheduler> Kernel<S> {
    /// Returns a new `Kernel` using `sched`, the default [`Config`], and a
    /// [`Spinlock`] critical section.
    #[must_use]
    pub fn new(sched: S) -> Self {
        Self::with_config(sched, Config::new())
    }

    /// Returns a new `Kernel` using `sched`, `config`, and a [`Spinlock`]
    /// critical section.
    #[must_use]
    pub fn with_config(sched: S, config: Config) -> Self {
        Self::new_with_critical_section(sched, config, Spinlock::new())
    }
}

impl<S, C> Kernel<S, C>
where
    S: Scheduler,
    C: RawCriticalSection,
{
    /// Returns a new `Kernel` using the provided [`RawCriticalSection`]
    /// implementation.
    #[must_use]
    pub fn new_with_critical_section(sched: S, config: Config, cs: C) -> Self {
        let state = State {
            tasks: TaskTable::new(config.max_tasks()),
            sems: SemTable::new(),
            config,
        };
        Self {
            state: Protected::new(state, cs),
            sched,
        }
    }

    /// Returns the kernel's [`Config`].
    pub fn config(&self) -> Config {
        self.state.with(|state| state.config)
    }

    /// Returns a reference to the kernel's [`Scheduler`].
    pub fn scheduler(&self) -> &S {
        &self.sched
    }

    /// Adds a task with the given base priority to the task table.
    ///
    /// # Returns
    ///
    /// - `Ok(`[`TaskId`]`)` identifying the new task, which starts out
    ///   [running](WaitState::Running) at its base priority.
    /// - `Err(`[`Error::Busy`]`)` if the task table already holds
    ///   [`Config::max_tasks`] tasks.
    pub fn task_create(&self, base_priority: Priority) -> Result<TaskId, Error> {
        self.state.with(|state| {
            let id = state.tasks.insert(base_priority)?;
            tracing::trace!(task = %id, %base_priority, "created task");
            Ok(id)
        })
    }

    /// Returns `task`'s base priority.
    pub fn base_priority(&self, task: TaskId) -> Result<Priority, Error> {
        self.with_task(task, |task| task.base_priority)
    }

    /// Returns `task`'s effective priority, including any boost from priority
    /// inheritance or a priority ceiling.
    pub fn effective_priority(&self, task: TaskId) -> Result<Priority, Error> {
        self.with_task(task, |task| task.effective_priority)
    }

    /// Returns `task`'s current [`WaitState`].
    pub fn wait_state(&self, task: TaskId) -> Result<WaitState, Error> {
        self.with_task(task, |task| task.wait_state)
    }

    /// Records that `task` was suspended, or resumed, for a reason unrelated
    /// to semaphores, such as a sleep.
    ///
    /// A task in the [`WaitState::Other`] state is not waiting on any
    /// semaphore, so cancellation leaves it alone, and priority inheritance
    /// chains end at it.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if the task's wait state was updated.
    /// - `Err(`[`Error::InvalidArgument`]`)` if `task` does not exist, or is
    ///   currently waiting on a semaphore.
    pub fn set_suspended(&self, task: TaskId, suspended: bool) -> Result<(), Error> {
        self.state.with(|state| {
            let t = state.tasks.get_mut(task).ok_or(Error::InvalidArgument)?;
            if t.wait_state == WaitState::WaitSem {
                return Err(Error::InvalidArgument);
            }
            t.wait_state = if suspended {
                WaitState::Other
            } else {
                WaitState::Running
            };
            tracing::trace!(%task, suspended, "task suspension changed");
            Ok(())
        })
    }

    fn with_task<T>(
        &self,
        task: TaskId,
        f: impl FnOnce(&crate::task::Task) -> T,
    ) -> Result<T, Error> {
        self.state
            .with(|state| state.tasks.get(task).map(f).ok_or(Error::InvalidArgument))
    }
}

impl<S, C> fmt::Debug for Kernel<S, C>
where
    S: fmt::Debug,
    C: RawCriticalSection + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("state", &self.state)
            .field("sched", &self.sched)
            .finish()
    }
}
