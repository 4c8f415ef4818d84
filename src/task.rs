//! The task-control fields consumed by the semaphore core.
//!
//! Tasks are owned by the scheduler; the semaphore core only needs a handful
//! of their fields. These live in an arena of [`Task`] records owned by the
//! [`Kernel`](crate::Kernel) and addressed by a small integer [`TaskId`], so
//! that semaphores can refer to their holders and waiters by id rather than by
//! pointer.
use crate::{Error, SemId};
use alloc::vec::Vec;
use core::fmt;

/// Identifies a task in a [`Kernel`](crate::Kernel)'s task table.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TaskId(u16);

/// A scheduling priority. Larger values are more urgent.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Priority(u8);

/// What a task is currently doing, as far as the semaphore core can tell.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WaitState {
    /// The task is running or ready to run.
    Running,
    /// The task is suspended waiting for a semaphore.
    WaitSem,
    /// The task is suspended for some reason unrelated to semaphores.
    ///
    /// The platform reports this state with [`Kernel::set_suspended`].
    ///
    /// [`Kernel::set_suspended`]: crate::Kernel::set_suspended
    Other,
}

/// A task record.
#[derive(Debug)]
pub(crate) struct Task {
    pub(crate) base_priority: Priority,
    pub(crate) effective_priority: Priority,
    pub(crate) wait_state: WaitState,
    pub(crate) wait_target: Option<SemId>,
    pub(crate) pending_error: Option<Error>,
}

/// The task arena.
#[derive(Debug)]
pub(crate) struct TaskTable {
    slots: Vec<Option<Task>>,
    live: usize,
    max: usize,
}

// === impl TaskId ===

impl TaskId {
    #[inline]
    pub(crate) const fn from_index(idx: usize) -> Self {
        Self(idx as u16)
    }

    /// Returns this id's index in the task table.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

// === impl Priority ===

impl Priority {
    /// The least urgent priority.
    pub const MIN: Self = Self(u8::MIN);
    /// The most urgent priority.
    pub const MAX: Self = Self(u8::MAX);

    /// Returns a new `Priority`.
    #[must_use]
    pub const fn new(priority: u8) -> Self {
        Self(priority)
    }

    /// Returns the numeric value of this priority.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// === impl Task ===

impl Task {
    fn new(base_priority: Priority) -> Self {
        Self {
            base_priority,
            effective_priority: base_priority,
            wait_state: WaitState::Running,
            wait_target: None,
            pending_error: None,
        }
    }

    #[inline]
    pub(crate) fn is_waiting_on(&self, sem: SemId) -> bool {
        self.wait_state == WaitState::WaitSem && self.wait_target == Some(sem)
    }
}

// === impl TaskTable ===

impl TaskTable {
    pub(crate) const fn new(max: usize) -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
            max,
        }
    }

    pub(crate) fn insert(&mut self, base_priority: Priority) -> Result<TaskId, Error> {
        if self.live >= self.max {
            return Err(Error::Busy);
        }

        let task = Task::new(base_priority);
        let idx = match self.slots.iter().position(Option::is_none) {
            Some(idx) => {
                self.slots[idx] = Some(task);
                idx
            }
            None => {
                self.slots.push(Some(task));
                self.slots.len() - 1
            }
        };
        self.live += 1;
        Ok(TaskId::from_index(idx))
    }

    pub(crate) fn remove(&mut self, id: TaskId) -> Option<Task> {
        let task = self.slots.get_mut(id.as_usize())?.take()?;
        self.live -= 1;
        Some(task)
    }

    #[inline]
    pub(crate) fn get(&self, id: TaskId) -> Option<&Task> {
        self.slots.get(id.as_usize())?.as_ref()
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.slots.get_mut(id.as_usize())?.as_mut()
    }

    /// Returns the task record for a task that must exist.
    ///
    /// Holder and waiter sets only ever contain live tasks, so a missing task
    /// here is a kernel bug.
    #[track_caller]
    pub(crate) fn expect(&self, id: TaskId) -> &Task {
        match self.get(id) {
            Some(task) => task,
            None => panic!("{id} is referenced by a semaphore but does not exist"),
        }
    }

    #[track_caller]
    pub(crate) fn expect_mut(&mut self, id: TaskId) -> &mut Task {
        match self.get_mut(id) {
            Some(task) => task,
            None => panic!("{id} is referenced by a semaphore but does not exist"),
        }
    }

    /// Returns the number of live tasks.
    #[inline]
    pub(crate) fn live(&self) -> usize {
        self.live
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = (TaskId, &Task)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, task)| Some((TaskId::from_index(idx), task.as_ref()?)))
    }
}
