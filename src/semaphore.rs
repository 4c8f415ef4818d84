//! Semaphore records and the count state machine.
//!
//! A semaphore's `count` is signed:
//!
//! - `count >= 0`: `count` units are available and no task is waiting.
//! - `count < 0`: no units are available and exactly `-count` tasks are
//!   blocked waiting for this semaphore.
//!
//! Every operation in this crate preserves that correspondence; the waiter
//! list kept alongside the count always has `max(0, -count)` entries.
use crate::{
    holder::Holders, kernel::State, Error, Kernel, Priority, RawCriticalSection, Scheduler, TaskId,
};
use alloc::vec::Vec;
use core::fmt;

/// The largest count a semaphore may hold.
pub const SEM_VALUE_MAX: i32 = i16::MAX as i32;

/// Identifies a semaphore in a [`Kernel`]'s semaphore table.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SemId(u32);

/// The priority protocol used by a semaphore.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Protocol {
    /// No priority protocol. Holders are not tracked.
    ///
    /// This is the right protocol for semaphores used for signaling (one task
    /// waits, a different task or an interrupt handler posts), since the
    /// waiter never releases what it acquired.
    #[default]
    None,
    /// Priority inheritance: holders run at least at the priority of the most
    /// urgent task waiting for the semaphore.
    Inherit,
    /// Priority ceiling: holders run at least at `ceiling` for as long as they
    /// hold the semaphore, in addition to inheriting from waiters.
    Protect {
        /// The priority every holder is raised to.
        ceiling: Priority,
    },
}

/// A semaphore record.
#[derive(Debug)]
pub(crate) struct Semaphore {
    pub(crate) count: i32,
    pub(crate) protocol: Protocol,
    pub(crate) holders: Holders,
    /// Blocked tasks, in order of arrival.
    pub(crate) waiters: Vec<TaskId>,
}

/// The semaphore arena.
#[derive(Debug, Default)]
pub(crate) struct SemTable {
    slots: Vec<Option<Semaphore>>,
}

// === impl SemId ===

impl SemId {
    #[inline]
    const fn from_index(idx: usize) -> Self {
        Self(idx as u32)
    }

    #[inline]
    const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for SemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SemId({})", self.0)
    }
}

impl fmt::Display for SemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sem#{}", self.0)
    }
}

// === impl Protocol ===

impl Protocol {
    /// Returns `true` if semaphores using this protocol track their holders.
    #[inline]
    #[must_use]
    pub const fn tracks_holders(&self) -> bool {
        !matches!(self, Self::None)
    }
}

// === impl Semaphore ===

impl Semaphore {
    fn new(count: i32) -> Self {
        Self {
            count,
            protocol: Protocol::None,
            holders: Holders::new(),
            waiters: Vec::new(),
        }
    }

    /// Removes and returns the waiter that should be granted next: the most
    /// urgent by effective priority, earliest arrival first among equals.
    pub(crate) fn take_waiter(&mut self, tasks: &crate::task::TaskTable) -> Option<TaskId> {
        let mut best: Option<(usize, Priority)> = None;
        for (idx, &waiter) in self.waiters.iter().enumerate() {
            let priority = tasks.expect(waiter).effective_priority;
            if best.map_or(true, |(_, best)| priority > best) {
                best = Some((idx, priority));
            }
        }
        let (idx, _) = best?;
        Some(self.waiters.remove(idx))
    }

    /// Removes `task` from the waiter list, returning `false` if it was not
    /// waiting.
    pub(crate) fn remove_waiter(&mut self, task: TaskId) -> bool {
        match self.waiters.iter().position(|&w| w == task) {
            Some(idx) => {
                self.waiters.remove(idx);
                true
            }
            None => false,
        }
    }

    #[inline]
    pub(crate) fn is_idle(&self) -> bool {
        self.count >= 0 && self.holders.is_empty()
    }
}

// === impl SemTable ===

impl SemTable {
    pub(crate) const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    fn insert(&mut self, sem: Semaphore) -> Result<SemId, Error> {
        if let Some(idx) = self.slots.iter().position(Option::is_none) {
            self.slots[idx] = Some(sem);
            return Ok(SemId::from_index(idx));
        }

        if self.slots.len() >= u32::MAX as usize {
            return Err(Error::Busy);
        }
        self.slots.push(Some(sem));
        Ok(SemId::from_index(self.slots.len() - 1))
    }

    fn remove(&mut self, id: SemId) -> Option<Semaphore> {
        self.slots.get_mut(id.as_usize())?.take()
    }

    #[inline]
    pub(crate) fn get(&self, id: SemId) -> Result<&Semaphore, Error> {
        self.slots
            .get(id.as_usize())
            .and_then(Option::as_ref)
            .ok_or(Error::InvalidArgument)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: SemId) -> Result<&mut Semaphore, Error> {
        self.slots
            .get_mut(id.as_usize())
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidArgument)
    }

    /// Returns a semaphore that a task record refers to, and must therefore
    /// exist.
    #[track_caller]
    pub(crate) fn expect(&self, id: SemId) -> &Semaphore {
        match self.get(id) {
            Ok(sem) => sem,
            Err(_) => panic!("{id} is referenced by a task but does not exist"),
        }
    }

    #[track_caller]
    pub(crate) fn expect_mut(&mut self, id: SemId) -> &mut Semaphore {
        match self.get_mut(id) {
            Ok(sem) => sem,
            Err(_) => panic!("{id} is referenced by a task but does not exist"),
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (SemId, &Semaphore)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, sem)| Some((SemId::from_index(idx), sem.as_ref()?)))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (SemId, &mut Semaphore)> + '_ {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(idx, sem)| Some((SemId::from_index(idx), sem.as_mut()?)))
    }
}

// === impl State ===

impl State {
    pub(crate) fn sem_init(&mut self, value: u32) -> Result<SemId, Error> {
        let count = i32::try_from(value)
            .ok()
            .filter(|&count| count <= SEM_VALUE_MAX)
            .ok_or(Error::InvalidArgument)?;
        let id = self.sems.insert(Semaphore::new(count))?;
        tracing::trace!(sem = %id, count, "initialized semaphore");
        Ok(id)
    }

    pub(crate) fn sem_destroy(&mut self, sem: SemId) -> Result<(), Error> {
        if !self.sems.get(sem)?.is_idle() {
            return Err(Error::Busy);
        }
        self.sems.remove(sem);
        tracing::trace!(%sem, "destroyed semaphore");
        Ok(())
    }

    pub(crate) fn reset(
        &mut self,
        sem: SemId,
        value: u32,
        sched: &impl Scheduler,
    ) -> Result<(), Error> {
        let count = i32::try_from(value)
            .ok()
            .filter(|&count| count <= SEM_VALUE_MAX)
            .ok_or(Error::InvalidArgument)?;
        let State { tasks, sems, .. } = self;
        let s = sems.get_mut(sem)?;

        let waiters = core::mem::take(&mut s.waiters);
        tracing::debug!(
            %sem,
            from = s.count,
            to = count,
            waiters = waiters.len(),
            "resetting semaphore"
        );
        s.count = count;

        for &waiter in &waiters {
            let task = tasks.expect_mut(waiter);
            kernel_assert!(
                task.is_waiting_on(sem),
                "{waiter} is in the waiter list of {sem} but is not waiting on it"
            );
            task.wait_state = crate::WaitState::Running;
            task.wait_target = None;
            task.pending_error = Some(Error::Reset);
            sched.unblock(waiter);
        }

        if !waiters.is_empty() {
            let holders: Vec<TaskId> = self.sems.expect(sem).holders.tasks().collect();
            self.restore_priorities(holders, sched);
        }
        Ok(())
    }

    pub(crate) fn set_protocol(&mut self, sem: SemId, protocol: Protocol) -> Result<(), Error> {
        let s = self.sems.get_mut(sem)?;
        if s.protocol == protocol {
            return Ok(());
        }

        if !s.holders.is_empty() || s.count < 0 {
            tracing::debug!(
                %sem,
                from = ?s.protocol,
                to = ?protocol,
                "cannot change protocol while in use"
            );
            return Err(Error::InvalidArgument);
        }

        tracing::trace!(%sem, from = ?s.protocol, to = ?protocol, "set protocol");
        s.protocol = protocol;
        Ok(())
    }
}

// === impl Kernel ===

impl<S, C> Kernel<S, C>
where
    S: Scheduler,
    C: RawCriticalSection,
{
    /// Creates a new semaphore with `value` units available and the
    /// [`Protocol::None`] protocol.
    ///
    /// # Returns
    ///
    /// - `Ok(`[`SemId`]`)` identifying the new semaphore.
    /// - `Err(`[`Error::InvalidArgument`]`)` if `value` is greater than
    ///   [`SEM_VALUE_MAX`].
    pub fn sem_init(&self, value: u32) -> Result<SemId, Error> {
        self.state.with(|state| state.sem_init(value))
    }

    /// Destroys a semaphore.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if the semaphore was destroyed.
    /// - `Err(`[`Error::Busy`]`)` if a task is waiting on the semaphore or is
    ///   a registered holder of it.
    /// - `Err(`[`Error::InvalidArgument`]`)` if `sem` does not exist.
    pub fn sem_destroy(&self, sem: SemId) -> Result<(), Error> {
        self.state.with(|state| state.sem_destroy(sem))
    }

    /// Returns the current count of `sem`.
    ///
    /// A negative value's magnitude is the number of tasks blocked on the
    /// semaphore. The value is a snapshot and may be stale by the time it is
    /// returned, so it is only advisory.
    pub fn get_value(&self, sem: SemId) -> Result<i32, Error> {
        self.state.with(|state| Ok(state.sems.get(sem)?.count))
    }

    /// Forces the count of `sem` to `value`.
    ///
    /// Every task blocked on the semaphore is woken *without* acquiring it;
    /// its wait returns [`Error::Reset`]. This is intended for error recovery
    /// inside the kernel, not for ordinary synchronization.
    pub fn reset(&self, sem: SemId, value: u32) -> Result<(), Error> {
        self.state.with(|state| state.reset(sem, value, &self.sched))
    }

    /// Returns the protocol used by `sem`.
    pub fn get_protocol(&self, sem: SemId) -> Result<Protocol, Error> {
        self.state.with(|state| Ok(state.sems.get(sem)?.protocol))
    }

    /// Sets the protocol used by `sem`.
    ///
    /// The protocol may only be changed while no task holds or waits on the
    /// semaphore; otherwise this returns [`Error::InvalidArgument`]. Setting
    /// the protocol a semaphore already uses always succeeds.
    pub fn set_protocol(&self, sem: SemId, protocol: Protocol) -> Result<(), Error> {
        self.state.with(|state| state.set_protocol(sem, protocol))
    }
}

#[cfg(all(test, not(loom)))]
mod tests;
