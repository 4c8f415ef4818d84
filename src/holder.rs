//! Holder tracking and priority inheritance.
//!
//! When a semaphore uses the [`Inherit`] or [`Protect`] protocol, it records
//! which tasks currently hold units of it, in its holder table. The table is
//! what makes bounded priority inversion possible:
//!
//! - **Boost.** When a task blocks on such a semaphore, every holder running
//!   at a lower effective priority is raised to the blocking task's effective
//!   priority. If a raised holder is itself blocked on another semaphore, the
//!   boost is applied to *that* semaphore's holders, and so on down the chain.
//! - **Ceiling.** A task acquiring a [`Protect`] semaphore runs at least at the
//!   semaphore's ceiling until it releases it, whether or not anyone waits.
//! - **Restore.** When a demand disappears (a holder releases, a waiter is
//!   granted, cancelled, or reset away), the affected tasks' effective
//!   priorities are recomputed from scratch: the maximum of their base
//!   priority, the ceilings of the [`Protect`] semaphores they still hold, and
//!   the effective priorities of the tasks still waiting on the semaphores
//!   they still hold. A task holding several semaphores may therefore remain
//!   partially boosted after releasing one of them.
//!
//! [`Inherit`]: crate::Protocol::Inherit
//! [`Protect`]: crate::Protocol::Protect
use crate::{
    kernel::State, semaphore::Protocol, task::WaitState, Priority, Scheduler, SemId, TaskId,
};
use alloc::vec::Vec;

/// A semaphore's holder table.
#[derive(Debug, Default)]
pub(crate) struct Holders {
    entries: Vec<Holder>,
}

/// One task's hold on a semaphore.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct Holder {
    pub(crate) task: TaskId,
    /// How many units of the semaphore the task holds.
    pub(crate) count: u16,
}

// === impl Holders ===

impl Holders {
    pub(crate) const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Records that `task` acquired one more unit.
    ///
    /// Returns `false` if `task` was not already a holder and the table already
    /// has `max` entries.
    pub(crate) fn add(&mut self, task: TaskId, max: usize) -> bool {
        if let Some(holder) = self.entries.iter_mut().find(|h| h.task == task) {
            holder.count = holder.count.saturating_add(1);
            return true;
        }

        if self.entries.len() >= max {
            return false;
        }

        self.entries.push(Holder { task, count: 1 });
        true
    }

    /// Records that `task` released one unit.
    ///
    /// Returns `false` if `task` was not a holder.
    pub(crate) fn release(&mut self, task: TaskId) -> bool {
        let Some(idx) = self.entries.iter().position(|h| h.task == task) else {
            return false;
        };

        let holder = &mut self.entries[idx];
        holder.count -= 1;
        if holder.count == 0 {
            self.entries.remove(idx);
        }
        true
    }

    /// Drops every unit held by `task`, returning how many there were.
    pub(crate) fn remove(&mut self, task: TaskId) -> u16 {
        match self.entries.iter().position(|h| h.task == task) {
            Some(idx) => self.entries.remove(idx).count,
            None => 0,
        }
    }

    #[inline]
    pub(crate) fn contains(&self, task: TaskId) -> bool {
        self.entries.iter().any(|h| h.task == task)
    }

    pub(crate) fn count_of(&self, task: TaskId) -> u16 {
        self.entries
            .iter()
            .find(|h| h.task == task)
            .map_or(0, |h| h.count)
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.entries.iter().map(|h| h.task)
    }
}

// === impl State ===

impl State {
    /// Records that `task` acquired `sem`, and applies the ceiling and any
    /// demands from tasks still waiting on `sem`.
    pub(crate) fn add_holder(&mut self, sem: SemId, task: TaskId, sched: &impl Scheduler) {
        let s = self.sems.expect_mut(sem);
        let max = match s.protocol {
            Protocol::None => return,
            Protocol::Inherit => self.config.max_holders(),
            // every holder of a ceiling semaphore must run at the ceiling.
            Protocol::Protect { .. } => usize::MAX,
        };

        if !s.holders.add(task, max) {
            tracing::warn!(
                %sem,
                %task,
                max_holders = max,
                "holder table full; priority inheritance is not tracked for this acquisition"
            );
            return;
        }

        tracing::trace!(%sem, %task, holds = s.holders.count_of(task), "added holder");
        self.restore_priorities([task], sched);
    }

    /// Records that `task` released one unit of `sem`.
    ///
    /// Returns `false` if `task` was not a registered holder of `sem`, in which
    /// case nothing changes.
    pub(crate) fn release_holder(&mut self, sem: SemId, task: TaskId) -> bool {
        let s = self.sems.expect_mut(sem);
        if !s.protocol.tracks_holders() {
            return false;
        }

        let released = s.holders.release(task);
        if released {
            tracing::trace!(%sem, %task, holds = s.holders.count_of(task), "released holder");
        }
        released
    }

    /// Raises the holders of `sem` to `blocker`'s effective priority, following
    /// chains of holders that are themselves blocked.
    ///
    /// Every chain is walked to its end, whether or not the holders along it
    /// need raising, so that a deadlock is detected regardless of the
    /// priorities involved. Each semaphore is visited at most once.
    ///
    /// # Panics
    ///
    /// If the chain leads back to `blocker`, which means the tasks involved
    /// are deadlocked.
    pub(crate) fn boost_holders(&mut self, sem: SemId, blocker: TaskId, sched: &impl Scheduler) {
        let State { tasks, sems, .. } = self;
        let priority = tasks.expect(blocker).effective_priority;
        let mut visited: Vec<SemId> = Vec::new();
        let mut chain: Vec<(SemId, usize)> = Vec::new();
        chain.push((sem, 0));

        while let Some((target, depth)) = chain.pop() {
            if visited.contains(&target) {
                continue;
            }
            visited.push(target);

            for holder in sems.expect(target).holders.tasks() {
                if holder == blocker {
                    // a task may wait for another unit of a counting semaphore
                    // it already holds; anywhere further down, it's a cycle.
                    kernel_assert!(
                        depth == 0,
                        "priority inheritance cycle: {blocker} waits on {sem}, which it transitively holds"
                    );
                    continue;
                }

                let task = tasks.expect_mut(holder);
                if task.effective_priority < priority {
                    tracing::trace!(
                        sem = %target,
                        task = %holder,
                        from = %task.effective_priority,
                        to = %priority,
                        %blocker,
                        "boosting holder"
                    );
                    task.effective_priority = priority;
                    sched.priority_changed(holder, priority);
                }

                if task.wait_state == WaitState::WaitSem {
                    if let Some(next) = task.wait_target {
                        chain.push((next, depth + 1));
                    }
                }
            }
        }
    }

    /// Recomputes the effective priorities of `start`, and of anything whose
    /// priority depended on them.
    pub(crate) fn restore_priorities(
        &mut self,
        start: impl IntoIterator<Item = TaskId>,
        sched: &impl Scheduler,
    ) {
        let mut work: Vec<TaskId> = start.into_iter().collect();
        let live = self.tasks.live();
        let limit = live * live + work.len();
        let mut steps = 0;

        while let Some(id) = work.pop() {
            steps += 1;
            kernel_assert!(
                steps <= limit,
                "priority restoration did not converge; the wait-for graph has a cycle"
            );

            let priority = self.demanded_priority(id);
            let task = self.tasks.expect_mut(id);
            if task.effective_priority == priority {
                continue;
            }

            tracing::trace!(
                task = %id,
                from = %task.effective_priority,
                to = %priority,
                "restoring priority"
            );
            task.effective_priority = priority;
            sched.priority_changed(id, priority);

            if task.wait_state != WaitState::WaitSem {
                continue;
            }
            if let Some(target) = task.wait_target {
                work.extend(self.sems.expect(target).holders.tasks().filter(|&h| h != id));
            }
        }
    }

    /// Returns the priority `task` is entitled to run at, given what it holds.
    pub(crate) fn demanded_priority(&self, task: TaskId) -> Priority {
        let mut priority = self.tasks.expect(task).base_priority;
        for (_, sem) in self.sems.iter() {
            if !sem.holders.contains(task) {
                continue;
            }

            if let Protocol::Protect { ceiling } = sem.protocol {
                priority = priority.max(ceiling);
            }

            for &waiter in &sem.waiters {
                if waiter != task {
                    priority = priority.max(self.tasks.expect(waiter).effective_priority);
                }
            }
        }
        priority
    }
}
