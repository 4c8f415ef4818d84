//! Critical sections.
//!
//! Every access to semaphore and task state made by this crate happens inside
//! a critical section: a region during which neither task preemption nor
//! interrupt handlers can run on the current processor. This is the *only*
//! mutual exclusion used by the semaphore core.
//!
//! How a critical section is entered is platform specific (on a single-core
//! system it is usually "save the interrupt flag and disable interrupts"), so
//! it is abstracted by the [`RawCriticalSection`] trait. This module also
//! provides [`Spinlock`], an implementation suitable for hosted builds and
//! tests, where "tasks" are threads and "interrupt handlers" are other threads
//! calling into the kernel.
use crate::loom::{
    cell::UnsafeCell,
    hint,
    sync::atomic::{AtomicBool, Ordering::*},
};
use core::fmt;

/// A raw critical section.
///
/// # Safety
///
/// Implementations must guarantee that, between a call to [`enter`] and the
/// matching call to [`leave`], no other call to [`enter`] on the same critical
/// section returns, from any task or interrupt handler.
///
/// Critical sections are never nested by this crate, and entering one must
/// never suspend the calling task: it may only defer preemption (or, on hosted
/// platforms, spin).
///
/// [`enter`]: RawCriticalSection::enter
/// [`leave`]: RawCriticalSection::leave
pub unsafe trait RawCriticalSection {
    /// State saved on entry and restored on exit, such as the interrupt flags
    /// of the processor.
    type Flags;

    /// Enters the critical section.
    fn enter(&self) -> Self::Flags;

    /// Leaves the critical section, restoring `flags`.
    ///
    /// # Safety
    ///
    /// This may only be called by the context that entered the critical
    /// section, with the flags returned by the matching call to
    /// [`enter`](RawCriticalSection::enter).
    unsafe fn leave(&self, flags: Self::Flags);
}

/// A spinning [`RawCriticalSection`].
///
/// This does not mask interrupts, so it is only appropriate when interrupt
/// handlers are modeled as other threads (hosted builds and tests), or on a
/// platform where the code calling into the kernel already runs with
/// interrupts disabled.
pub struct Spinlock {
    locked: AtomicBool,
}

/// Data that may only be accessed inside a critical section.
pub(crate) struct Protected<T, C> {
    cs: C,
    data: UnsafeCell<T>,
}

struct Section<'a, C: RawCriticalSection> {
    cs: &'a C,
    flags: Option<C::Flags>,
}

// === impl Spinlock ===

impl Spinlock {
    loom_const_fn! {
        /// Returns a new `Spinlock`, in the unlocked state.
        #[must_use]
        pub fn new() -> Self {
            Self {
                locked: AtomicBool::new(false),
            }
        }
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.locked.load(Relaxed)
    }
}

impl Default for Spinlock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Spinlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spinlock")
            .field("locked", &self.is_locked())
            .finish()
    }
}

unsafe impl RawCriticalSection for Spinlock {
    type Flags = ();

    #[cfg_attr(test, track_caller)]
    fn enter(&self) {
        while test_dbg!(self
            .locked
            .compare_exchange(false, true, Acquire, Acquire)
            .is_err())
        {
            while self.is_locked() {
                #[cfg(not(loom))]
                hint::spin_loop();
                #[cfg(loom)]
                crate::loom::thread::yield_now();
            }
        }
    }

    #[cfg_attr(test, track_caller)]
    #[inline]
    unsafe fn leave(&self, _: ()) {
        test_dbg!(self.locked.store(false, Release));
    }
}

// === impl Protected ===

impl<T, C: RawCriticalSection> Protected<T, C> {
    pub(crate) fn new(data: T, cs: C) -> Self {
        Self {
            cs,
            data: UnsafeCell::new(data),
        }
    }

    /// Runs `f` with exclusive access to the protected data, inside the
    /// critical section.
    #[cfg_attr(test, track_caller)]
    pub(crate) fn with<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
        let _section = Section {
            cs: &self.cs,
            flags: Some(self.cs.enter()),
        };
        self.data.with_mut(|data| unsafe {
            // Safety: we are inside the critical section, which guarantees
            // exclusive access, and `with` is never called re-entrantly from
            // within `f`.
            f(&mut *data)
        })
    }
}

impl<T, C: fmt::Debug> fmt::Debug for Protected<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protected")
            .field("cs", &self.cs)
            .finish_non_exhaustive()
    }
}

// Safety: the critical section provides exclusive access to `T`.
unsafe impl<T: Send, C: RawCriticalSection + Send> Send for Protected<T, C> {}
unsafe impl<T: Send, C: RawCriticalSection + Sync> Sync for Protected<T, C> {}

impl<C: RawCriticalSection> Drop for Section<'_, C> {
    fn drop(&mut self) {
        if let Some(flags) = self.flags.take() {
            unsafe {
                // Safety: `flags` came from the `enter` call that created this
                // section, in this context.
                self.cs.leave(flags)
            }
        }
    }
}
