//! Kernel-wide limits for the semaphore core.

/// Limits applied by a [`Kernel`](crate::Kernel).
///
/// A `Config` is constructed with [`Config::new`] (or [`Default`]) and then
/// adjusted with the builder-style `with_*` methods:
///
/// ```
/// use mycelium_sem::Config;
///
/// const CONFIG: Config = Config::new().with_max_holders(4).with_max_tasks(32);
/// assert_eq!(CONFIG.max_holders(), 4);
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Config {
    max_holders: usize,
    max_tasks: usize,
}

impl Config {
    /// The default bound on holder entries tracked per semaphore.
    pub const DEFAULT_MAX_HOLDERS: usize = 16;

    /// The default bound on the number of live tasks.
    pub const DEFAULT_MAX_TASKS: usize = 256;

    /// Returns a new `Config` with the default limits.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_holders: Self::DEFAULT_MAX_HOLDERS,
            max_tasks: Self::DEFAULT_MAX_TASKS,
        }
    }

    /// Sets the maximum number of holders tracked for each semaphore.
    ///
    /// When an [`Inherit`] semaphore's holder table is full, further
    /// acquisitions still succeed, but the acquiring task does not take part
    /// in priority inheritance for that semaphore. [`Protect`] semaphores are
    /// not bounded by this limit, since every holder must run at the ceiling.
    ///
    /// [`Inherit`]: crate::Protocol::Inherit
    /// [`Protect`]: crate::Protocol::Protect
    #[must_use]
    pub const fn with_max_holders(self, max_holders: usize) -> Self {
        Self {
            max_holders,
            ..self
        }
    }

    /// Sets the maximum number of live tasks.
    ///
    /// # Panics
    ///
    /// If `max_tasks` is zero or does not fit in a [`TaskId`](crate::TaskId).
    #[must_use]
    pub const fn with_max_tasks(self, max_tasks: usize) -> Self {
        assert!(max_tasks > 0, "a kernel must allow at least one task");
        assert!(
            max_tasks <= u16::MAX as usize,
            "task ids are 16 bits wide"
        );
        Self { max_tasks, ..self }
    }

    /// Returns the maximum number of holders tracked for each semaphore.
    #[must_use]
    pub const fn max_holders(&self) -> usize {
        self.max_holders
    }

    /// Returns the maximum number of live tasks.
    #[must_use]
    pub const fn max_tasks(&self) -> usize {
        self.max_tasks
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
