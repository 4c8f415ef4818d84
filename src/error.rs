/// Errors returned by semaphore operations.
///
/// This is a closed set. Violations of the kernel's own invariants are not
/// represented here; those panic.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// An argument was out of range, referred to a semaphore or task that does
    /// not exist, or requested a protocol change that is not allowed in the
    /// semaphore's current state.
    #[error("invalid argument")]
    InvalidArgument,

    /// The semaphore had no units available and the operation does not wait.
    #[error("operation would block")]
    WouldBlock,

    /// The wait was cancelled by a signal delivered to the waiting task.
    #[error("wait interrupted by a signal")]
    Interrupted,

    /// The wait was cancelled because its deadline elapsed.
    #[error("wait timed out")]
    TimedOut,

    /// The wait ended because the semaphore was [reset](crate::Kernel::reset).
    ///
    /// The semaphore was *not* acquired.
    #[error("semaphore was reset while waiting")]
    Reset,

    /// The semaphore is still held or waited on, or the task table is full.
    #[error("resource busy")]
    Busy,

    /// Posting would exceed [`SEM_VALUE_MAX`](crate::SEM_VALUE_MAX).
    #[error("semaphore count overflow")]
    Overflow,
}
