//! Internal utilities.

#[cfg(not(test))]
macro_rules! test_dbg {
    ($e:expr) => {
        $e
    };
}

#[cfg(test)]
macro_rules! test_dbg {
    ($e:expr) => {
        match $e {
            e => {
                tracing::trace!(
                    location = %core::panic::Location::caller(),
                    "{} = {:?}",
                    stringify!($e),
                    &e
                );
                e
            }
        }
    };
}

/// Reports a violated kernel invariant.
///
/// These indicate a defect in the caller or in this crate, never a runtime
/// condition that can be propagated, so they always panic, in release builds
/// too.
macro_rules! kernel_assert {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            tracing::error!(condition = stringify!($cond), $($arg)+);
            panic!($($arg)+);
        }
    };
}

/// Defines a `const fn` that is not `const` when loom is enabled, because
/// loom's atomics cannot be constructed in a const context.
macro_rules! loom_const_fn {
    (
        $(#[$meta:meta])*
        $vis:vis fn $name:ident($($arg:ident: $T:ty),*) -> $Ret:ty $body:block
    ) => {
        $(#[$meta])*
        #[cfg(not(loom))]
        $vis const fn $name($($arg: $T),*) -> $Ret $body

        $(#[$meta])*
        #[cfg(loom)]
        $vis fn $name($($arg: $T),*) -> $Ret $body
    };
}
