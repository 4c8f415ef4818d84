#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg, doc_cfg_hide))]
#![cfg_attr(docsrs, doc(cfg_hide(docsrs, loom)))]
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs, missing_debug_implementations)]

extern crate alloc;

pub(crate) mod loom;

#[macro_use]
pub(crate) mod util;

pub mod cancel;
pub mod config;
pub mod critical;
mod error;
pub mod holder;
mod kernel;
pub mod sched;
pub mod semaphore;
pub mod task;
pub mod timed;
pub mod wait;

#[doc(inline)]
pub use self::cancel::CancelReason;
#[doc(inline)]
pub use self::config::Config;
#[doc(inline)]
pub use self::critical::{RawCriticalSection, Spinlock};
pub use self::error::Error;
pub use self::kernel::Kernel;
#[doc(inline)]
pub use self::sched::Scheduler;
#[doc(inline)]
pub use self::semaphore::{Protocol, SemId, SEM_VALUE_MAX};
#[doc(inline)]
pub use self::task::{Priority, TaskId, WaitState};
#[doc(inline)]
pub use self::timed::{Ticks, Timer};
