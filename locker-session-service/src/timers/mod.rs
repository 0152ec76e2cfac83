//! Session timer engine: scheduling, expiry and completion.

mod completion;
mod manager;
mod registry;
pub mod schedule;

pub use completion::{CompletionHandler, CompletionOutcome, CompletionTrigger};
pub use manager::{RestoreReport, SessionTimerManager, TimerOutcome};
pub use registry::TimerRegistry;
