//! Periodic background tasks: the cron-driven renewal sweep and the
//! task-log history purge.

pub mod cleanup_scheduler;
pub mod renewal_scheduler;

pub use cleanup_scheduler::CleanupScheduler;
pub use renewal_scheduler::RenewalScheduler;
