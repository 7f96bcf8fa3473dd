//! Background job scheduling and execution.
//!
//! Jobs are registered with a cron expression from the settings table and
//! executed by an in-process scheduler loop; a `SchedulerHandle` supports
//! manual one-shot triggering from the CLI.

pub mod context;
mod handle;
mod job;
pub mod jobs;
mod scheduler;

pub use context::JobContext;
pub use handle::{JobInfo, SchedulerHandle};
pub use job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior};
pub use scheduler::{create_scheduler, JobScheduler};
