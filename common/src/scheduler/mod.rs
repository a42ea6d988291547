// Scheduler module: the scheduling pass and the minute driver that runs it

pub mod driver;
pub mod engine;

pub use driver::{delay_until_next_minute, MinuteDriver};
pub use engine::{CronDispatcher, PassOutcome, PassSummary, SchedulerConfig, SchedulingPass};
