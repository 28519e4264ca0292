pub mod config;
pub mod job;
pub mod outcome;

pub use config::DaemonConfig;
pub use job::{Job, JobStatus, NewJob};
pub use outcome::{FetchOutcome, FetchTrigger};
