// Transcription job pipeline: storage and scheduling
pub mod scheduler;
pub mod store;

pub use scheduler::{JobEvent, JobHandle, JobScheduler, SchedulerOptions};
pub use store::{Database, JobStore};
