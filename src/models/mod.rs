// Persisted records: jobs, results, audio sources, model descriptors
pub mod audio;
pub mod descriptor;
pub mod job;

pub use audio::*;
pub use descriptor::*;
pub use job::*;
