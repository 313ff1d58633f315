pub mod batcher;
pub mod timestamp;

pub use batcher::{batch_of, write_bursts, BurstBatcher, BurstSummary};
pub use timestamp::ObservationClock;
