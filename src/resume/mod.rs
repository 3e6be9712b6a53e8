//! Checkpoint persistence for resumable fetching
//!
//! One process-wide JSON file maps `"{instrument}_{interval}"` keys to the
//! exclusive end (milliseconds) of the last chunk that was durably merged.
//! The file is read once at startup and rewritten atomically after every chunk.

pub mod key;
pub mod lock;
pub mod state;

pub use key::SeriesKey;
pub use lock::RunLock;
pub use state::{load_checkpoints, save_checkpoints, CheckpointMap, CheckpointStore, ResumeError};
