//! Training module
//!
//! - [`trainer`]: epoch loop, Adam updates of the head, validation
//! - [`callbacks`]: early stopping and best-model checkpointing
//! - [`history`]: per-epoch metric series

pub mod callbacks;
pub mod history;
pub mod trainer;

pub use callbacks::{CallbackAction, EarlyStopping, ModelCheckpoint, Monitor, TrainingCallback};
pub use history::{EpochLogs, History};
pub use trainer::{compile, Trainer};
