//! Edit history — undo/redo timelines for editing sessions

pub mod manager;
pub mod types;

pub use manager::HistoryManager;
pub use types::{EditSession, ImageState};
