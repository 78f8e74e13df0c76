pub mod config;
pub mod error;
pub mod format;
pub mod levels;
pub mod recording_result;
pub mod state;
