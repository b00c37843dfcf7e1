//! featx Core - batch audio feature extraction
//!
//! Drives analysis plugins over decoded audio in a single synchronized pass,
//! shares plugin instances between compatible transforms, and routes the
//! resulting feature streams (and optional statistical summaries) to writers.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod engine;
pub mod plugin;
pub mod transform;
pub mod types;
pub mod writer;

pub use engine::{ExtractionError, ExtractionManager, RegistrationError, RunReport};
pub use transform::{SummaryType, Transform, WindowType};
pub use types::*;
