//! Utility modules for the notetodo monitor.
//!
//! # Modules
//!
//! - [`debounce`]: Per-key cancellable delay for coalescing rapid file system events

pub mod debounce;

pub use debounce::{Debouncer, DebouncerError, DEFAULT_DEBOUNCE_MS};
