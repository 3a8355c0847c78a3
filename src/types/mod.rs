//! Shared types for the Easel client core

pub mod error;

pub use error::{EaselError, Result};
