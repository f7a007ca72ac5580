//! # Axon Core
//!
//! Core traits, error types, and shared functionality for the Axon ecosystem.
//! This crate provides the foundational components that the other Axon crates
//! depend on.
//!
//! ## Features
//!
//! - **Error Handling**: Standardized error types and result aliases
//! - **Identity**: Common identity and validation trait definitions
//!
//! ## Quick Start
//!
//! ```rust
//! use axon_core::{AxonResult, AxonError};
//!
//! fn example_function() -> AxonResult<String> {
//!     Ok("Hello Axon!".to_string())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;

// Re-export commonly used items
pub use error::{AxonError, AxonResult};
pub use traits::{Identifiable, Validatable};

/// Version information for the Axon Core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of the Axon Core library
pub const NAME: &str = env!("CARGO_PKG_NAME");
