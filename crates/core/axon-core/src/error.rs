//! Error handling types and utilities for the Axon ecosystem.
//!
//! This module provides standardized error types that are used throughout
//! all Axon crates to ensure consistent error handling patterns.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The main error type for the Axon ecosystem.
///
/// This enum provides the error variants shared by all Axon components.
/// Crate-local error types convert into `AxonError` at crate boundaries.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxonError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid input parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Operation not permitted in the current state
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Internal system errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic application errors with context
    #[error("Application error: {message} (context: {context})")]
    Application {
        /// Error message
        message: String,
        /// Error context
        context: String,
    },
}

impl AxonError {
    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Self::Configuration(msg.to_string())
    }

    /// Create a new invalid input error
    pub fn invalid_input<T: fmt::Display>(msg: T) -> Self {
        Self::InvalidInput(msg.to_string())
    }

    /// Create a new not found error
    pub fn not_found<T: fmt::Display>(msg: T) -> Self {
        Self::NotFound(msg.to_string())
    }

    /// Create a new illegal state error
    pub fn illegal_state<T: fmt::Display>(msg: T) -> Self {
        Self::IllegalState(msg.to_string())
    }

    /// Create a new timeout error
    pub fn timeout<T: fmt::Display>(msg: T) -> Self {
        Self::Timeout(msg.to_string())
    }

    /// Create a new internal error
    pub fn internal<T: fmt::Display>(msg: T) -> Self {
        Self::Internal(msg.to_string())
    }

    /// Create a new application error with context
    pub fn application<M: fmt::Display, C: fmt::Display>(message: M, context: C) -> Self {
        Self::Application {
            message: message.to_string(),
            context: context.to_string(),
        }
    }

    /// Returns true if the error was caused by invalid caller input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::NotFound(_) | Self::IllegalState(_)
        )
    }

    /// Returns true if retrying the operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result type alias using `AxonError`
pub type AxonResult<T> = Result<T, AxonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let err = AxonError::invalid_input("bad path");
        assert_eq!(err, AxonError::InvalidInput("bad path".to_string()));
        assert_eq!(err.to_string(), "Invalid input: bad path");
    }

    #[test]
    fn test_application_error_display() {
        let err = AxonError::application("boom", "worker");
        assert_eq!(err.to_string(), "Application error: boom (context: worker)");
    }

    #[test]
    fn test_error_classification() {
        assert!(AxonError::invalid_input("x").is_client_error());
        assert!(AxonError::illegal_state("x").is_client_error());
        assert!(!AxonError::internal("x").is_client_error());
        assert!(AxonError::timeout("x").is_retryable());
        assert!(!AxonError::not_found("x").is_retryable());
    }
}
