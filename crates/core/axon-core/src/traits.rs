//! Core traits for the Axon ecosystem.
//!
//! This module defines fundamental traits that provide common interfaces
//! across all Axon components.

use crate::AxonResult;
use uuid::Uuid;

/// Trait for objects with unique identities
pub trait Identifiable {
    /// Get the unique identifier for this object
    fn id(&self) -> Uuid;

    /// Get a human-readable name
    fn name(&self) -> String;

    /// Get the type identifier
    fn type_name(&self) -> &'static str;
}

/// Trait for validatable objects
pub trait Validatable {
    /// Validate this object
    fn validate(&self) -> AxonResult<()>;

    /// Check if this object is valid
    fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}
