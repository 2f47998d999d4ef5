//! # Domain Layer
//!
//! Row shapes, key layout and errors for the storage service.

pub mod entities;
pub mod errors;
pub mod keys;

pub use entities::*;
pub use errors::*;
