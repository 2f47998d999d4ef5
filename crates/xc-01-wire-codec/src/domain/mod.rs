//! # Domain Layer
//!
//! Message structs, command ids and the per-kind field layouts.

pub mod errors;
pub mod fields;
pub mod messages;

pub use errors::DecodeError;
pub use fields::{encoded_len, offset_of, Bound, FieldKind, FieldSpec, HEADER_LEN};
pub use messages::*;
