//! Serializer adapters.

mod bincode;
mod json;

pub use self::bincode::BincodeSerializer;
pub use json::JsonSerializer;
