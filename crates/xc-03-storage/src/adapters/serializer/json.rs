use crate::domain::errors::SerializationError;
use crate::ports::outbound::StateSerializer;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Human-readable serializer, handy when inspecting a data directory.
#[derive(Default, Clone, Copy, Debug)]
pub struct JsonSerializer;

impl StateSerializer for JsonSerializer {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, SerializationError> {
        serde_json::to_vec(value).map_err(|e| SerializationError {
            message: e.to_string(),
        })
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, SerializationError> {
        serde_json::from_slice(data).map_err(|e| SerializationError {
            message: e.to_string(),
        })
    }
}
