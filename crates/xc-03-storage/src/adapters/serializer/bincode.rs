use crate::domain::errors::SerializationError;
use crate::ports::outbound::StateSerializer;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Default serializer using bincode.
#[derive(Default, Clone, Copy, Debug)]
pub struct BincodeSerializer;

impl StateSerializer for BincodeSerializer {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, SerializationError> {
        bincode::serialize(value).map_err(|e| SerializationError {
            message: e.to_string(),
        })
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, SerializationError> {
        bincode::deserialize(data).map_err(|e| SerializationError {
            message: e.to_string(),
        })
    }
}
