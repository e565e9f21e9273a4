use bytes::Bytes;
use fleetcache_core::Raw;
use serde::{Serialize, de::DeserializeOwned};

use super::{Format, FormatError, FormatTypeId};

/// Bincode format, serde compatible, `standard` configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeFormat;

impl Format for BincodeFormat {
    fn encode<T>(&self, value: &T) -> Result<Raw, FormatError>
    where
        T: Serialize + ?Sized,
    {
        ::bincode::serde::encode_to_vec(value, ::bincode::config::standard())
            .map(Bytes::from)
            .map_err(|err| FormatError::Serialize(Box::new(err)))
    }

    fn decode<T>(&self, data: &[u8]) -> Result<T, FormatError>
    where
        T: DeserializeOwned,
    {
        ::bincode::serde::decode_from_slice(data, ::bincode::config::standard())
            .map(|(value, _read)| value)
            .map_err(|err| FormatError::Deserialize(Box::new(err)))
    }

    fn format_type_id(&self) -> FormatTypeId {
        FormatTypeId::Bincode
    }
}
