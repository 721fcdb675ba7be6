use crate::error::CodecError;
use crate::model::Channel;
use serde::{Serialize, de::DeserializeOwned};

/// A binary record that travels on one of a peer link's data channels.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn channel(&self) -> Channel;

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(postcard::to_allocvec(self)?)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(postcard::from_bytes(bytes)?)
    }
}
