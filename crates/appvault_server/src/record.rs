//! CBOR encoding of persisted records.

use crate::error::{ServerError, ServerResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub(crate) fn encode<T: Serialize>(value: &T) -> ServerResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| ServerError::Internal(format!("record encode: {e}")))?;
    Ok(buf)
}

pub(crate) fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> ServerResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ServerError::Corrupted(format!("{key}: {e}")))
}
