//! MessagePack codec helpers.
//!
//! Every payload crossing the proxy/world boundary is MessagePack. Structs
//! are encoded with field names so either side can add optional fields
//! without breaking the other during a rolling reload.

use serde::{Deserialize, Serialize};

use crate::error::NetError;

/// Encode a value to MessagePack bytes (named fields).
///
/// # Errors
///
/// Returns [`NetError::Encode`] if serialisation fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, NetError> {
    rmp_serde::to_vec_named(value).map_err(NetError::Encode)
}

/// Decode a value from MessagePack bytes.
///
/// # Errors
///
/// Returns [`NetError::Decode`] if deserialisation fails.
pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, NetError> {
    rmp_serde::from_slice(bytes).map_err(NetError::Decode)
}

#[cfg(test)]
mod tests {
    use mud_entity::EntityId;

    use super::*;
    use crate::messages::{RpcReply, SendInputThroughEntity};

    #[test]
    fn test_request_survives_codec() {
        let msg = SendInputThroughEntity {
            entity_id: EntityId(7),
            text: "look/quiet ship".to_string(),
        };
        let bytes = encode(&msg).unwrap();
        let restored: SendInputThroughEntity = decode(&bytes).unwrap();
        assert_eq!(restored.entity_id, EntityId(7));
        assert_eq!(restored.text, "look/quiet ship");
    }

    #[test]
    fn test_error_reply_survives_codec() {
        let reply: RpcReply<EntityId> = RpcReply::error(
            mud_entity::ErrorKind::NotFound,
            "no such entity #9".to_string(),
        );
        let bytes = encode(&reply).unwrap();
        let restored: RpcReply<EntityId> = decode(&bytes).unwrap();
        let err = restored.into_result().unwrap_err();
        assert_eq!(err.kind, mud_entity::ErrorKind::NotFound);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result: Result<SendInputThroughEntity, _> = decode(&[0xC1]);
        assert!(result.is_err());
    }
}
