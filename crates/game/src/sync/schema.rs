use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::document::{GameDocument, HOST_ID, PAYLOAD};
use super::error::SchemaError;

/// A game's payload shape, keyed by its versioned game id. Remote payloads are
/// normalized and decoded through this before any engine sees them.
pub trait GameSchema: Serialize + DeserializeOwned + Clone + Debug + PartialEq {
    const GAME_ID: &'static str;

    /// Repairs shapes the store is known to mangle, e.g. arrays turned into
    /// index-keyed objects.
    fn normalize(_payload: &mut Value) {}
}

pub fn decode_payload<P: GameSchema>(payload: &Value) -> Result<P, SchemaError> {
    let mut payload = payload.clone();
    P::normalize(&mut payload);
    serde_json::from_value(payload).map_err(|source| SchemaError::Decode {
        game_id: P::GAME_ID.to_string(),
        source,
    })
}

pub fn decode_document<P: GameSchema>(value: &Value) -> Result<GameDocument<P>, SchemaError> {
    if value.get(HOST_ID).is_none_or(Value::is_null) {
        return Err(SchemaError::MissingField(HOST_ID));
    }
    let raw_payload = value.get(PAYLOAD).ok_or(SchemaError::MissingField(PAYLOAD))?;
    let payload = decode_payload::<P>(raw_payload)?;

    let mut header = value.clone();
    if let Value::Object(fields) = &mut header {
        fields.insert(PAYLOAD.to_string(), Value::Null);
    }
    let header: GameDocument<Option<()>> =
        serde_json::from_value(header).map_err(|source| SchemaError::Decode {
            game_id: P::GAME_ID.to_string(),
            source,
        })?;

    Ok(GameDocument {
        host_id: header.host_id,
        players: header.players,
        payload,
        last_updated: header.last_updated,
    })
}

pub fn encode_document<P: GameSchema>(document: &GameDocument<P>) -> Result<Value, serde_json::Error> {
    serde_json::to_value(document)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::sync::document::normalize_array_at;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Cells {
        cells: Vec<Option<u8>>,
    }

    impl GameSchema for Cells {
        const GAME_ID: &'static str = "cells_v1";

        fn normalize(payload: &mut Value) {
            normalize_array_at(payload, "cells", 4);
        }
    }

    #[test]
    fn decode_repairs_sparse_arrays() {
        let raw = json!({
            "hostId": "a",
            "players": { "a": { "role": "host", "lastSeen": 3 } },
            "payload": { "cells": { "2": 7 } },
            "lastUpdated": 3
        });

        let document = decode_document::<Cells>(&raw).unwrap();
        assert_eq!(document.payload.cells, vec![None, None, Some(7), None]);
        assert_eq!(document.last_updated, 3);
        assert_eq!(document.players.len(), 1);
    }

    #[test]
    fn missing_host_is_rejected() {
        let raw = json!({ "payload": { "cells": [] } });
        assert!(matches!(
            decode_document::<Cells>(&raw),
            Err(SchemaError::MissingField("hostId"))
        ));
    }

    #[test]
    fn encode_then_decode_keeps_header() {
        let document = GameDocument::new(
            crate::sync::ParticipantId::new("a"),
            Cells {
                cells: vec![Some(1), None, None, None],
            },
            10,
        );
        let value = encode_document(&document).unwrap();
        assert_eq!(value["hostId"], json!("a"));
        assert_eq!(decode_document::<Cells>(&value).unwrap(), document);
    }
}
