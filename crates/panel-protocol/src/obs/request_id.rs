//! Request ids and the `requestId` field of outgoing requests.

use serde_json::Value;
use uuid::Uuid;

use super::parse_object;
use crate::error::ProtocolError;

/// A random version 4 UUID, as 32 lowercase hex digits.
pub fn generate_request_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Insert a fresh `d.requestId` into `request` and return the new payload
/// together with the id.
pub fn tag_request(request: &str) -> Result<(String, String), ProtocolError> {
    let mut envelope = parse_object(request)?;
    let data = envelope
        .get_mut("d")
        .ok_or_else(|| ProtocolError::missing("d"))?
        .as_object_mut()
        .ok_or(ProtocolError::NotAnObject)?;

    let request_id = generate_request_id();
    data.insert("requestId".into(), Value::String(request_id.clone()));
    let payload = serde_json::to_string(&envelope)?;
    Ok((payload, request_id))
}

/// [`tag_request`] without the id.
pub fn add_request_id(request: &str) -> Result<String, ProtocolError> {
    tag_request(request).map(|(payload, _)| payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_v4_hex() {
        let id = generate_request_id();
        assert_eq!(id.len(), 32);
        assert!(id.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
        // Version nibble and variant bits.
        assert_eq!(&id[12..13], "4");
        assert!(matches!(&id[16..17], "8" | "9" | "a" | "b"));
        assert_ne!(id, generate_request_id());
    }

    #[test]
    fn tagging_inserts_the_returned_id() {
        let request = r#"{"op":6,"d":{"requestType":"ToggleRecord"}}"#;
        let (payload, id) = tag_request(request).unwrap();
        let value: Value = serde_json::from_str(&payload).unwrap();

        assert_eq!(value["op"], 6);
        assert_eq!(value["d"]["requestType"], "ToggleRecord");
        assert_eq!(value["d"]["requestId"], id.as_str());
    }

    #[test]
    fn existing_id_is_replaced() {
        let tagged = add_request_id(r#"{"op":6,"d":{"requestId":"old"}}"#).unwrap();
        let value: Value = serde_json::from_str(&tagged).unwrap();
        assert_ne!(value["d"]["requestId"], "old");
    }

    #[test]
    fn request_needs_a_data_object() {
        assert!(matches!(
            add_request_id(r#"{"op":6}"#),
            Err(ProtocolError::MissingField { .. })
        ));
        assert!(matches!(
            add_request_id(r#"{"op":6,"d":[]}"#),
            Err(ProtocolError::NotAnObject)
        ));
        assert!(add_request_id("not json").is_err());
    }
}
