//! Request payload checks for creating and updating devices.
//!
//! Payload fields are kept as raw JSON values so that a wrongly typed field
//! is reported against that field instead of failing the whole body.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{Device, DeviceType, DeviceUpdate};

/// Field name to message, one entry per failing field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    /// The error reported when the body is not a JSON object
    pub fn body() -> Self {
        let mut errors = Self::default();
        errors.add("body", "Invalid JSON body");
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.insert(field.to_string(), message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
impl ValidationErrors {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Body of a create or update request.
///
/// A key that is present with a `null` value is kept as `Some(Value::Null)`
/// so the update check can tell "name sent" from "name absent".
#[derive(Debug, Default, Deserialize)]
pub struct DevicePayload {
    #[serde(default, deserialize_with = "present")]
    pub name: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub ip: Option<Value>,
    #[serde(default, rename = "type", deserialize_with = "present")]
    pub device_type: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub location: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl DevicePayload {
    /// Parse a raw request body, which must be a JSON object
    pub fn from_json(body: &[u8]) -> Result<Self, ValidationErrors> {
        match serde_json::from_slice::<Value>(body) {
            Ok(value @ Value::Object(_)) => {
                serde_json::from_value(value).map_err(|_| ValidationErrors::body())
            }
            _ => Err(ValidationErrors::body()),
        }
    }
}

/// Check a create payload and return the trimmed device to insert
pub fn validate_create(payload: &DevicePayload) -> Result<Device, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let name = non_empty_text(payload.name.as_ref());
    if name.is_none() {
        errors.add("name", "name is required and must be a non-empty string");
    }

    let fields = check_mutable_fields(payload, &mut errors);

    match (name, fields) {
        (Some(name), Some(update)) if errors.is_empty() => Ok(Device {
            name: name.to_string(),
            ip: update.ip,
            device_type: update.device_type,
            location: update.location,
        }),
        _ => Err(errors),
    }
}

/// Check an update payload. The device name comes from the path and can
/// never be changed, so any `name` key in the body is rejected.
pub fn validate_update(payload: &DevicePayload) -> Result<DeviceUpdate, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let fields = check_mutable_fields(payload, &mut errors);

    if payload.name.is_some() {
        errors.add("name", "name cannot be updated");
    }

    match fields {
        Some(update) if errors.is_empty() => Ok(update),
        _ => Err(errors),
    }
}

fn check_mutable_fields(
    payload: &DevicePayload,
    errors: &mut ValidationErrors,
) -> Option<DeviceUpdate> {
    let ip = match non_empty_text(payload.ip.as_ref()) {
        None => {
            errors.add("ip", "ip is required and must be a non-empty string");
            None
        }
        Some(ip) if ip.parse::<IpAddr>().is_err() => {
            errors.add("ip", "ip must be a valid IPv4/IPv6 address");
            None
        }
        Some(ip) => Some(ip),
    };

    let device_type = match payload.device_type.as_ref() {
        Some(Value::String(s)) => s.parse::<DeviceType>().ok(),
        _ => None,
    };
    if device_type.is_none() {
        errors.add("type", allowed_types_message());
    }

    let location = non_empty_text(payload.location.as_ref());
    if location.is_none() {
        errors.add(
            "location",
            "location is required and must be a non-empty string",
        );
    }

    Some(DeviceUpdate {
        ip: ip?.to_string(),
        device_type: device_type?,
        location: location?.to_string(),
    })
}

/// A string value with surrounding whitespace removed, if anything is left
fn non_empty_text(value: Option<&Value>) -> Option<&str> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim()),
        _ => None,
    }
}

fn allowed_types_message() -> String {
    let mut names: Vec<&str> = DeviceType::ALL.iter().map(DeviceType::as_str).collect();
    names.sort_unstable();
    let quoted: Vec<String> = names.iter().map(|n| format!("'{}'", n)).collect();
    format!("type must be one of [{}]", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> DevicePayload {
        DevicePayload::from_json(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_validate_create_success_ipv4() {
        let device = validate_create(&payload(json!({
            "name": "r1",
            "ip": "192.168.1.10",
            "type": "Router",
            "location": "rack-a"
        })))
        .unwrap();

        assert_eq!(device.name, "r1");
        assert_eq!(device.ip, "192.168.1.10");
        assert_eq!(device.device_type, DeviceType::Router);
        assert_eq!(device.location, "rack-a");
    }

    #[test]
    fn test_validate_create_success_ipv6_and_trims() {
        let device = validate_create(&payload(json!({
            "name": "  core-1 ",
            "ip": " fe80::1 ",
            "type": "Server",
            "location": "\tdc-2\n"
        })))
        .unwrap();

        assert_eq!(device.name, "core-1");
        assert_eq!(device.ip, "fe80::1");
        assert_eq!(device.location, "dc-2");
    }

    #[test]
    fn test_validate_create_reports_every_field() {
        let errors = validate_create(&payload(json!({
            "name": "   ",
            "ip": "999.999.1.1",
            "type": "Unknown",
            "location": ""
        })))
        .unwrap_err();

        assert_eq!(errors.len(), 4);
        assert!(errors.contains("name"));
        assert_eq!(errors.get("ip"), Some("ip must be a valid IPv4/IPv6 address"));
        assert_eq!(
            errors.get("type"),
            Some("type must be one of ['Router', 'Server', 'Switch']")
        );
        assert!(errors.contains("location"));
    }

    #[test]
    fn test_validate_create_missing_fields() {
        let errors = validate_create(&payload(json!({}))).unwrap_err();

        assert_eq!(errors.len(), 4);
        assert_eq!(
            errors.get("ip"),
            Some("ip is required and must be a non-empty string")
        );
    }

    #[test]
    fn test_validate_create_wrong_value_types() {
        let errors = validate_create(&payload(json!({
            "name": 42,
            "ip": ["10.0.0.1"],
            "type": null,
            "location": {"rack": 1}
        })))
        .unwrap_err();

        assert_eq!(errors.len(), 4);
        assert_eq!(
            errors.get("ip"),
            Some("ip is required and must be a non-empty string")
        );
    }

    #[test]
    fn test_validate_create_single_bad_field() {
        let errors = validate_create(&payload(json!({
            "name": "sw1",
            "ip": "10.0.0.2",
            "type": "switch",
            "location": "dc"
        })))
        .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert!(errors.contains("type"));
    }

    #[test]
    fn test_body_must_be_object() {
        let bodies: [&[u8]; 5] = [b"not json", b"", b"[1, 2]", b"\"text\"", b"null"];
        for body in bodies {
            let errors = DevicePayload::from_json(body).unwrap_err();
            assert_eq!(errors, ValidationErrors::body());
            assert_eq!(errors.len(), 1);
        }
    }

    #[test]
    fn test_validate_update_success() {
        let update = validate_update(&payload(json!({
            "ip": "10.0.0.5",
            "type": "Server",
            "location": " dc-1 "
        })))
        .unwrap();

        assert_eq!(update.ip, "10.0.0.5");
        assert_eq!(update.device_type, DeviceType::Server);
        assert_eq!(update.location, "dc-1");
    }

    #[test]
    fn test_validate_update_rejects_name_change() {
        let errors = validate_update(&payload(json!({
            "ip": "10.0.0.5",
            "type": "Server",
            "location": "dc-1",
            "name": "newname"
        })))
        .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors.get("name"), Some("name cannot be updated"));
    }

    #[test]
    fn test_validate_update_rejects_null_name() {
        let errors = validate_update(&payload(json!({
            "ip": "10.0.0.5",
            "type": "Server",
            "location": "dc-1",
            "name": null
        })))
        .unwrap_err();

        assert!(errors.contains("name"));
    }

    #[test]
    fn test_validate_update_collects_errors() {
        let errors = validate_update(&payload(json!({
            "ip": "",
            "type": "X",
            "location": ""
        })))
        .unwrap_err();

        assert_eq!(errors.len(), 3);
        assert!(!errors.contains("name"));
    }

    #[test]
    fn test_validation_errors_serialize_as_map() {
        let mut errors = ValidationErrors::default();
        errors.add("ip", "bad");
        assert_eq!(serde_json::to_value(&errors).unwrap(), json!({"ip": "bad"}));
    }
}
