pub mod validate;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kinds of devices the inventory accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    Router,
    Switch,
    Server,
}

impl DeviceType {
    pub const ALL: [DeviceType; 3] = [DeviceType::Router, DeviceType::Switch, DeviceType::Server];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Router => "Router",
            DeviceType::Switch => "Switch",
            DeviceType::Server => "Server",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown device type '{}'", s))
    }
}

/// A named network endpoint in the inventory.
///
/// This is also the public representation: the storage row id never
/// leaves the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub ip: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub location: String,
}

/// The mutable part of a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceUpdate {
    pub ip: String,
    pub device_type: DeviceType,
    pub location: String,
}
