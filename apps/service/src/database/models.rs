use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::monitoring::types::{HostId, ProbeOutcome};

/// Kind of device a host is, as picked in the edit form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HostType {
    Notebook,
    Desktop,
    Server,
    Printer,
    Router,
    Other,
}

impl HostType {
    pub const ALL: [HostType; 6] = [
        HostType::Notebook,
        HostType::Desktop,
        HostType::Server,
        HostType::Printer,
        HostType::Router,
        HostType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HostType::Notebook => "NOTEBOOK",
            HostType::Desktop => "DESKTOP",
            HostType::Server => "SERVER",
            HostType::Printer => "PRINTER",
            HostType::Router => "ROUTER",
            HostType::Other => "OTHER",
        }
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HostType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| s.trim().to_string())
    }
}

/// A registered host with its latest probe outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub id: HostId,
    pub address: String,
    pub segment: String,
    pub alias: Option<String>,
    pub host_name: Option<String>,
    pub host_type: Option<HostType>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    /// None until the first pass that saw this host
    pub last_probe: Option<ProbeOutcome>,
}

/// Input for registering a host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewHost {
    pub address: String,
    #[serde(default)]
    pub alias: Option<String>,
}

impl NewHost {
    pub fn new(address: impl Into<String>, alias: Option<&str>) -> Self {
        Self { address: address.into(), alias: alias.map(str::to_string) }
    }
}

/// User editable metadata. Blank strings clear the field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostDetails {
    pub alias: String,
    pub host_name: String,
    pub host_type: String,
    pub location: String,
    pub notes: String,
}

/// Trim and turn blank input into None
pub fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() { None } else { Some(value.to_string()) }
}

/// Convert a timestamp to unix milliseconds for storage
pub fn timestamp_to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Convert stored unix milliseconds back to a timestamp
pub fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
