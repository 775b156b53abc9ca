use crate::error::{FailureKind, OperationFailure};
use crate::WipeLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Storage medium as reported by the Engine's `--get-drive-info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    HDD,
    SSD,
    SCM,
    Removable,
    Unspecified,
    Other(String),
}

impl MediaType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "HDD" => MediaType::HDD,
            "SSD" => MediaType::SSD,
            "SCM" => MediaType::SCM,
            "REMOVABLE" | "REMOVABLE MEDIA" => MediaType::Removable,
            "" | "UNSPECIFIED" | "UNKNOWN" => MediaType::Unspecified,
            _ => MediaType::Other(raw.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveAttributes {
    pub is_removable: bool,
    pub is_operating_system_volume: bool,
    pub media_type: MediaType,
    pub bus_type: String,
}

/// Drive snapshot taken right before an operation. Never cached across
/// operations: removable media can be swapped between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveDescriptor {
    /// Volume root, e.g. `E:\` or `/media/usb0`
    pub id: String,
    pub attributes: DriveAttributes,
    pub queried_at: DateTime<Utc>,
}

// Field names used by the Engine's drive-info payload
#[derive(Debug, Deserialize)]
struct RawDriveInfo {
    #[serde(rename = "IsRemovable", default)]
    is_removable: bool,
    #[serde(rename = "IsOS", alias = "IsOperatingSystem", default)]
    is_os: bool,
    #[serde(rename = "MediaType", default)]
    media_type: Option<Value>,
    #[serde(rename = "BusType", default)]
    bus_type: Option<Value>,
}

fn value_to_label(value: Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

impl DriveDescriptor {
    /// Build a descriptor from a `--get-drive-info` payload.
    ///
    /// Accepts both `{success, data: {...}}` and a bare attribute object.
    pub fn from_engine_payload(drive_id: &str, payload: Value) -> Result<Self, OperationFailure> {
        if payload.get("success").and_then(Value::as_bool) == Some(false) {
            let message = payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("drive info unavailable");
            return Err(OperationFailure::new(FailureKind::EngineRejected, message)
                .with_raw_output(payload.to_string()));
        }

        let data = payload.get("data").cloned().unwrap_or(payload);
        let raw: RawDriveInfo = serde_json::from_value(data.clone()).map_err(|e| {
            OperationFailure::new(FailureKind::ParseError, format!("drive info: {}", e))
                .with_raw_output(data.to_string())
        })?;

        Ok(Self {
            id: drive_id.to_string(),
            attributes: DriveAttributes {
                is_removable: raw.is_removable,
                is_operating_system_volume: raw.is_os,
                media_type: MediaType::parse(&value_to_label(raw.media_type)),
                bus_type: value_to_label(raw.bus_type),
            },
            queried_at: Utc::now(),
        })
    }

    pub fn recommended_level(&self) -> WipeLevel {
        select_level(&self.attributes)
    }
}

/// Pick the erasure level for a drive.
///
/// Pure: only the two flags matter, media and bus type never do. Level 5
/// (free space) is never returned here; it is offered after a delete.
pub fn select_level(attributes: &DriveAttributes) -> WipeLevel {
    if attributes.is_removable {
        WipeLevel::Removable
    } else if attributes.is_operating_system_volume {
        WipeLevel::OsVolumeClear
    } else {
        WipeLevel::Purge
    }
}
