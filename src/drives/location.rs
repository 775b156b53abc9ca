use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Block addressing for a resolved file.
///
/// The Engine has emitted two schemas over time; both are accepted and kept
/// as-is so nothing is lost on export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "schema", rename_all = "snake_case")]
pub enum Addressing {
    /// `starting_cluster`, `starting_sector`, file offsets, disk offset
    Legacy {
        cluster: u64,
        sector: Option<u64>,
        file_start: Option<u64>,
        file_end: Option<u64>,
        disk_offset: Option<u64>,
        file_size: Option<u64>,
    },
    /// `lcn_start`, `clusters`, `cluster_size`, `offset_bytes`, sector info
    Current {
        logical_cluster_start: u64,
        cluster_count: u64,
        cluster_size: u64,
        byte_offset: Option<u64>,
        sector_number: Option<u64>,
        sector_size: Option<u64>,
    },
}

/// Where a file lives on the medium, classified once at ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PhysicalLocation {
    Resolved { addressing: Addressing },
    Unavailable { reason: String, note: Option<String> },
    /// Non-block-addressable media (MTP phones and the like)
    DeviceSpecific { kind: String, note: Option<String> },
}

fn field_u64(map: &Map<String, Value>, key: &str) -> Option<u64> {
    match map.get(key)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn field_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

impl PhysicalLocation {
    /// Classify a raw `physical_location` object. Returns `None` for null or
    /// for objects matching no known shape.
    pub fn from_engine(raw: &Value) -> Option<Self> {
        let map = raw.as_object()?;

        if let Some(reason) = field_str(map, "error") {
            return Some(PhysicalLocation::Unavailable {
                reason,
                note: field_str(map, "note"),
            });
        }

        if let Some(kind) = field_str(map, "device_type") {
            return Some(PhysicalLocation::DeviceSpecific {
                kind,
                note: field_str(map, "note"),
            });
        }

        if map.contains_key("lcn_start") {
            return Some(PhysicalLocation::Resolved {
                addressing: Addressing::Current {
                    logical_cluster_start: field_u64(map, "lcn_start").unwrap_or(0),
                    cluster_count: field_u64(map, "clusters").unwrap_or(0),
                    cluster_size: field_u64(map, "cluster_size").unwrap_or(0),
                    byte_offset: field_u64(map, "offset_bytes"),
                    sector_number: field_u64(map, "sector_number"),
                    sector_size: field_u64(map, "sector_size"),
                },
            });
        }

        if map.contains_key("starting_cluster") {
            return Some(PhysicalLocation::Resolved {
                addressing: Addressing::Legacy {
                    cluster: field_u64(map, "starting_cluster").unwrap_or(0),
                    sector: field_u64(map, "starting_sector"),
                    file_start: field_u64(map, "file_starting_offset"),
                    file_end: field_u64(map, "file_ending_offset"),
                    disk_offset: field_u64(map, "disk_starting_offset"),
                    file_size: field_u64(map, "file_size"),
                },
            });
        }

        None
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, PhysicalLocation::Resolved { .. })
    }

    /// Whether the failure looks fixable by running elevated.
    pub fn needs_elevation(&self) -> bool {
        match self {
            PhysicalLocation::Unavailable { reason, .. } => {
                reason.to_ascii_lowercase().contains("administrator")
            }
            _ => false,
        }
    }
}

fn hex(value: Option<u64>) -> String {
    value
        .map(|v| format!("0x{:08X}", v))
        .unwrap_or_else(|| "N/A".to_string())
}

impl fmt::Display for PhysicalLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicalLocation::Resolved {
                addressing:
                    Addressing::Current {
                        logical_cluster_start,
                        cluster_count,
                        cluster_size,
                        byte_offset,
                        sector_number,
                        sector_size,
                    },
            } => {
                write!(
                    f,
                    "LCN {} ({} clusters of {} B), offset {}",
                    logical_cluster_start,
                    cluster_count,
                    cluster_size,
                    hex(*byte_offset)
                )?;
                if let Some(sector) = sector_number {
                    write!(f, ", sector {}", sector)?;
                    if let Some(size) = sector_size.filter(|s| *s > 0) {
                        write!(f, " ({} B)", size)?;
                    }
                }
                Ok(())
            }
            PhysicalLocation::Resolved {
                addressing:
                    Addressing::Legacy {
                        cluster,
                        sector,
                        file_start,
                        file_end,
                        disk_offset,
                        ..
                    },
            } => {
                write!(f, "cluster {}", cluster)?;
                if let Some(sector) = sector {
                    write!(f, ", sector {}", sector)?;
                }
                write!(
                    f,
                    ", file {}..{}, disk {}",
                    hex(Some(file_start.unwrap_or(0))),
                    hex(*file_end),
                    hex(*disk_offset)
                )
            }
            PhysicalLocation::Unavailable { reason, note } => match note {
                Some(note) => write!(f, "{} - {}", reason, note),
                None => write!(f, "{}", reason),
            },
            PhysicalLocation::DeviceSpecific { kind, note } => match note {
                Some(note) => write!(f, "{}", note),
                None => write!(f, "{} device path", kind),
            },
        }
    }
}
