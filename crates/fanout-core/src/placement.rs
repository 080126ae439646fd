//! Memory placement of topology and feature storage.
//!
//! | Mode | Backing | Access |
//! |------|---------|--------|
//! | `Resident` | One accelerator's memory | Local, no copy |
//! | `ZeroCopy` | Host memory, device-addressable | Remote read, no explicit copy |
//! | `Partitioned` | Spread over storage nodes | May cross a partition boundary |
//!
//! Placement never changes what a lookup returns, only how fast.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Where a store's backing memory lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Fully resident on a single device.
    Resident {
        /// Device ordinal.
        device: usize,
    },
    /// Host-resident and device-addressable without an explicit copy.
    #[default]
    ZeroCopy,
    /// Partitioned across storage nodes.
    Partitioned {
        /// Number of partitions.
        num_partitions: usize,
    },
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resident { device } => write!(f, "resident:{device}"),
            Self::ZeroCopy => f.write_str("zero-copy"),
            Self::Partitioned { num_partitions } => write!(f, "partitioned:{num_partitions}"),
        }
    }
}

/// Parses `zero-copy`, `resident:<device>` and `partitioned:<n>`.
impl FromStr for Placement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || Error::InvalidConfig(format!("unrecognized placement: {s}"));
        let (kind, arg) = match s.split_once(':') {
            Some((k, a)) => (k, Some(a)),
            None => (s, None),
        };
        match (kind.to_ascii_lowercase().replace('_', "-").as_str(), arg) {
            ("zero-copy", None) => Ok(Self::ZeroCopy),
            ("resident", a) => {
                let device = a.map_or(Ok(0), str::parse).map_err(|_| bad())?;
                Ok(Self::Resident { device })
            }
            ("partitioned", Some(a)) => {
                let num_partitions: usize = a.parse().map_err(|_| bad())?;
                if num_partitions == 0 {
                    return Err(bad());
                }
                Ok(Self::Partitioned { num_partitions })
            }
            _ => Err(bad()),
        }
    }
}

/// A set of co-located devices sharing one replica of each hot feature
/// shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceGroup {
    /// Group identifier, the key of the replica.
    pub group_id: usize,
    /// Member device ordinals.
    pub device_ids: Vec<usize>,
}

impl DeviceGroup {
    /// Create a device group.
    pub fn new(group_id: usize, device_ids: impl Into<Vec<usize>>) -> Self {
        Self {
            group_id,
            device_ids: device_ids.into(),
        }
    }

    /// Whether `device` belongs to this group.
    pub fn contains(&self, device: usize) -> bool {
        self.device_ids.contains(&device)
    }

    /// Device the group's replica is allocated on.
    pub fn home_device(&self) -> Option<usize> {
        self.device_ids.first().copied()
    }
}
