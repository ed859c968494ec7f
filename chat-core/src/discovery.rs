//! Discovered devices and name matching. Enumeration itself belongs to the host.

use serde::{Deserialize, Serialize};

/// One scan result: where to connect and what the device calls itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub address: String,
    pub name: String,
}

impl DiscoveredDevice {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }

    /// Case-insensitive exact match on display name.
    pub fn name_matches(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }
}

/// First device (in emission order) whose name matches `name`. `None` is a normal outcome.
pub fn find_by_name<'a>(devices: &'a [DiscoveredDevice], name: &str) -> Option<&'a DiscoveredDevice> {
    let name = name.trim();
    devices.iter().find(|d| d.name_matches(name))
}
