//! Namespace categories used to group `ListNamespaces()` output.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Core,
    Firewall,
    Vpn,
    Dhcp,
    Monitoring,
    Hardware,
    Other,
}

impl Category {
    /// Stable display/iteration order for `get("")` and `ListNamespaces()`.
    pub const ORDER: [Category; 7] = [
        Category::Core,
        Category::Firewall,
        Category::Vpn,
        Category::Dhcp,
        Category::Monitoring,
        Category::Hardware,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Core => "core",
            Category::Firewall => "firewall",
            Category::Vpn => "vpn",
            Category::Dhcp => "dhcp",
            Category::Monitoring => "monitoring",
            Category::Hardware => "hardware",
            Category::Other => "other",
        }
    }

    /// Categorize a plugin declaring `category` metadata; built-in
    /// namespaces (`interfaces`, `routes`, `jack`) are always `Core`.
    pub fn from_plugin_category(s: &str) -> Category {
        match s {
            "firewall" => Category::Firewall,
            "vpn" => Category::Vpn,
            "dhcp" => Category::Dhcp,
            "monitoring" => Category::Monitoring,
            "hardware" => Category::Hardware,
            _ => Category::Other,
        }
    }
}

pub const CORE_NAMESPACES: &[&str] = &["interfaces", "routes", "jack"];
