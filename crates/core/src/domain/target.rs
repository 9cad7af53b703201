// Target Domain Model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Host name or address, optionally suffixed with `:port`
pub type TargetId = String;

/// Default SSH port when the identifier carries none
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Retrieval command shared by every Cisco platform family
pub const SHOW_RUNNING_CONFIG: &str = "show running-config";

/// Device platform tag (selects the retrieval command)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    #[default]
    CiscoIos,
    CiscoNxos,
    CiscoAsa,
    CiscoXr,
    /// Unrecognized tag, kept verbatim
    Other(String),
}

impl DeviceType {
    /// Parse a tag as written in the target list
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "cisco_ios" | "ios" => DeviceType::CiscoIos,
            "cisco_nxos" | "nxos" => DeviceType::CiscoNxos,
            "cisco_asa" | "asa" => DeviceType::CiscoAsa,
            "cisco_xr" | "xr" => DeviceType::CiscoXr,
            _ => DeviceType::Other(tag.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DeviceType::CiscoIos => "cisco_ios",
            DeviceType::CiscoNxos => "cisco_nxos",
            DeviceType::CiscoAsa => "cisco_asa",
            DeviceType::CiscoXr => "cisco_xr",
            DeviceType::Other(tag) => tag,
        }
    }

    /// Command that dumps the running configuration on this platform
    pub fn retrieval_command(&self) -> &'static str {
        SHOW_RUNNING_CONFIG
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One device to back up. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    id: TargetId,
    device_type: Option<DeviceType>,
}

impl Target {
    pub fn new(id: impl Into<TargetId>, device_type: Option<DeviceType>) -> Self {
        Self {
            id: id.into(),
            device_type,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Tag as written in the list, if any
    pub fn device_type(&self) -> Option<&DeviceType> {
        self.device_type.as_ref()
    }

    /// Tag with the platform default applied
    pub fn effective_device_type(&self) -> DeviceType {
        self.device_type.clone().unwrap_or_default()
    }

    /// Split `host:port` into its parts, defaulting the port
    ///
    /// IPv6 addresses take a port only in bracketed form (`[::1]:2222`);
    /// bare ones (more than one colon) are returned unchanged.
    pub fn host_port(&self) -> (&str, u16) {
        if let Some(rest) = self.id.strip_prefix('[') {
            if let Some((host, tail)) = rest.split_once(']') {
                let port = match tail.strip_prefix(':') {
                    Some(port) => port.parse::<u16>().ok(),
                    None if tail.is_empty() => Some(DEFAULT_SSH_PORT),
                    None => None,
                };
                if let Some(port) = port {
                    return (host, port);
                }
            }
        }
        if self.id.matches(':').count() == 1 {
            if let Some((host, port)) = self.id.rsplit_once(':') {
                if let Ok(port) = port.parse::<u16>() {
                    return (host, port);
                }
            }
        }
        (&self.id, DEFAULT_SSH_PORT)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_port_default() {
        let target = Target::new("10.0.0.1", None);
        assert_eq!(target.host_port(), ("10.0.0.1", 22));
    }

    #[test]
    fn test_host_port_explicit() {
        let target = Target::new("edge-rtr:2222", None);
        assert_eq!(target.host_port(), ("edge-rtr", 2222));
    }

    #[test]
    fn test_host_port_ipv6_untouched() {
        let target = Target::new("fe80::1", None);
        assert_eq!(target.host_port(), ("fe80::1", 22));
    }

    #[test]
    fn test_host_port_bracketed_ipv6() {
        assert_eq!(Target::new("[::1]:2222", None).host_port(), ("::1", 2222));
        assert_eq!(Target::new("[fe80::1]", None).host_port(), ("fe80::1", 22));
    }

    #[test]
    fn test_device_type_tags() {
        assert_eq!(DeviceType::from_tag("NXOS"), DeviceType::CiscoNxos);
        assert_eq!(DeviceType::from_tag("cisco_ios"), DeviceType::CiscoIos);
        assert_eq!(
            DeviceType::from_tag("juniper_junos"),
            DeviceType::Other("juniper_junos".to_string())
        );
        assert_eq!(
            Target::new("r1", None).effective_device_type(),
            DeviceType::CiscoIos
        );
    }
}
