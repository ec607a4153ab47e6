//! Host descriptor as reported by a node

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Snapshot of one node's identity and runtime metrics
///
/// Every field is optional on the wire. The server fills zero values for
/// metrics it could not read, so presence is what counts, not the value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct HostDescriptor {
    pub version: Option<String>,
    pub host_ip: Option<String>,
    pub host_ips: Vec<String>,
    pub responded_from_ip: Option<String>,
    pub hostname: Option<String>,
    pub cpu_uuid: Option<String>,
    pub service_port: Option<u16>,
    pub cpu_info: Option<String>,
    pub cpu_usage_percent: Option<f64>,
    pub memory_total_mb: Option<u64>,
    pub memory_used_mb: Option<u64>,
    pub memory_usage_percent: Option<f64>,
    #[serde(rename = "self")]
    pub is_self: bool,
}

impl HostDescriptor {
    /// Every address this descriptor claims, `host_ip` first
    ///
    /// Blank entries are dropped and duplicates keep their first position.
    #[must_use]
    pub fn ips(&self) -> Vec<String> {
        let mut ips: Vec<String> = Vec::with_capacity(self.host_ips.len() + 1);
        let candidates = self.host_ip.iter().chain(self.host_ips.iter());
        for ip in candidates {
            let ip = ip.trim();
            if !ip.is_empty() && !ips.iter().any(|known| known == ip) {
                ips.push(ip.to_string());
            }
        }
        ips
    }

    /// Primary address, if the node reported one
    #[must_use]
    pub fn primary_ip(&self) -> Option<&str> {
        non_blank(self.host_ip.as_deref())
    }

    /// Hardware identity, if non-blank
    #[must_use]
    pub fn cpu_uuid(&self) -> Option<&str> {
        non_blank(self.cpu_uuid.as_deref())
    }

    /// Hostname, if non-blank
    #[must_use]
    pub fn hostname(&self) -> Option<&str> {
        non_blank(self.hostname.as_deref())
    }

    /// Whether any key a registry can resolve on is present
    #[must_use]
    pub fn has_identity(&self) -> bool {
        self.cpu_uuid().is_some() || self.hostname().is_some() || !self.ips().is_empty()
    }

    /// Address the discovery probe traversed, if recorded
    #[must_use]
    pub fn responded_from_ip(&self) -> Option<&str> {
        non_blank(self.responded_from_ip.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_server_payload() {
        let json = r#"{
            "type": "DISCOVERY_RESPONSE",
            "service": "mol",
            "host_ip": "192.168.0.12",
            "host_ips": ["192.168.0.12", "10.0.0.12"],
            "hostname": "edge-12",
            "service_port": 8888,
            "version": "1.3.0",
            "request_id": "abc",
            "cpu_info": "ARM Cortex-A72",
            "cpu_usage_percent": 12.5,
            "cpu_uuid": "0f1e",
            "memory_total_mb": 3906,
            "memory_used_mb": 1024,
            "memory_usage_percent": 26.2,
            "responded_from_ip": "192.168.0.12"
        }"#;

        let descriptor: HostDescriptor = serde_json::from_str(json).unwrap();

        assert_eq!(descriptor.version.as_deref(), Some("1.3.0"));
        assert_eq!(descriptor.service_port, Some(8888));
        assert_eq!(descriptor.memory_total_mb, Some(3906));
        assert!(!descriptor.is_self);
        assert_eq!(descriptor.ips(), vec!["192.168.0.12", "10.0.0.12"]);
    }

    #[test]
    fn test_self_flag_and_missing_fields() {
        let descriptor: HostDescriptor =
            serde_json::from_str(r#"{"self": true, "responded_from_ip": "10.0.0.1"}"#).unwrap();

        assert!(descriptor.is_self);
        assert!(descriptor.ips().is_empty());
        assert_eq!(descriptor.responded_from_ip(), Some("10.0.0.1"));
        assert_eq!(descriptor.cpu_uuid(), None);
    }

    #[test]
    fn test_blank_values_are_absent() {
        let descriptor = HostDescriptor {
            host_ip: Some("  ".to_string()),
            host_ips: vec![String::new(), "10.0.0.3".to_string()],
            hostname: Some(String::new()),
            ..HostDescriptor::default()
        };

        assert_eq!(descriptor.primary_ip(), None);
        assert_eq!(descriptor.hostname(), None);
        assert_eq!(descriptor.ips(), vec!["10.0.0.3"]);
    }
}
