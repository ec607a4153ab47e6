//! Host registry
//!
//! Canonical set of known nodes, keyed by identity rather than address. A
//! node can answer from several addresses and on several channels (the self
//! query, the discovery stream, unicast probes); every answer folds into the
//! same record.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use molfleet_api::HostDescriptor;

use crate::service::ServiceState;

/// Stable handle for a record; the insertion index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct HostId(usize);

impl HostId {
    /// The coordinator's own node
    pub const SELF: HostId = HostId(0);

    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }

    #[must_use]
    pub fn is_self(self) -> bool {
        self == Self::SELF
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host#{}", self.0)
    }
}

/// Everything known about one node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostRecord {
    pub id: HostId,
    pub is_self: bool,
    pub cpu_uuid: Option<String>,
    /// Every address ever reported; never shrinks
    pub known_ips: BTreeSet<String>,
    /// Preferred address, empty until one is known
    pub primary_ip: String,
    /// Addresses discovery probes traversed to reach this node
    pub responded_from_ips: BTreeSet<String>,
    pub hostname: Option<String>,
    /// Last reported version, empty until one is known
    pub version: String,
    pub service_port: Option<u16>,
    pub cpu_info: Option<String>,
    pub cpu_usage_percent: Option<f64>,
    pub memory_total_mb: Option<u64>,
    pub memory_used_mb: Option<u64>,
    pub memory_usage_percent: Option<f64>,
    pub service_state: ServiceState,
    /// A rollout against this node is in flight
    pub updating: bool,
}

impl HostRecord {
    fn empty(id: HostId, is_self: bool) -> Self {
        Self {
            id,
            is_self,
            cpu_uuid: None,
            known_ips: BTreeSet::new(),
            primary_ip: String::new(),
            responded_from_ips: BTreeSet::new(),
            hostname: None,
            version: String::new(),
            service_port: None,
            cpu_info: None,
            cpu_usage_percent: None,
            memory_total_mb: None,
            memory_used_mb: None,
            memory_usage_percent: None,
            service_state: ServiceState::Unknown,
            updating: false,
        }
    }

    /// Address to use for unicast requests, if any is known
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        (!self.primary_ip.is_empty()).then_some(self.primary_ip.as_str())
    }

    /// Short human label: address, then hostname, then the handle
    #[must_use]
    pub fn label(&self) -> String {
        if self.is_self {
            return "self".to_string();
        }
        self.address()
            .or(self.hostname.as_deref())
            .map_or_else(|| self.id.to_string(), str::to_string)
    }

    /// Fold an incoming descriptor into this record
    ///
    /// Addresses accumulate. Scalars are overwritten only by present values,
    /// so applying the same descriptor twice changes nothing the second time.
    pub fn merge(&mut self, incoming: &HostDescriptor) {
        let ips = incoming.ips();
        self.known_ips.extend(ips.iter().cloned());

        if let Some(from) = incoming.responded_from_ip() {
            self.responded_from_ips.insert(from.to_string());
        }
        if let Some(uuid) = incoming.cpu_uuid() {
            self.cpu_uuid = Some(uuid.to_string());
        }
        if let Some(hostname) = incoming.hostname() {
            self.hostname = Some(hostname.to_string());
        }
        if let Some(version) = present(incoming.version.as_deref()) {
            self.version = version.to_string();
        }
        if let Some(cpu_info) = present(incoming.cpu_info.as_deref()) {
            self.cpu_info = Some(cpu_info.to_string());
        }
        if incoming.service_port.is_some() {
            self.service_port = incoming.service_port;
        }
        if incoming.cpu_usage_percent.is_some() {
            self.cpu_usage_percent = incoming.cpu_usage_percent;
        }
        if incoming.memory_total_mb.is_some() {
            self.memory_total_mb = incoming.memory_total_mb;
        }
        if incoming.memory_used_mb.is_some() {
            self.memory_used_mb = incoming.memory_used_mb;
        }
        if incoming.memory_usage_percent.is_some() {
            self.memory_usage_percent = incoming.memory_usage_percent;
        }

        let keep_primary = !self.primary_ip.is_empty() && self.known_ips.contains(&self.primary_ip);
        if !keep_primary && let Some(first) = ips.first() {
            self.primary_ip.clone_from(first);
        }
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Result of folding a descriptor into the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created(HostId),
    Merged(HostId),
    /// The descriptor carried no identity key; nothing changed
    Ignored,
}

impl Upsert {
    #[must_use]
    pub fn id(self) -> Option<HostId> {
        match self {
            Upsert::Created(id) | Upsert::Merged(id) => Some(id),
            Upsert::Ignored => None,
        }
    }
}

/// Ordered collection of host records; index 0 is always the own node
#[derive(Debug, Clone)]
pub struct HostRegistry {
    records: Vec<HostRecord>,
}

impl Default for HostRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HostRegistry {
    /// Registry holding only an empty own-node record
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: vec![HostRecord::empty(HostId::SELF, true)],
        }
    }

    #[must_use]
    pub fn get(&self, id: HostId) -> Option<&HostRecord> {
        self.records.get(id.0)
    }

    pub fn get_mut(&mut self, id: HostId) -> Option<&mut HostRecord> {
        self.records.get_mut(id.0)
    }

    #[must_use]
    pub fn self_record(&self) -> &HostRecord {
        &self.records[HostId::SELF.0]
    }

    /// Records other than the own node, in discovery order
    pub fn remote_hosts(&self) -> impl Iterator<Item = &HostRecord> {
        self.records.iter().skip(1)
    }

    /// Number of remote records
    #[must_use]
    pub fn remote_count(&self) -> usize {
        self.records.len() - 1
    }

    /// Resolve a record by identity
    ///
    /// Priority is strict: a hardware identity match wins, then any known
    /// address, then the hostname. The own node takes part in the lookup.
    #[must_use]
    pub fn find_by_identity(
        &self,
        cpu_uuid: Option<&str>,
        ip: Option<&str>,
        hostname: Option<&str>,
    ) -> Option<HostId> {
        if let Some(uuid) = present(cpu_uuid)
            && let Some(record) = self
                .records
                .iter()
                .find(|r| r.cpu_uuid.as_deref() == Some(uuid))
        {
            return Some(record.id);
        }

        if let Some(ip) = present(ip)
            && let Some(record) = self.records.iter().find(|r| r.known_ips.contains(ip))
        {
            return Some(record.id);
        }

        let hostname = present(hostname)?;
        self.records
            .iter()
            .find(|r| r.hostname.as_deref() == Some(hostname))
            .map(|r| r.id)
    }

    /// Resolve a record from an address alone
    #[must_use]
    pub fn find_by_ip(&self, ip: &str) -> Option<HostId> {
        self.find_by_identity(None, Some(ip), None)
    }

    /// Append a new record built from `descriptor`
    pub fn create(&mut self, descriptor: &HostDescriptor) -> HostId {
        let id = HostId(self.records.len());
        let mut record = HostRecord::empty(id, false);
        record.merge(descriptor);
        self.records.push(record);
        id
    }

    /// Merge into the matching record, or create one
    ///
    /// A descriptor without uuid, address or hostname could never be matched
    /// again, so it is dropped instead of becoming a record.
    pub fn upsert(&mut self, descriptor: &HostDescriptor) -> Upsert {
        if !descriptor.has_identity() {
            return Upsert::Ignored;
        }

        let ips = descriptor.ips();
        let ip = descriptor
            .primary_ip()
            .or_else(|| ips.first().map(String::as_str));

        match self.find_by_identity(descriptor.cpu_uuid(), ip, descriptor.hostname()) {
            Some(id) => {
                self.records[id.0].merge(descriptor);
                Upsert::Merged(id)
            }
            None => Upsert::Created(self.create(descriptor)),
        }
    }

    /// Fill the own-node record from the self query
    pub fn load_self(&mut self, descriptor: &HostDescriptor) -> &HostRecord {
        let record = &mut self.records[HostId::SELF.0];
        record.merge(descriptor);
        record
    }

    /// Record the address a self-describing discovery answer came in on
    pub fn note_self_response(&mut self, responded_from_ip: &str) {
        if let Some(ip) = present(Some(responded_from_ip)) {
            self.records[HostId::SELF.0]
                .responded_from_ips
                .insert(ip.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(uuid: Option<&str>, ips: &[&str], hostname: Option<&str>) -> HostDescriptor {
        HostDescriptor {
            cpu_uuid: uuid.map(str::to_string),
            host_ip: ips.first().map(|s| (*s).to_string()),
            host_ips: ips.iter().map(|s| (*s).to_string()).collect(),
            hostname: hostname.map(str::to_string),
            version: Some("1.3.0".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_registry_has_empty_self() {
        let registry = HostRegistry::new();
        let own = registry.self_record();

        assert!(own.is_self);
        assert_eq!(own.id, HostId::SELF);
        assert!(own.known_ips.is_empty());
        assert_eq!(registry.remote_count(), 0);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut registry = HostRegistry::new();
        let d = HostDescriptor {
            responded_from_ip: Some("10.0.0.1".to_string()),
            memory_total_mb: Some(3906),
            ..descriptor(Some("u-1"), &["10.0.0.2", "192.168.1.2"], Some("edge"))
        };

        let id = registry.upsert(&d).id().unwrap();
        let once = registry.get(id).cloned().unwrap();
        assert_eq!(registry.upsert(&d), Upsert::Merged(id));

        assert_eq!(registry.get(id), Some(&once));
        assert_eq!(registry.remote_count(), 1);
    }

    #[test]
    fn test_cpu_uuid_beats_address() {
        let mut registry = HostRegistry::new();
        let a = registry.create(&descriptor(Some("u-a"), &["10.0.0.2"], None));
        let b = registry.create(&descriptor(Some("u-b"), &["10.0.0.3"], None));

        // Address belongs to a, hardware identity to b
        let found = registry.find_by_identity(Some("u-b"), Some("10.0.0.2"), None);
        assert_eq!(found, Some(b));
        assert_ne!(found, Some(a));
    }

    #[test]
    fn test_lookup_by_any_known_address() {
        let mut registry = HostRegistry::new();
        let id = registry.create(&descriptor(None, &["10.0.0.2", "192.168.1.2"], None));

        assert_eq!(registry.find_by_ip("192.168.1.2"), Some(id));
        assert_eq!(registry.find_by_identity(None, None, None), None);
        assert_eq!(registry.find_by_identity(Some(""), Some(" "), None), None);
    }

    #[test]
    fn test_hostname_is_last_resort() {
        let mut registry = HostRegistry::new();
        let id = registry.create(&descriptor(None, &["10.0.0.2"], Some("edge-2")));

        assert_eq!(
            registry.find_by_identity(Some("unknown"), Some("10.9.9.9"), Some("edge-2")),
            Some(id)
        );
    }

    #[test]
    fn test_new_address_extends_existing_record() {
        let mut registry = HostRegistry::new();
        let id = registry.create(&descriptor(Some("u-1"), &["10.0.0.2"], None));

        let moved = descriptor(Some("u-1"), &["10.0.0.9"], None);
        assert_eq!(registry.upsert(&moved), Upsert::Merged(id));

        let record = registry.get(id).unwrap();
        assert_eq!(record.primary_ip, "10.0.0.2");
        assert!(record.known_ips.contains("10.0.0.9"));
    }

    #[test]
    fn test_absent_fields_do_not_clear() {
        let mut registry = HostRegistry::new();
        let id = registry.create(&descriptor(Some("u-1"), &["10.0.0.2"], Some("edge")));

        registry.upsert(&HostDescriptor {
            cpu_uuid: Some("u-1".to_string()),
            version: Some(String::new()),
            ..Default::default()
        });

        let record = registry.get(id).unwrap();
        assert_eq!(record.version, "1.3.0");
        assert_eq!(record.hostname.as_deref(), Some("edge"));
    }

    #[test]
    fn test_empty_descriptor_creates_blank_record() {
        let mut registry = HostRegistry::new();
        let id = registry.create(&HostDescriptor::default());
        let record = registry.get(id).unwrap();

        assert!(record.known_ips.is_empty());
        assert_eq!(record.address(), None);
        assert_eq!(record.label(), "host#1");
    }

    #[test]
    fn test_descriptor_without_identity_is_ignored() {
        let mut registry = HostRegistry::new();
        let blank = HostDescriptor {
            host_ip: Some("  ".to_string()),
            hostname: Some(String::new()),
            version: Some("1.3.0".to_string()),
            ..Default::default()
        };

        assert_eq!(registry.upsert(&HostDescriptor::default()), Upsert::Ignored);
        assert_eq!(registry.upsert(&blank), Upsert::Ignored);
        assert_eq!(registry.remote_count(), 0);
        assert_eq!(registry.self_record().version, "");
    }

    #[test]
    fn test_self_participates_in_lookup() {
        let mut registry = HostRegistry::new();
        registry.load_self(&descriptor(Some("u-self"), &["10.0.0.1"], Some("hub")));

        let echo = descriptor(Some("u-self"), &["10.0.0.1"], Some("hub"));
        assert_eq!(registry.upsert(&echo), Upsert::Merged(HostId::SELF));
        assert_eq!(registry.remote_count(), 0);
    }

    #[test]
    fn test_note_self_response() {
        let mut registry = HostRegistry::new();
        registry.note_self_response("192.168.7.1");
        registry.note_self_response("");

        let own = registry.self_record();
        assert_eq!(own.responded_from_ips.len(), 1);
        assert!(own.known_ips.is_empty());
    }
}
