// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Domain Registry for Intra-Process Matching
//!
//! Every participant of a domain shares one [`Domain`]: the instance map, the
//! topic table and the set of enabled local endpoints. A reader and a writer
//! match when they share the same (topic, type_id) and their reliability is
//! compatible; data written by the writer is then delivered straight into the
//! reader's history cache.
//!
//! # Architecture
//!
//! ```text
//! DomainRegistry (static global)
//! +-- domains: Mutex<HashMap<DomainId, Weak<Domain>>>
//!
//! Domain (one per domain, per process)
//! +-- domain_id: u32
//! +-- tkmap: Arc<TopicKeyMap>
//! +-- topics: Mutex<HashMap<String, TopicEntry>>
//! +-- endpoints: RwLock<HashMap<MatchKey, Vec<LocalEndpointEntry>>>
//! +-- [strong ref held by every entity of the domain]
//!
//! MatchKey
//! +-- topic_name: Arc<str>
//! +-- type_id: TypeId  (MD5-14 of the type name)
//! ```
//!
//! # Matching Flow
//!
//! 1. Writer enabled -> registers, gets the compatible readers already present
//! 2. Reader enabled -> registers, gets the compatible writers already present
//! 3. Endpoint deleted -> [`BindToken`] dropped, endpoint unregistered
//!
//! # Thread Safety
//!
//! - DomainRegistry: Mutex for domain map access
//! - Domain.endpoints: RwLock (every write takes the read side)
//! - Entries hold endpoints weakly; a dying endpoint never keeps its node alive

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};

use super::entity::{EntityNode, InstanceHandle};
use super::qos::Reliability;
use super::{Error, Result};
use crate::core::serdata::SertypeRef;
use crate::core::tkmap::TopicKeyMap;

/// Domain ID type (0-232)
pub type DomainId = u32;

/// Type identifier for matching endpoints
///
/// MD5 hash of the type name, truncated to 14 bytes (EquivalenceHash size).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId([u8; 14]);

impl TypeId {
    /// Create TypeId from type name using MD5
    pub fn from_type_name(type_name: &str) -> Self {
        Self(md5_14(type_name.as_bytes()))
    }

    pub const fn from_bytes(bytes: [u8; 14]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 14] {
        &self.0
    }
}

/// First 14 bytes of the MD5 digest of `data`.
pub(crate) fn md5_14(data: &[u8]) -> [u8; 14] {
    use md5::{Digest, Md5};
    let mut hasher = Md5::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut bytes = [0u8; 14];
    bytes.copy_from_slice(&result[..14]);
    bytes
}

impl std::fmt::Debug for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypeId(")?;
        for byte in &self.0[..4] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "...)")
    }
}

impl std::fmt::Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Match key for endpoint lookup
///
/// Two endpoints match if they have the same (topic_name, type_id).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MatchKey {
    pub topic_name: Arc<str>,
    pub type_id: TypeId,
}

impl MatchKey {
    pub fn from_names(topic_name: &str, type_name: &str) -> Self {
        Self {
            topic_name: Arc::from(topic_name),
            type_id: TypeId::from_type_name(type_name),
        }
    }
}

impl std::fmt::Debug for MatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchKey")
            .field("topic", &self.topic_name)
            .field("type_id", &self.type_id)
            .finish()
    }
}

/// Kind of local endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Reader,
    Writer,
}

/// Local endpoint entry in the registry
struct LocalEndpointEntry {
    iid: InstanceHandle,
    kind: EndpointKind,
    reliability: Reliability,
    node: Weak<EntityNode>,
}

/// Check QoS compatibility between writer and reader
///
/// - Reliable writer -> any reader: compatible
/// - BestEffort writer + BestEffort reader: compatible
/// - BestEffort writer + Reliable reader: INCOMPATIBLE
pub(crate) fn qos_compatible(writer: Reliability, reader: Reliability) -> bool {
    writer.is_reliable() || !reader.is_reliable()
}

/// Token returned when registering an endpoint
///
/// When dropped, unregisters the endpoint from the domain.
pub struct BindToken {
    domain: Weak<Domain>,
    key: MatchKey,
    iid: InstanceHandle,
}

impl Drop for BindToken {
    fn drop(&mut self) {
        if let Some(domain) = self.domain.upgrade() {
            domain.unregister(&self.key, self.iid);
        }
    }
}

impl std::fmt::Debug for BindToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindToken")
            .field("key", &self.key)
            .field("iid", &format_args!("{:#x}", self.iid))
            .finish()
    }
}

/// Topic known to a domain; all participants share its sertype.
struct TopicEntry {
    sertype: SertypeRef,
    refs: u32,
}

/// Domain state - instance map, topics and endpoints of a single domain
pub struct Domain {
    domain_id: DomainId,
    tkmap: Arc<TopicKeyMap>,
    topics: Mutex<HashMap<String, TopicEntry>>,
    endpoints: RwLock<HashMap<MatchKey, Vec<LocalEndpointEntry>>>,
}

impl Domain {
    pub fn new(domain_id: DomainId) -> Self {
        Self {
            domain_id,
            tkmap: Arc::new(TopicKeyMap::new()),
            topics: Mutex::new(HashMap::new()),
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    pub fn domain_id(&self) -> DomainId {
        self.domain_id
    }

    pub fn tkmap(&self) -> &Arc<TopicKeyMap> {
        &self.tkmap
    }

    // ------------------------------------------------------------------
    // Topics
    // ------------------------------------------------------------------

    /// Take a reference on topic `name` with type `sertype`.
    ///
    /// Returns the sertype every endpoint of the topic must use; a topic
    /// already registered with a different type fails with
    /// PRECONDITION_NOT_MET.
    pub(crate) fn acquire_topic(&self, name: &str, sertype: &SertypeRef) -> Result<SertypeRef> {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        match topics.get_mut(name) {
            Some(entry) => {
                if !entry.sertype.equal(sertype.as_ref()) {
                    return Err(Error::precondition(format!(
                        "topic '{}' already exists with type '{}'",
                        name,
                        entry.sertype.type_name()
                    )));
                }
                entry.refs += 1;
                Ok(Arc::clone(&entry.sertype))
            }
            None => {
                topics.insert(
                    name.to_string(),
                    TopicEntry {
                        sertype: Arc::clone(sertype),
                        refs: 1,
                    },
                );
                log::debug!(
                    "[DomainRegistry] domain {} new topic '{}' type '{}'",
                    self.domain_id,
                    name,
                    sertype.type_name()
                );
                Ok(Arc::clone(sertype))
            }
        }
    }

    pub(crate) fn release_topic(&self, name: &str) {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = topics.get_mut(name) {
            entry.refs -= 1;
            if entry.refs == 0 {
                topics.remove(name);
            }
        }
    }

    /// Sertype of a topic known to the domain.
    pub(crate) fn topic_sertype(&self, name: &str) -> Option<SertypeRef> {
        let topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics.get(name).map(|entry| Arc::clone(&entry.sertype))
    }

    // ------------------------------------------------------------------
    // Endpoints
    // ------------------------------------------------------------------

    /// Register an endpoint; returns its token plus the compatible endpoints
    /// of the opposite kind that are already registered.
    pub(crate) fn register(
        self: &Arc<Self>,
        key: MatchKey,
        kind: EndpointKind,
        reliability: Reliability,
        node: &Arc<EntityNode>,
    ) -> (BindToken, Vec<Arc<EntityNode>>) {
        let mut endpoints = self.endpoints.write().unwrap_or_else(|e| e.into_inner());
        let entries = endpoints.entry(key.clone()).or_default();

        let peers = entries
            .iter()
            .filter(|e| e.kind != kind && Self::compatible(kind, reliability, e))
            .filter_map(|e| e.node.upgrade())
            .collect::<Vec<_>>();

        entries.push(LocalEndpointEntry {
            iid: node.iid,
            kind,
            reliability,
            node: Arc::downgrade(node),
        });
        log::debug!(
            "[DomainRegistry] registered {:?} {:#x} on '{}' ({} match(es))",
            kind,
            node.iid,
            key.topic_name,
            peers.len()
        );

        let token = BindToken {
            domain: Arc::downgrade(self),
            key,
            iid: node.iid,
        };
        (token, peers)
    }

    fn compatible(kind: EndpointKind, reliability: Reliability, other: &LocalEndpointEntry) -> bool {
        let ok = match kind {
            EndpointKind::Writer => qos_compatible(reliability, other.reliability),
            EndpointKind::Reader => qos_compatible(other.reliability, reliability),
        };
        if !ok {
            log::debug!(
                "[DomainRegistry] skipping match: {:?} {:?} incompatible with {:?}",
                kind,
                reliability,
                other.reliability
            );
        }
        ok
    }

    /// Unregister an endpoint (called by BindToken::drop)
    fn unregister(&self, key: &MatchKey, iid: InstanceHandle) {
        let mut endpoints = self.endpoints.write().unwrap_or_else(|e| e.into_inner());

        if let Some(entries) = endpoints.get_mut(key) {
            entries.retain(|e| e.iid != iid);
            if entries.is_empty() {
                endpoints.remove(key);
            }
        }

        log::debug!(
            "[DomainRegistry] unregistered endpoint {:#x} from topic '{}'",
            iid,
            key.topic_name
        );
    }

    /// Live endpoints of `kind` registered under `key` and compatible with
    /// an endpoint of the opposite kind with `reliability`.
    pub(crate) fn peers(
        &self,
        key: &MatchKey,
        kind: EndpointKind,
        reliability: Reliability,
    ) -> Vec<Arc<EntityNode>> {
        let endpoints = self.endpoints.read().unwrap_or_else(|e| e.into_inner());
        let other = match kind {
            EndpointKind::Reader => EndpointKind::Writer,
            EndpointKind::Writer => EndpointKind::Reader,
        };
        endpoints
            .get(key)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.kind == kind && Self::compatible(other, reliability, e))
                    .filter_map(|e| e.node.upgrade())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Readers a writer with `reliability` delivers to.
    pub(crate) fn find_readers(&self, key: &MatchKey, reliability: Reliability) -> Vec<Arc<EntityNode>> {
        self.peers(key, EndpointKind::Reader, reliability)
    }

    pub fn endpoint_count(&self) -> usize {
        let endpoints = self.endpoints.read().unwrap_or_else(|e| e.into_inner());
        endpoints.values().map(|v| v.len()).sum()
    }
}

impl std::fmt::Debug for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Domain")
            .field("domain_id", &self.domain_id)
            .field("endpoint_count", &self.endpoint_count())
            .field("instances", &self.tkmap.len())
            .finish()
    }
}

/// Global domain registry (singleton)
pub struct DomainRegistry {
    domains: Mutex<HashMap<DomainId, Weak<Domain>>>,
}

impl DomainRegistry {
    fn new() -> Self {
        Self {
            domains: Mutex::new(HashMap::new()),
        }
    }

    pub fn global() -> &'static DomainRegistry {
        static REGISTRY: OnceLock<DomainRegistry> = OnceLock::new();
        REGISTRY.get_or_init(DomainRegistry::new)
    }

    /// Get or create the state of a domain.
    ///
    /// The domain lives as long as one of its entities holds the returned Arc.
    pub fn get_or_create(&self, domain_id: DomainId) -> Arc<Domain> {
        let mut domains = self.domains.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(strong) = domains.get(&domain_id).and_then(Weak::upgrade) {
            return strong;
        }

        let state = Arc::new(Domain::new(domain_id));
        domains.insert(domain_id, Arc::downgrade(&state));
        domains.retain(|_, weak| weak.strong_count() > 0);

        log::info!("[DomainRegistry] created domain {}", domain_id);
        state
    }

    pub fn get(&self, domain_id: DomainId) -> Option<Arc<Domain>> {
        let domains = self.domains.lock().unwrap_or_else(|e| e.into_inner());
        domains.get(&domain_id).and_then(Weak::upgrade)
    }

    pub fn active_domain_count(&self) -> usize {
        let domains = self.domains.lock().unwrap_or_else(|e| e.into_inner());
        domains.values().filter(|w| w.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::serdata::DefaultSertype;
    use crate::core::ser::{CdrWriter, Cursor, SerResult};
    use crate::core::serdata::TopicType;
    use std::time::Duration;

    #[derive(Debug, Default, Clone)]
    struct Temperature(i32);

    impl TopicType for Temperature {
        fn type_name() -> &'static str {
            "Temperature"
        }
        fn encode(&self, w: &mut CdrWriter) -> SerResult<()> {
            w.write_i32(self.0)
        }
        fn decode(r: &mut Cursor<'_>) -> SerResult<Self> {
            Ok(Self(r.read_i32()?))
        }
    }

    #[derive(Debug, Default, Clone)]
    struct Humidity(u32);

    impl TopicType for Humidity {
        fn type_name() -> &'static str {
            "Humidity"
        }
        fn encode(&self, w: &mut CdrWriter) -> SerResult<()> {
            w.write_u32(self.0)
        }
        fn decode(r: &mut Cursor<'_>) -> SerResult<Self> {
            Ok(Self(r.read_u32()?))
        }
    }

    #[test]
    fn test_type_id_from_name() {
        let id1 = TypeId::from_type_name("Temperature");
        let id2 = TypeId::from_type_name("Temperature");
        let id3 = TypeId::from_type_name("Humidity");

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
        assert_eq!(id1.to_string().len(), 28);
    }

    #[test]
    fn test_match_key() {
        let key1 = MatchKey::from_names("sensor/temp", "Temperature");
        let key2 = MatchKey::from_names("sensor/temp", "Temperature");
        let key3 = MatchKey::from_names("sensor/temp", "Humidity");
        let key4 = MatchKey::from_names("sensor/humidity", "Temperature");

        assert_eq!(key1, key2);
        assert_ne!(key1, key3); // different type
        assert_ne!(key1, key4); // different topic
    }

    #[test]
    fn test_qos_compatibility() {
        let reliable = Reliability::reliable(Duration::from_millis(10));
        let best_effort = Reliability::best_effort();
        assert!(qos_compatible(reliable, reliable));
        assert!(qos_compatible(reliable, best_effort));
        assert!(qos_compatible(best_effort, best_effort));
        assert!(!qos_compatible(best_effort, reliable));
    }

    #[test]
    fn test_topic_refcount_and_type_clash() {
        let domain = Domain::new(7);
        let temp = DefaultSertype::<Temperature>::new_ref();
        let first = domain.acquire_topic("t", &temp).expect("new topic");
        let again = domain
            .acquire_topic("t", &DefaultSertype::<Temperature>::new_ref())
            .expect("same type");
        assert!(Arc::ptr_eq(&first, &again));

        let err = domain
            .acquire_topic("t", &DefaultSertype::<Humidity>::new_ref())
            .expect_err("type clash");
        assert!(matches!(err, Error::PreconditionNotMet(_)));

        domain.release_topic("t");
        assert!(domain.topic_sertype("t").is_some());
        domain.release_topic("t");
        assert!(domain.topic_sertype("t").is_none());
    }

    #[test]
    fn test_domain_registry_get_or_create() {
        let registry = DomainRegistry::global();

        let domain1 = registry.get_or_create(42);
        let domain2 = registry.get_or_create(42);

        assert!(Arc::ptr_eq(&domain1, &domain2));
        assert_eq!(domain1.domain_id(), 42);
    }

    #[test]
    fn test_domain_registry_cleanup() {
        let registry = DomainRegistry::new();

        {
            let _domain = registry.get_or_create(99);
            assert_eq!(registry.active_domain_count(), 1);
        }

        assert_eq!(registry.active_domain_count(), 0);
        assert!(registry.get(99).is_none());
    }
}
