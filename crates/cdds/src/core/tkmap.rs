// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Domain-wide instance map.
//!
//! Maps a (type name, serialized key) pair to a 64-bit instance id so every
//! reader and writer in a domain uses the same instance handle for equal keys.
//! Entries are reference counted per registration and disappear when the last
//! reference is dropped.

use crate::core::serdata::{Serdata, SerdataRef};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_IID: AtomicU64 = AtomicU64::new(1);

/// Fresh instance id; never 0.
pub fn generate_iid() -> u64 {
    NEXT_IID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TkKey {
    type_name: String,
    key: Box<[u8]>,
}

impl TkKey {
    fn of(type_name: &str, sd: &dyn Serdata) -> Self {
        Self {
            type_name: type_name.to_string(),
            key: sd.key_bytes().into(),
        }
    }
}

struct TkEntry {
    iid: u64,
    refc: u32,
}

/// Instance map of one domain.
#[derive(Default)]
pub struct TopicKeyMap {
    by_key: DashMap<TkKey, TkEntry>,
    /// iid -> key-only serdata; written only while the `by_key` entry is locked.
    by_iid: DashMap<u64, SerdataRef>,
}

impl TopicKeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instance id for `sd`'s key, if registered.
    pub fn lookup(&self, type_name: &str, sd: &dyn Serdata) -> Option<u64> {
        self.by_key.get(&TkKey::of(type_name, sd)).map(|e| e.iid)
    }

    /// Instance id for `sd`'s key, registering it if needed; takes one reference.
    pub fn lookup_or_register(&self, type_name: &str, sd: &dyn Serdata) -> u64 {
        match self.by_key.entry(TkKey::of(type_name, sd)) {
            Entry::Occupied(mut o) => {
                let e = o.get_mut();
                e.refc += 1;
                e.iid
            }
            Entry::Vacant(v) => {
                let iid = generate_iid();
                self.by_iid.insert(iid, sd.to_untyped());
                v.insert(TkEntry { iid, refc: 1 });
                log::trace!("[tkmap] new instance {:#x} for {}", iid, type_name);
                iid
            }
        }
    }

    /// Take one more reference on a registered instance.
    pub fn ref_iid(&self, iid: u64) -> bool {
        let Some(sd) = self.get(iid) else {
            return false;
        };
        let type_name = sd.sertype().map(|st| st.type_name().to_string());
        let key = TkKey {
            type_name: type_name.unwrap_or_default(),
            key: sd.key_bytes().into(),
        };
        match self.by_key.get_mut(&key) {
            Some(mut e) if e.iid == iid => {
                e.refc += 1;
                true
            }
            _ => false,
        }
    }

    /// Drop one reference; the instance is forgotten when none remain.
    pub fn unref(&self, type_name: &str, sd: &dyn Serdata) {
        if let Entry::Occupied(mut o) = self.by_key.entry(TkKey::of(type_name, sd)) {
            let e = o.get_mut();
            e.refc -= 1;
            if e.refc == 0 {
                let iid = e.iid;
                o.remove();
                self.by_iid.remove(&iid);
            }
        }
    }

    /// Key-only serdata of a registered instance.
    pub fn get(&self, iid: u64) -> Option<SerdataRef> {
        self.by_iid.get(&iid).map(|sd| sd.value().clone())
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
