// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CDDS Global Configuration - Single Source of Truth
//!
//! # Architecture
//!
//! - **Level 1 (Static)**: compile-time constants (handle layout, limits, defaults)
//! - **Level 2 (Dynamic)**: [`RuntimeConfig`], a process-wide snapshot of
//!   [`CoreSettings`] plus free-form user settings
//!
//! # Performance
//!
//! - **Atomic swap**: `ArcSwap` for the core settings (readers never lock)
//! - **Lock-free**: `DashMap` for user settings
//!
//! # Example
//!
//! ```rust
//! use cdds::config::{CoreSettings, RuntimeConfig};
//! use std::time::Duration;
//!
//! let config = RuntimeConfig::global();
//! config.update(|s| CoreSettings {
//!     delete_timeout: Duration::from_secs(5),
//!     ..s.clone()
//! });
//! config.set_user("app.node_name", "probe");
//! assert_eq!(config.search_user_prefix("app.").len(), 1);
//! ```

use crate::logging::LogCategory;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

// =======================================================================
// Handle table
// =======================================================================

/// Default number of live entity handles.
///
/// The handle index holds 24 bits; only part of that space is live at once,
/// the remainder makes recycled slots produce new handle values.
pub const DEFAULT_MAX_HANDLES: u32 = 1 << 16;

/// How long `delete` waits for outstanding pins before failing with TIMEOUT.
pub const DEFAULT_DELETE_TIMEOUT: Duration = Duration::from_secs(10);

// =======================================================================
// History and waitsets
// =======================================================================

/// KEEP_LAST depth when no HISTORY policy is given.
pub const DEFAULT_HISTORY_DEPTH: u32 = 1;

/// Upper bound on entities attached to one waitset.
pub const WAITSET_MAX_ATTACHED: usize = crate::core::rt::WAITSET_DEFAULT_MAX_SLOTS;

/// Largest domain id accepted by `create_participant`.
pub const MAX_DOMAIN_ID: u32 = 232;

/// Environment variable overriding the log category mask (hex or decimal).
pub const ENV_LOG_MASK: &str = "CDDS_LOG_MASK";

// =======================================================================
// Runtime Configuration (Dynamic, Lock-Free)
// =======================================================================

/// Settings the core consults at run time.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config-loaders", derive(serde::Deserialize))]
#[cfg_attr(feature = "config-loaders", serde(default))]
pub struct CoreSettings {
    /// Capacity of the entity handle table; read once, when the first
    /// entity is created. Clamped to `HANDLE_MAX_CAPACITY`.
    pub max_handles: u32,
    #[cfg_attr(feature = "config-loaders", serde(with = "millis"))]
    pub delete_timeout: Duration,
    /// Readers and writers get pooled data allocators instead of heap ones.
    pub loan_pool_enabled: bool,
    /// [`LogCategory`] bits enabled in the logger.
    pub log_categories: u32,
    /// `max_blocking_time` of reliable writers without an explicit policy.
    #[cfg_attr(feature = "config-loaders", serde(with = "millis"))]
    pub default_max_blocking_time: Duration,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            max_handles: DEFAULT_MAX_HANDLES,
            delete_timeout: DEFAULT_DELETE_TIMEOUT,
            loan_pool_enabled: false,
            log_categories: LogCategory::DEFAULT.bits(),
            default_max_blocking_time: crate::dds::qos::DEFAULT_MAX_BLOCKING_TIME,
        }
    }
}

#[cfg(feature = "config-loaders")]
mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

impl CoreSettings {
    /// Parse settings from a YAML document; absent keys keep their defaults.
    ///
    /// ```yaml
    /// max_handles: 4096
    /// delete_timeout: 2000          # milliseconds
    /// loan_pool_enabled: true
    /// log_categories: 0x7
    /// default_max_blocking_time: 250
    /// ```
    #[cfg(feature = "config-loaders")]
    pub fn from_yaml_str(yaml: &str) -> crate::Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| crate::Error::bad_param(format!("invalid settings: {}", e)))
    }

    #[cfg(feature = "config-loaders")]
    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Apply [`ENV_LOG_MASK`] if it is set and parses.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var(ENV_LOG_MASK) {
            match parse_mask(&value) {
                Some(mask) => self.log_categories = mask,
                None => log::warn!("[config] ignoring {}={:?}", ENV_LOG_MASK, value),
            }
        }
        self
    }
}

/// Numeric mask (decimal or `0x` hex) or a list of category names.
fn parse_mask(value: &str) -> Option<u32> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value
            .parse()
            .ok()
            .or_else(|| LogCategory::from_names(value).map(|c| c.bits())),
    }
}

/// Shared runtime configuration (thread-safe, lock-free reads).
///
/// - `ArcSwap`: atomically replaced [`CoreSettings`] snapshot
/// - `DashMap`: free-form `user.*` / `app.*` settings
pub struct RuntimeConfig {
    core: ArcSwap<CoreSettings>,
    user: DashMap<Arc<str>, Arc<str>>,
}

impl RuntimeConfig {
    #[must_use]
    pub fn new(settings: CoreSettings) -> Self {
        Self {
            core: ArcSwap::from_pointee(settings),
            user: DashMap::new(),
        }
    }

    /// Process-wide configuration, initialised from defaults and the environment.
    pub fn global() -> &'static RuntimeConfig {
        static GLOBAL: OnceLock<RuntimeConfig> = OnceLock::new();
        GLOBAL.get_or_init(|| RuntimeConfig::new(CoreSettings::default().with_env_overrides()))
    }

    /// Current settings snapshot.
    #[inline]
    #[must_use]
    pub fn core(&self) -> Arc<CoreSettings> {
        self.core.load_full()
    }

    /// Replace the settings with `f(current)`.
    pub fn update<F>(&self, f: F)
    where
        F: Fn(&CoreSettings) -> CoreSettings,
    {
        self.core.rcu(|current| Arc::new(f(current)));
        log::debug!("[config] core settings updated: {:?}", self.core.load());
    }

    pub fn store(&self, settings: CoreSettings) {
        self.core.store(Arc::new(settings));
    }

    // ===================================================================
    // User-land settings
    // ===================================================================

    fn is_user_key(key: &str) -> bool {
        key.starts_with("user.") || key.starts_with("app.")
    }

    /// Set a user-land setting. Keys must start with `user.` or `app.`;
    /// anything else is logged and skipped.
    pub fn set_user(&self, key: &str, value: &str) {
        if !Self::is_user_key(key) {
            log::error!(
                "[config] user keys must start with 'user.' or 'app.', got '{}'; skipping",
                key
            );
            return;
        }
        self.user.insert(Arc::from(key), Arc::from(value));
    }

    #[must_use]
    pub fn get_user(&self, key: &str) -> Option<Arc<str>> {
        if !Self::is_user_key(key) {
            return None;
        }
        self.user.get(key).map(|v| Arc::clone(&v))
    }

    pub fn remove_user(&self, key: &str) -> Option<Arc<str>> {
        self.user.remove(key).map(|(_, v)| v)
    }

    /// All user settings whose key starts with `prefix`.
    #[must_use]
    pub fn search_user_prefix(&self, prefix: &str) -> Vec<(Arc<str>, Arc<str>)> {
        self.user
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (Arc::clone(entry.key()), Arc::clone(entry.value())))
            .collect()
    }

    #[must_use]
    pub fn user_len(&self) -> usize {
        self.user.len()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new(CoreSettings::default())
    }
}
