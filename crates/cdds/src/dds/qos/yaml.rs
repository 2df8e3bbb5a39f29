// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! YAML QoS profile loader.
//!
//! # Example YAML
//!
//! ```yaml
//! default_profile: sensor
//! profiles:
//!   sensor:
//!     reliability: RELIABLE
//!     max_blocking_time_ms: 250
//!     durability: VOLATILE
//!     history:
//!       kind: KEEP_LAST
//!       depth: 8
//!     resource_limits:
//!       max_samples: 100
//! ```
//!
//! Policies that are absent stay unset in the resulting [`Qos`].

use super::{Durability, History, Qos, Reliability, ResourceLimits, DEFAULT_MAX_BLOCKING_TIME};
use crate::dds::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// YAML QoS profile loader.
pub struct YamlLoader;

/// Root YAML document structure.
#[derive(Debug, Deserialize)]
pub struct YamlQosDocument {
    #[serde(default)]
    pub profiles: HashMap<String, YamlQosProfile>,

    #[serde(default)]
    pub default_profile: Option<String>,
}

/// A single QoS profile in YAML format.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct YamlQosProfile {
    /// RELIABLE or BEST_EFFORT
    pub reliability: Option<String>,
    pub max_blocking_time_ms: Option<u64>,
    /// VOLATILE, TRANSIENT_LOCAL, TRANSIENT or PERSISTENT
    pub durability: Option<String>,
    pub history: Option<YamlHistory>,
    pub resource_limits: Option<YamlResourceLimits>,
    pub user_data: Option<String>,
    pub topic_data: Option<String>,
    pub group_data: Option<String>,
    pub autoenable_created_entities: Option<bool>,
    pub autodispose_unregistered_instances: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct YamlHistory {
    /// KEEP_LAST or KEEP_ALL
    pub kind: String,
    #[serde(default = "default_history_depth")]
    pub depth: u32,
}

fn default_history_depth() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct YamlResourceLimits {
    pub max_samples: i32,
    pub max_instances: i32,
    pub max_samples_per_instance: i32,
}

impl Default for YamlResourceLimits {
    fn default() -> Self {
        let unlimited = ResourceLimits::default();
        Self {
            max_samples: unlimited.max_samples,
            max_instances: unlimited.max_instances,
            max_samples_per_instance: unlimited.max_samples_per_instance,
        }
    }
}

impl YamlLoader {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<YamlQosDocument> {
        let yaml_content = fs::read_to_string(path)?;
        Self::parse_yaml(&yaml_content)
    }

    pub fn parse_yaml(yaml_content: &str) -> Result<YamlQosDocument> {
        serde_yaml::from_str(yaml_content)
            .map_err(|e| Error::bad_param(format!("failed to parse QoS YAML: {}", e)))
    }

    /// QoS of the named profile.
    pub fn get_profile(doc: &YamlQosDocument, name: &str) -> Result<Qos> {
        let profile = doc
            .profiles
            .get(name)
            .ok_or_else(|| Error::bad_param(format!("profile '{}' not found", name)))?;
        Self::profile_to_qos(profile)
    }

    /// QoS of the default profile, or an empty QoS when there is none.
    pub fn get_default_profile(doc: &YamlQosDocument) -> Result<Qos> {
        match doc.default_profile {
            Some(ref name) => Self::get_profile(doc, name),
            None => Ok(Qos::default()),
        }
    }

    pub fn profile_to_qos(profile: &YamlQosProfile) -> Result<Qos> {
        let mut qos = Qos::default();

        if let Some(ref rel) = profile.reliability {
            let blocking = profile
                .max_blocking_time_ms
                .map_or(DEFAULT_MAX_BLOCKING_TIME, Duration::from_millis);
            qos.reliability = Some(match rel.to_uppercase().as_str() {
                "RELIABLE" => Reliability::reliable(blocking),
                "BEST_EFFORT" => Reliability::best_effort(),
                other => return Err(Error::bad_param(format!("invalid reliability: {}", other))),
            });
        }

        if let Some(ref dur) = profile.durability {
            qos.durability = Some(match dur.to_uppercase().as_str() {
                "VOLATILE" => Durability::Volatile,
                "TRANSIENT_LOCAL" => Durability::TransientLocal,
                "TRANSIENT" => Durability::Transient,
                "PERSISTENT" => Durability::Persistent,
                other => return Err(Error::bad_param(format!("invalid durability: {}", other))),
            });
        }

        if let Some(ref hist) = profile.history {
            qos.history = Some(match hist.kind.to_uppercase().as_str() {
                "KEEP_LAST" => History::KeepLast(hist.depth),
                "KEEP_ALL" => History::KeepAll,
                other => return Err(Error::bad_param(format!("invalid history: {}", other))),
            });
        }

        if let Some(ref rl) = profile.resource_limits {
            qos.resource_limits = Some(ResourceLimits {
                max_samples: rl.max_samples,
                max_instances: rl.max_instances,
                max_samples_per_instance: rl.max_samples_per_instance,
            });
        }

        qos.user_data = profile.user_data.as_ref().map(|s| s.as_bytes().to_vec());
        qos.topic_data = profile.topic_data.as_ref().map(|s| s.as_bytes().to_vec());
        qos.group_data = profile.group_data.as_ref().map(|s| s.as_bytes().to_vec());

        if let Some(autoenable) = profile.autoenable_created_entities {
            qos = qos.autoenable(autoenable);
        }
        if let Some(autodispose) = profile.autodispose_unregistered_instances {
            qos = qos.autodispose(autodispose);
        }

        qos.validate()?;
        Ok(qos)
    }
}
