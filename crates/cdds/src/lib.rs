// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # CDDS - DDS core in pure Rust
//!
//! The local data path of a DDS implementation: entities addressed by
//! integer handles, type-erased serialized samples, the reader history
//! cache with its read/take/loan machinery, conditions and waitsets.
//! Writers deliver to the matching readers of the same domain directly.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cdds::dds;
//! # use cdds::core::ser::{Cursor, CdrWriter, SerResult};
//! # #[derive(Default, Clone)] struct Temperature { sensor: u32, celsius: f32 }
//! # impl cdds::core::serdata::TopicType for Temperature {
//! #     fn type_name() -> &'static str { "Temperature" }
//! #     fn encode(&self, w: &mut CdrWriter) -> SerResult<()> { w.write_u32(self.sensor)?; w.write_f32(self.celsius) }
//! #     fn decode(r: &mut Cursor<'_>) -> SerResult<Self> { Ok(Self { sensor: r.read_u32()?, celsius: r.read_f32()? }) }
//! # }
//!
//! fn main() -> cdds::Result<()> {
//!     let participant = dds::create_participant(0, None, None)?;
//!     let topic = dds::create_topic::<Temperature>(participant, "temperature", None, None)?;
//!     let writer = dds::create_writer(participant, topic, None, None)?;
//!     let reader = dds::create_reader(participant, topic, None, None)?;
//!
//!     dds::write(writer, &Temperature { sensor: 1, celsius: 21.5 })?;
//!
//!     let mut loan = None;
//!     dds::take_wl::<Temperature>(reader, &mut loan, 8)?;
//!     if let Some(samples) = &loan {
//!         for (sample, info) in samples.iter() {
//!             println!("{} -> {} ({:?})", sample.sensor, sample.celsius, info.instance_state);
//!         }
//!     }
//!     dds::return_loan(reader, &mut loan)?;
//!
//!     dds::delete(participant)
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                            DDS Layer                                |
//! |   Participant -> Publisher/Subscriber -> Writer/Reader, Topic       |
//! |   QoS | Listeners & status | Read/Query/Guard conditions | WaitSets |
//! +---------------------------------------------------------------------+
//! |                     Reader history cache (rhc)                      |
//! |   instances | sample/view/instance states | read/take | loans       |
//! +---------------------------------------------------------------------+
//! |                            Core Layer                               |
//! |   handle table | sertype/serdata | tkmap | slab pool | ser (CDR)    |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`dds`] - Entity API (start here)
//! - [`core`] - Handles, serialized data, key to instance map
//! - [`dynamic`] - Runtime-built type definitions
//! - [`config`] - Runtime configuration
//! - [`logging`] - Category-masked logging

/// Global configuration (handle limits, timeouts, log mask, user settings).
pub mod config;
/// Core runtime components (handle table, serdata, tkmap).
pub mod core;
/// Entity API: participants, topics, readers, writers, conditions, waitsets.
pub mod dds;
/// Dynamic types built at runtime.
pub mod dynamic;
/// Compile-time configurable logging system (zero-cost when disabled).
pub mod logging;

pub use dds::{Entity, Error, Result, ReturnCode};

/// CDDS version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
