// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Core Runtime Components
//!
//! Low-level infrastructure underneath the [`crate::dds`] API.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `handles` | Process-wide handle table (claim/release/close/delete) |
//! | `ser` | CDR cursors and encapsulation headers |
//! | `serdata` | Type-erased sample representation (sertype/serdata) |
//! | `tkmap` | Domain-wide key to instance-handle map |
//! | `rt` | Runtime primitives (slab pool, waitset driver) |
//!
//! ```text
//! +-----------------------------------------------------+
//! |                    DDS Layer                        |
//! |   entities, history cache, read/take, waitsets      |
//! +-----------------------------------------------------+
//! |                    Core Layer                       |
//! |  +---------+ +---------+ +-------+ +-------------+  |
//! |  | handles | | serdata | | tkmap | | rt (pool,   |  |
//! |  |         | |  + ser  | |       | |  waitset)   |  |
//! |  +---------+ +---------+ +-------+ +-------------+  |
//! +-----------------------------------------------------+
//! ```

/// Handle table mapping entity handles to reference-counted objects.
pub mod handles;
/// Runtime primitives (slab pool, waitset driver).
pub mod rt;
/// Serialization helpers (CDR encoding/decoding).
pub mod ser;
/// Sertype/serdata abstraction.
pub mod serdata;
pub mod tkmap;
