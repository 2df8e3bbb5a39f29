// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dynamic Types
//!
//! Build type definitions at runtime: primitives, strings, aliases,
//! enumerations, bitmasks, arrays, sequences, structs and unions.
//!
//! # Lifecycle
//!
//! - [`DynamicType::create`] makes a constructing type in the domain of an
//!   entity.
//! - Members, literals and flags are added while it is constructing.
//! - [`DynamicType::register`] (or using the type inside another one)
//!   validates and freezes it and assigns a 14-byte [`TypeId`].
//!
//! # Example
//!
//! ```rust,no_run
//! use cdds::dds;
//! use cdds::dynamic::{
//!     DynamicType, DynamicTypeDescriptor, MemberDescriptor, PrimitiveKind,
//! };
//!
//! let pp = dds::create_participant(0, None, None)?;
//!
//! let color = DynamicType::create(pp, DynamicTypeDescriptor::enumeration("Color"))?;
//! color.add_member(MemberDescriptor::named("RED"))?;
//! color.add_member(MemberDescriptor::named("GREEN"))?;
//!
//! let shape = DynamicType::create(pp, DynamicTypeDescriptor::structure("Shape"))?;
//! shape.add_member(MemberDescriptor::new("id", PrimitiveKind::UInt32).with_id(0))?;
//! shape.add_member(MemberDescriptor::new("color", &color))?;
//! shape.member_set_key(0, true)?;
//!
//! let id = shape.register()?;
//! println!("registered Shape as {}", id);
//! # Ok::<(), cdds::Error>(())
//! ```

mod dynamic_type;
mod type_descriptor;
mod type_id;

pub use dynamic_type::{lookup_type, BitFlag, DynamicType, EnumLiteral, MemberInfo};
pub use type_descriptor::{
    AutoId, DynamicTypeDescriptor, DynamicTypeKind, DynamicTypeSpec, EnumLiteralValue,
    Extensibility, MemberDescriptor, PrimitiveKind,
};
pub use type_id::{member_hashid, TypeId, MEMBER_ID_MASK};
