// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Descriptors used to create dynamic types and add members to them.

use super::DynamicType;

/// Primitive type kinds usable directly in a [`DynamicTypeSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Float128,
    Char8,
    Char16,
}

impl PrimitiveKind {
    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::Boolean | Self::Byte | Self::Int8 | Self::UInt8 | Self::Char8 => 1,
            Self::Int16 | Self::UInt16 | Self::Char16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
            Self::Float128 => 16,
        }
    }

    /// Whether the kind can discriminate a union.
    pub fn is_discriminator(&self) -> bool {
        !matches!(self, Self::Float32 | Self::Float64 | Self::Float128)
    }

    pub fn type_kind(&self) -> DynamicTypeKind {
        match self {
            Self::Boolean => DynamicTypeKind::Boolean,
            Self::Byte => DynamicTypeKind::Byte,
            Self::Int8 => DynamicTypeKind::Int8,
            Self::Int16 => DynamicTypeKind::Int16,
            Self::Int32 => DynamicTypeKind::Int32,
            Self::Int64 => DynamicTypeKind::Int64,
            Self::UInt8 => DynamicTypeKind::UInt8,
            Self::UInt16 => DynamicTypeKind::UInt16,
            Self::UInt32 => DynamicTypeKind::UInt32,
            Self::UInt64 => DynamicTypeKind::UInt64,
            Self::Float32 => DynamicTypeKind::Float32,
            Self::Float64 => DynamicTypeKind::Float64,
            Self::Float128 => DynamicTypeKind::Float128,
            Self::Char8 => DynamicTypeKind::Char8,
            Self::Char16 => DynamicTypeKind::Char16,
        }
    }
}

/// Kind of a dynamic type.
///
/// The discriminant values are the XTypes `TK_*` codes; they feed into the
/// type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DynamicTypeKind {
    #[default]
    None = 0x00,
    Boolean = 0x01,
    Byte = 0x02,
    Int16 = 0x03,
    Int32 = 0x04,
    Int64 = 0x05,
    UInt16 = 0x06,
    UInt32 = 0x07,
    UInt64 = 0x08,
    Float32 = 0x09,
    Float64 = 0x0a,
    Float128 = 0x0b,
    Int8 = 0x0c,
    UInt8 = 0x0d,
    Char8 = 0x10,
    Char16 = 0x11,
    String8 = 0x20,
    String16 = 0x21,
    Alias = 0x30,
    Enumeration = 0x40,
    Bitmask = 0x41,
    Structure = 0x51,
    Union = 0x52,
    Bitset = 0x53,
    Sequence = 0x60,
    Array = 0x61,
    Map = 0x62,
}

impl DynamicTypeKind {
    /// The primitive kind, if this is one.
    pub fn primitive(&self) -> Option<PrimitiveKind> {
        Some(match self {
            Self::Boolean => PrimitiveKind::Boolean,
            Self::Byte => PrimitiveKind::Byte,
            Self::Int8 => PrimitiveKind::Int8,
            Self::Int16 => PrimitiveKind::Int16,
            Self::Int32 => PrimitiveKind::Int32,
            Self::Int64 => PrimitiveKind::Int64,
            Self::UInt8 => PrimitiveKind::UInt8,
            Self::UInt16 => PrimitiveKind::UInt16,
            Self::UInt32 => PrimitiveKind::UInt32,
            Self::UInt64 => PrimitiveKind::UInt64,
            Self::Float32 => PrimitiveKind::Float32,
            Self::Float64 => PrimitiveKind::Float64,
            Self::Float128 => PrimitiveKind::Float128,
            Self::Char8 => PrimitiveKind::Char8,
            Self::Char16 => PrimitiveKind::Char16,
            _ => return None,
        })
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// Either a primitive kind or a reference to another dynamic type.
#[derive(Debug, Clone, Default)]
pub enum DynamicTypeSpec {
    #[default]
    Unset,
    Primitive(PrimitiveKind),
    Definition(DynamicType),
}

impl DynamicTypeSpec {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

impl From<PrimitiveKind> for DynamicTypeSpec {
    fn from(kind: PrimitiveKind) -> Self {
        Self::Primitive(kind)
    }
}

impl From<DynamicType> for DynamicTypeSpec {
    fn from(ty: DynamicType) -> Self {
        Self::Definition(ty)
    }
}

impl From<&DynamicType> for DynamicTypeSpec {
    fn from(ty: &DynamicType) -> Self {
        Self::Definition(ty.clone())
    }
}

/// Input to [`DynamicType::create`].
///
/// Which fields matter depends on `kind`: `base_type` for aliases and
/// structs, `element_type` and `bounds` for collections, strings use
/// `bounds` as the optional length bound, unions need a
/// `discriminator_type`.
#[derive(Debug, Clone, Default)]
pub struct DynamicTypeDescriptor {
    pub kind: DynamicTypeKind,
    pub name: String,
    pub base_type: DynamicTypeSpec,
    pub discriminator_type: DynamicTypeSpec,
    pub bounds: Vec<u32>,
    pub element_type: DynamicTypeSpec,
    pub key_element_type: DynamicTypeSpec,
}

impl DynamicTypeDescriptor {
    pub fn new(kind: DynamicTypeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self::new(kind.type_kind(), "")
    }

    /// Narrow string, unbounded when `bound` is `None`.
    pub fn string8(bound: Option<u32>) -> Self {
        Self {
            bounds: bound.into_iter().collect(),
            ..Self::new(DynamicTypeKind::String8, "")
        }
    }

    pub fn structure(name: impl Into<String>) -> Self {
        Self::new(DynamicTypeKind::Structure, name)
    }

    pub fn union(name: impl Into<String>, discriminator: impl Into<DynamicTypeSpec>) -> Self {
        Self {
            discriminator_type: discriminator.into(),
            ..Self::new(DynamicTypeKind::Union, name)
        }
    }

    pub fn enumeration(name: impl Into<String>) -> Self {
        Self::new(DynamicTypeKind::Enumeration, name)
    }

    pub fn bitmask(name: impl Into<String>) -> Self {
        Self::new(DynamicTypeKind::Bitmask, name)
    }

    pub fn alias(name: impl Into<String>, base: impl Into<DynamicTypeSpec>) -> Self {
        Self {
            base_type: base.into(),
            ..Self::new(DynamicTypeKind::Alias, name)
        }
    }

    /// Sequence of `element`; `bound` limits the length.
    pub fn sequence(
        name: impl Into<String>,
        element: impl Into<DynamicTypeSpec>,
        bound: Option<u32>,
    ) -> Self {
        Self {
            element_type: element.into(),
            bounds: bound.into_iter().collect(),
            ..Self::new(DynamicTypeKind::Sequence, name)
        }
    }

    /// Array of `element` with one dimension per bound.
    pub fn array(
        name: impl Into<String>,
        element: impl Into<DynamicTypeSpec>,
        bounds: impl Into<Vec<u32>>,
    ) -> Self {
        Self {
            element_type: element.into(),
            bounds: bounds.into(),
            ..Self::new(DynamicTypeKind::Array, name)
        }
    }

    /// Set the base type (struct inheritance).
    pub fn with_base(mut self, base: impl Into<DynamicTypeSpec>) -> Self {
        self.base_type = base.into();
        self
    }
}

/// A member to add to a struct or union, or a literal/flag for an
/// enumeration/bitmask (only `name` and `default_label` are used then).
#[derive(Debug, Clone)]
pub struct MemberDescriptor {
    pub name: String,
    /// `None` assigns an id from the type's auto-id setting.
    pub id: Option<u32>,
    pub type_spec: DynamicTypeSpec,
    /// Insert position; `None` appends.
    pub index: Option<usize>,
    /// Case labels (union members).
    pub labels: Vec<i32>,
    /// Default case (union) or default literal (enumeration).
    pub default_label: bool,
}

impl MemberDescriptor {
    pub fn new(name: impl Into<String>, type_spec: impl Into<DynamicTypeSpec>) -> Self {
        Self {
            name: name.into(),
            id: None,
            type_spec: type_spec.into(),
            index: None,
            labels: Vec::new(),
            default_label: false,
        }
    }

    /// Enumeration literal or bitmask flag: a name without a type.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, DynamicTypeSpec::Unset)
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_labels(mut self, labels: impl Into<Vec<i32>>) -> Self {
        self.labels = labels.into();
        self
    }

    pub fn default_case(mut self) -> Self {
        self.default_label = true;
        self
    }
}

/// Type extensibility, FINAL unless changed before members are added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Extensibility {
    #[default]
    Final,
    Appendable,
    Mutable,
}

/// How member ids are assigned when a member descriptor leaves `id` unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AutoId {
    /// One past the highest id in use.
    #[default]
    Sequential,
    /// Derived from the member name, see [`member_hashid`](super::member_hashid).
    Hash,
}

/// Value of a new enumeration literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumLiteralValue {
    /// One past the highest value in use.
    NextAvailable,
    Explicit(i32),
}
