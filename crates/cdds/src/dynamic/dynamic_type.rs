// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dynamic type construction.
//!
//! A [`DynamicType`] starts out *constructing*: members, literals and flags
//! can be added and type properties changed. Registering it, or using it as
//! the base, element or member type of another type, resolves it: the
//! definition is validated, its [`TypeId`] computed and it becomes
//! immutable. Every later modification fails with PRECONDITION_NOT_MET.
//!
//! Cloning a `DynamicType` shares the definition; [`DynamicType::dup`]
//! makes an independent, constructing copy.

use super::type_descriptor::{
    AutoId, DynamicTypeDescriptor, DynamicTypeKind, DynamicTypeSpec, EnumLiteralValue,
    Extensibility, MemberDescriptor, PrimitiveKind,
};
use super::type_id::{member_hashid, TypeId, MEMBER_ID_MASK};
use crate::core::ser::{CdrWriter, Endianness};
use crate::dds::{self, Entity, Error, Result};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

/// Type and member names are limited to 255 bytes.
const MAX_NAME_LEN: usize = 255;

fn name_valid(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_NAME_LEN && !name.contains('\0')
}

/// Resolved types per domain, first registration wins.
fn library() -> &'static DashMap<(u32, TypeId), Weak<TypeCell>> {
    static LIBRARY: OnceLock<DashMap<(u32, TypeId), Weak<TypeCell>>> = OnceLock::new();
    LIBRARY.get_or_init(DashMap::new)
}

/// Look up a resolved type by id in the domain of `entity`.
pub fn lookup_type(entity: Entity, id: &TypeId) -> Result<Option<DynamicType>> {
    let domain_id = dds::get_domain_id(entity)?;
    Ok(library()
        .get(&(domain_id, *id))
        .and_then(|weak| weak.upgrade())
        .map(|inner| DynamicType { inner }))
}

/// Struct or union member as seen from outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub name: String,
    pub id: u32,
    pub kind: DynamicTypeKind,
    pub is_key: bool,
    pub is_optional: bool,
    pub is_external: bool,
    pub is_must_understand: bool,
    /// Union case labels.
    pub labels: Vec<i32>,
    /// Union default case.
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumLiteral {
    pub name: String,
    pub value: i32,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitFlag {
    pub name: String,
    pub position: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TypeFlags {
    extensibility: Extensibility,
    autoid: AutoId,
    nested: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct MemberFlags {
    key: bool,
    optional: bool,
    external: bool,
    must_understand: bool,
}

impl MemberFlags {
    fn bits(&self) -> u8 {
        u8::from(self.key)
            | u8::from(self.optional) << 1
            | u8::from(self.external) << 2
            | u8::from(self.must_understand) << 3
    }
}

#[derive(Clone)]
struct Member {
    name: String,
    id: u32,
    ty: DynamicType,
    flags: MemberFlags,
    labels: Vec<i32>,
    is_default: bool,
}

#[derive(Clone)]
enum TypeBody {
    Primitive(PrimitiveKind),
    String8 {
        bound: u32,
    },
    Alias {
        base: DynamicType,
    },
    Enumeration {
        extensibility: Extensibility,
        bit_bound: u16,
        literals: Vec<EnumLiteral>,
    },
    Bitmask {
        extensibility: Extensibility,
        bit_bound: u16,
        fields: Vec<BitFlag>,
    },
    Array {
        element: DynamicType,
        bounds: Vec<u32>,
    },
    Sequence {
        element: DynamicType,
        bound: u32,
    },
    Structure {
        flags: TypeFlags,
        base: Option<DynamicType>,
        members: Vec<Member>,
    },
    Union {
        flags: TypeFlags,
        discriminator: DynamicType,
        members: Vec<Member>,
    },
}

impl TypeBody {
    fn kind(&self) -> DynamicTypeKind {
        match self {
            TypeBody::Primitive(p) => p.type_kind(),
            TypeBody::String8 { .. } => DynamicTypeKind::String8,
            TypeBody::Alias { .. } => DynamicTypeKind::Alias,
            TypeBody::Enumeration { .. } => DynamicTypeKind::Enumeration,
            TypeBody::Bitmask { .. } => DynamicTypeKind::Bitmask,
            TypeBody::Array { .. } => DynamicTypeKind::Array,
            TypeBody::Sequence { .. } => DynamicTypeKind::Sequence,
            TypeBody::Structure { .. } => DynamicTypeKind::Structure,
            TypeBody::Union { .. } => DynamicTypeKind::Union,
        }
    }

    fn has_members(&self) -> bool {
        match self {
            TypeBody::Enumeration { literals, .. } => !literals.is_empty(),
            TypeBody::Bitmask { fields, .. } => !fields.is_empty(),
            TypeBody::Structure { members, .. } | TypeBody::Union { members, .. } => {
                !members.is_empty()
            }
            _ => false,
        }
    }

    /// Type flags of a struct or union.
    fn aggregate_flags(&mut self) -> Result<&mut TypeFlags> {
        match self {
            TypeBody::Structure { flags, .. } | TypeBody::Union { flags, .. } => Ok(flags),
            _ => Err(Error::bad_param("not a struct or union")),
        }
    }
}

#[derive(Clone, Copy)]
enum TypeState {
    Constructing,
    Resolved(TypeId),
}

struct TypeNode {
    name: String,
    state: TypeState,
    body: TypeBody,
}

impl TypeNode {
    fn validate(&self) -> Result<()> {
        match &self.body {
            TypeBody::Structure { base, members, .. } if members.is_empty() && base.is_none() => {
                Err(Error::bad_param(format!("struct {} has no members", self.name)))
            }
            TypeBody::Union { members, .. } if members.is_empty() => {
                Err(Error::bad_param(format!("union {} has no members", self.name)))
            }
            _ => Ok(()),
        }
    }

    /// Canonical encoding: every referenced type appears as its id.
    fn canonical(&self) -> Result<Vec<u8>> {
        let mut w = CdrWriter::new(Endianness::Little);
        w.write_u8(self.body.kind().code())?;
        w.write_string(&self.name)?;
        match &self.body {
            TypeBody::Primitive(_) => {}
            TypeBody::String8 { bound } => w.write_u32(*bound)?,
            TypeBody::Alias { base } => write_ref(&mut w, base)?,
            TypeBody::Enumeration {
                extensibility,
                bit_bound,
                literals,
            } => {
                w.write_u8(*extensibility as u8)?;
                w.write_u16(*bit_bound)?;
                w.write_u32(len_u32(literals.len())?)?;
                for l in literals {
                    w.write_string(&l.name)?;
                    w.write_i32(l.value)?;
                    w.write_bool(l.is_default)?;
                }
            }
            TypeBody::Bitmask {
                extensibility,
                bit_bound,
                fields,
            } => {
                w.write_u8(*extensibility as u8)?;
                w.write_u16(*bit_bound)?;
                w.write_u32(len_u32(fields.len())?)?;
                for f in fields {
                    w.write_string(&f.name)?;
                    w.write_u16(f.position)?;
                }
            }
            TypeBody::Array { element, bounds } => {
                write_ref(&mut w, element)?;
                w.write_u32(len_u32(bounds.len())?)?;
                for b in bounds {
                    w.write_u32(*b)?;
                }
            }
            TypeBody::Sequence { element, bound } => {
                write_ref(&mut w, element)?;
                w.write_u32(*bound)?;
            }
            TypeBody::Structure {
                flags,
                base,
                members,
            } => {
                write_flags(&mut w, flags)?;
                w.write_bool(base.is_some())?;
                if let Some(base) = base {
                    write_ref(&mut w, base)?;
                }
                write_members(&mut w, members)?;
            }
            TypeBody::Union {
                flags,
                discriminator,
                members,
            } => {
                write_flags(&mut w, flags)?;
                write_ref(&mut w, discriminator)?;
                write_members(&mut w, members)?;
            }
        }
        Ok(w.into_inner())
    }
}

fn len_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::OutOfResources)
}

fn write_ref(w: &mut CdrWriter, ty: &DynamicType) -> Result<()> {
    let id = ty
        .type_id()
        .ok_or_else(|| Error::precondition("referenced type is not resolved"))?;
    w.write_bytes(id.as_bytes())?;
    Ok(())
}

fn write_flags(w: &mut CdrWriter, flags: &TypeFlags) -> Result<()> {
    w.write_u8(flags.extensibility as u8)?;
    w.write_u8(flags.autoid as u8)?;
    w.write_bool(flags.nested)?;
    Ok(())
}

fn write_members(w: &mut CdrWriter, members: &[Member]) -> Result<()> {
    w.write_u32(len_u32(members.len())?)?;
    for m in members {
        w.write_u32(m.id)?;
        w.write_string(&m.name)?;
        write_ref(w, &m.ty)?;
        w.write_u8(m.flags.bits())?;
        w.write_bool(m.is_default)?;
        w.write_u32(len_u32(m.labels.len())?)?;
        for l in &m.labels {
            w.write_i32(*l)?;
        }
    }
    Ok(())
}

pub(crate) struct TypeCell {
    domain_id: u32,
    node: Mutex<TypeNode>,
}

/// Shared reference to a dynamic type definition.
#[derive(Clone)]
pub struct DynamicType {
    inner: Arc<TypeCell>,
}

impl DynamicType {
    fn from_body(domain_id: u32, name: String, body: TypeBody) -> Self {
        Self {
            inner: Arc::new(TypeCell {
                domain_id,
                node: Mutex::new(TypeNode {
                    name,
                    state: TypeState::Constructing,
                    body,
                }),
            }),
        }
    }

    /// Create a type in the domain of `entity`.
    ///
    /// # Errors
    /// - `Unsupported` for CHAR16, STRING16, MAP and BITSET.
    /// - `BadParameter` for a missing kind, an invalid name, a missing or
    ///   invalid base/element/discriminator type, or invalid bounds.
    ///
    /// # Example
    /// ```rust,no_run
    /// use cdds::dds;
    /// use cdds::dynamic::{DynamicType, DynamicTypeDescriptor, MemberDescriptor, PrimitiveKind};
    ///
    /// let pp = dds::create_participant(0, None, None)?;
    /// let ty = DynamicType::create(pp, DynamicTypeDescriptor::structure("Position"))?;
    /// ty.add_member(MemberDescriptor::new("x", PrimitiveKind::Float64))?;
    /// ty.add_member(MemberDescriptor::new("y", PrimitiveKind::Float64))?;
    /// let id = ty.register()?;
    /// # let _ = id;
    /// # Ok::<(), cdds::Error>(())
    /// ```
    pub fn create(entity: Entity, descriptor: DynamicTypeDescriptor) -> Result<Self> {
        let domain_id = dds::get_domain_id(entity)?;
        let d = descriptor;
        let check_name = || {
            if name_valid(&d.name) {
                Ok(())
            } else {
                Err(Error::bad_param(format!("invalid type name {:?}", d.name)))
            }
        };

        let (name, body) = match d.kind {
            DynamicTypeKind::None => return Err(Error::bad_param("type kind not set")),
            DynamicTypeKind::Char16
            | DynamicTypeKind::String16
            | DynamicTypeKind::Map
            | DynamicTypeKind::Bitset => return Err(Error::Unsupported),
            DynamicTypeKind::String8 => {
                if d.bounds.len() > 1 {
                    return Err(Error::bad_param("string takes at most one bound"));
                }
                let bound = d.bounds.first().copied().unwrap_or(0);
                (String::new(), TypeBody::String8 { bound })
            }
            DynamicTypeKind::Alias => {
                check_name()?;
                let base = embed(domain_id, &d.base_type, None)?;
                (d.name.clone(), TypeBody::Alias { base })
            }
            DynamicTypeKind::Enumeration => {
                check_name()?;
                let body = TypeBody::Enumeration {
                    extensibility: Extensibility::Final,
                    bit_bound: 32,
                    literals: Vec::new(),
                };
                (d.name.clone(), body)
            }
            DynamicTypeKind::Bitmask => {
                check_name()?;
                let body = TypeBody::Bitmask {
                    extensibility: Extensibility::Final,
                    bit_bound: 32,
                    fields: Vec::new(),
                };
                (d.name.clone(), body)
            }
            DynamicTypeKind::Array => {
                if d.element_type.is_unset() {
                    return Err(Error::bad_param("array needs an element type"));
                }
                check_name()?;
                if d.bounds.is_empty() || d.bounds.contains(&0) {
                    return Err(Error::bad_param("array bounds must be non-empty and non-zero"));
                }
                let element = embed(domain_id, &d.element_type, None)?;
                let body = TypeBody::Array {
                    element,
                    bounds: d.bounds.clone(),
                };
                (d.name.clone(), body)
            }
            DynamicTypeKind::Sequence => {
                if d.element_type.is_unset() {
                    return Err(Error::bad_param("sequence needs an element type"));
                }
                check_name()?;
                if d.bounds.len() > 1 {
                    return Err(Error::bad_param("sequence takes at most one bound"));
                }
                let element = embed(domain_id, &d.element_type, None)?;
                let bound = d.bounds.first().copied().unwrap_or(0);
                (d.name.clone(), TypeBody::Sequence { element, bound })
            }
            DynamicTypeKind::Structure => {
                check_name()?;
                let base = match &d.base_type {
                    DynamicTypeSpec::Unset => None,
                    spec => Some(embed(domain_id, spec, None)?),
                };
                if let Some(b) = &base {
                    if b.kind() != DynamicTypeKind::Structure {
                        return Err(Error::bad_param("base type must be a struct"));
                    }
                }
                let body = TypeBody::Structure {
                    flags: TypeFlags::default(),
                    base,
                    members: Vec::new(),
                };
                (d.name.clone(), body)
            }
            DynamicTypeKind::Union => {
                discriminator_valid(&d.discriminator_type)?;
                check_name()?;
                let discriminator = embed(domain_id, &d.discriminator_type, None)?;
                let body = TypeBody::Union {
                    flags: TypeFlags::default(),
                    discriminator,
                    members: Vec::new(),
                };
                (d.name.clone(), body)
            }
            kind => match kind.primitive() {
                Some(p) => (String::new(), TypeBody::Primitive(p)),
                None => return Err(Error::bad_param(format!("cannot create {:?}", kind))),
            },
        };

        log::debug!("[dynamic] created {:?} {:?} in domain {}", body.kind(), name, domain_id);
        Ok(Self::from_body(domain_id, name, body))
    }

    pub fn kind(&self) -> DynamicTypeKind {
        self.inner.node.lock().body.kind()
    }

    /// Type name; empty for primitives and strings.
    pub fn name(&self) -> String {
        self.inner.node.lock().name.clone()
    }

    pub fn domain_id(&self) -> u32 {
        self.inner.domain_id
    }

    pub fn is_constructing(&self) -> bool {
        matches!(self.inner.node.lock().state, TypeState::Constructing)
    }

    /// Id of a resolved type.
    pub fn type_id(&self) -> Option<TypeId> {
        match self.inner.node.lock().state {
            TypeState::Resolved(id) => Some(id),
            TypeState::Constructing => None,
        }
    }

    /// Whether both refer to the same definition.
    pub fn ptr_eq(&self, other: &DynamicType) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Independent, constructing copy. Referenced types stay shared.
    #[must_use]
    pub fn dup(&self) -> DynamicType {
        let node = self.inner.node.lock();
        Self::from_body(self.inner.domain_id, node.name.clone(), node.body.clone())
    }

    fn lock_constructing(&self) -> Result<MutexGuard<'_, TypeNode>> {
        let node = self.inner.node.lock();
        match node.state {
            TypeState::Constructing => Ok(node),
            TypeState::Resolved(_) => Err(Error::precondition(format!(
                "type {:?} is no longer under construction",
                node.name
            ))),
        }
    }

    /// Validate, compute the id and freeze. No-op when already resolved.
    fn complete(&self) -> Result<TypeId> {
        let mut node = self.inner.node.lock();
        if let TypeState::Resolved(id) = node.state {
            return Ok(id);
        }
        node.validate()?;
        let id = TypeId::compute(&node.canonical()?);
        node.state = TypeState::Resolved(id);
        let name = node.name.clone();
        drop(node);

        library()
            .entry((self.inner.domain_id, id))
            .and_modify(|weak| {
                if weak.strong_count() == 0 {
                    *weak = Arc::downgrade(&self.inner);
                }
            })
            .or_insert_with(|| Arc::downgrade(&self.inner));
        log::debug!("[dynamic] resolved {:?} as {}", name, id);
        Ok(id)
    }

    /// Freeze the type and return its identifier.
    ///
    /// # Errors
    /// - `PreconditionNotMet` if the type was already resolved.
    /// - `BadParameter` for a struct or union without members.
    pub fn register(&self) -> Result<TypeId> {
        drop(self.lock_constructing()?);
        self.complete()
    }

    /// Add a member to a struct or union, a literal to an enumeration or a
    /// flag to a bitmask.
    ///
    /// Enumeration literals get the next value (`default_label` marks the
    /// default literal), bitmask flags the next position. Union members need
    /// case labels or `default_label`. The member type is resolved as a side
    /// effect.
    pub fn add_member(&self, descriptor: MemberDescriptor) -> Result<()> {
        let kind = self.lock_constructing()?.body.kind();
        if !name_valid(&descriptor.name) {
            return Err(Error::bad_param(format!("invalid member name {:?}", descriptor.name)));
        }
        match kind {
            DynamicTypeKind::Enumeration => self.add_enum_literal(
                &descriptor.name,
                EnumLiteralValue::NextAvailable,
                descriptor.default_label,
            ),
            DynamicTypeKind::Bitmask => self.add_bitmask_field(&descriptor.name, None),
            DynamicTypeKind::Structure | DynamicTypeKind::Union => {
                if descriptor.type_spec.is_unset() {
                    return Err(Error::bad_param("member type not set"));
                }
                if kind == DynamicTypeKind::Union
                    && !descriptor.default_label
                    && descriptor.labels.is_empty()
                {
                    return Err(Error::bad_param("union member needs labels or default"));
                }
                let ty = embed(self.inner.domain_id, &descriptor.type_spec, Some(self))?;
                let mut node = self.lock_constructing()?;
                match &mut node.body {
                    TypeBody::Structure { flags, members, .. } => {
                        add_struct_member(*flags, members, descriptor, ty)
                    }
                    TypeBody::Union { flags, members, .. } => {
                        add_union_member(*flags, members, descriptor, ty)
                    }
                    _ => Err(Error::bad_param("type kind changed")),
                }
            }
            _ => Err(Error::bad_param(format!("{:?} has no members", kind))),
        }
    }

    /// Add a literal to an enumeration.
    ///
    /// # Errors
    /// `BadParameter` for a duplicate name or value, a second default, or a
    /// value that does not fit the bit bound.
    pub fn add_enum_literal(
        &self,
        name: &str,
        value: EnumLiteralValue,
        is_default: bool,
    ) -> Result<()> {
        let mut node = self.lock_constructing()?;
        if !name_valid(name) {
            return Err(Error::bad_param(format!("invalid literal name {:?}", name)));
        }
        let TypeBody::Enumeration {
            bit_bound,
            literals,
            ..
        } = &mut node.body
        else {
            return Err(Error::bad_param("not an enumeration"));
        };

        let max = ((1u64 << *bit_bound) - 1).min(i32::MAX as u64) as u32;
        if literals.len() as u64 >= u64::from(max) {
            return Err(Error::bad_param("enumeration is full"));
        }
        let value = match value {
            EnumLiteralValue::NextAvailable => {
                let mut next: i32 = 0;
                for l in literals.iter() {
                    if l.value >= next {
                        if l.value as u32 == max {
                            return Err(Error::bad_param("no literal value left"));
                        }
                        next = l.value + 1;
                    }
                }
                next
            }
            EnumLiteralValue::Explicit(v) => {
                if v as u32 > max {
                    return Err(Error::bad_param(format!("value {} exceeds bit bound", v)));
                }
                if literals.iter().any(|l| l.value == v) {
                    return Err(Error::bad_param(format!("duplicate literal value {}", v)));
                }
                v
            }
        };
        if is_default && literals.iter().any(|l| l.is_default) {
            return Err(Error::bad_param("enumeration already has a default literal"));
        }
        if literals.iter().any(|l| l.name == name) {
            return Err(Error::bad_param(format!("duplicate literal {:?}", name)));
        }
        literals.push(EnumLiteral {
            name: name.to_string(),
            value,
            is_default,
        });
        Ok(())
    }

    /// Add a flag to a bitmask; `None` takes the next free position.
    pub fn add_bitmask_field(&self, name: &str, position: Option<u16>) -> Result<()> {
        let mut node = self.lock_constructing()?;
        if !name_valid(name) {
            return Err(Error::bad_param(format!("invalid flag name {:?}", name)));
        }
        let TypeBody::Bitmask {
            bit_bound, fields, ..
        } = &mut node.body
        else {
            return Err(Error::bad_param("not a bitmask"));
        };
        let bit_bound = *bit_bound;
        if fields.len() >= usize::from(bit_bound) {
            return Err(Error::bad_param("bitmask is full"));
        }
        let position = match position {
            None => {
                let mut next = 0u16;
                for f in fields.iter() {
                    if f.position >= next {
                        if f.position == bit_bound - 1 {
                            return Err(Error::bad_param("no flag position left"));
                        }
                        next = f.position + 1;
                    }
                }
                next
            }
            Some(p) => {
                if p >= bit_bound {
                    return Err(Error::bad_param(format!("position {} exceeds bit bound", p)));
                }
                if fields.iter().any(|f| f.position == p) {
                    return Err(Error::bad_param(format!("duplicate position {}", p)));
                }
                p
            }
        };
        fields.push(BitFlag {
            name: name.to_string(),
            position,
        });
        Ok(())
    }

    /// Change the extensibility of a struct, union, enumeration or bitmask.
    /// Only possible before the first member is added.
    pub fn set_extensibility(&self, extensibility: Extensibility) -> Result<()> {
        let mut node = self.lock_constructing()?;
        let has_members = node.body.has_members();
        let slot = match &mut node.body {
            TypeBody::Structure { flags, .. } | TypeBody::Union { flags, .. } => {
                &mut flags.extensibility
            }
            TypeBody::Enumeration {
                extensibility: e, ..
            }
            | TypeBody::Bitmask {
                extensibility: e, ..
            } => e,
            _ => return Err(Error::bad_param("type has no extensibility")),
        };
        if has_members {
            return Err(Error::precondition("members already added"));
        }
        *slot = extensibility;
        Ok(())
    }

    /// Mark a struct or union as nested (not a topic type on its own).
    pub fn set_nested(&self, nested: bool) -> Result<()> {
        let mut node = self.lock_constructing()?;
        let has_members = node.body.has_members();
        let flags = node.body.aggregate_flags()?;
        if has_members {
            return Err(Error::precondition("members already added"));
        }
        flags.nested = nested;
        Ok(())
    }

    /// Member id assignment for a struct or union.
    pub fn set_autoid(&self, autoid: AutoId) -> Result<()> {
        let mut node = self.lock_constructing()?;
        let has_members = node.body.has_members();
        let flags = node.body.aggregate_flags()?;
        if has_members {
            return Err(Error::precondition("members already added"));
        }
        flags.autoid = autoid;
        Ok(())
    }

    /// Bit bound of an enumeration (1..=32) or bitmask (1..=64).
    pub fn set_bit_bound(&self, bound: u16) -> Result<()> {
        let mut node = self.lock_constructing()?;
        let has_members = node.body.has_members();
        let (slot, max) = match &mut node.body {
            TypeBody::Enumeration { bit_bound, .. } => (bit_bound, 32),
            TypeBody::Bitmask { bit_bound, .. } => (bit_bound, 64),
            _ => return Err(Error::bad_param("type has no bit bound")),
        };
        if bound == 0 || bound > max {
            return Err(Error::bad_param(format!("bit bound {} out of range", bound)));
        }
        if has_members {
            return Err(Error::precondition("members already added"));
        }
        *slot = bound;
        Ok(())
    }

    pub fn member_set_key(&self, member_id: u32, is_key: bool) -> Result<()> {
        self.set_member_flag(member_id, false, |f| f.key = is_key)
    }

    pub fn member_set_optional(&self, member_id: u32, is_optional: bool) -> Result<()> {
        self.set_member_flag(member_id, false, |f| f.optional = is_optional)
    }

    pub fn member_set_must_understand(&self, member_id: u32, value: bool) -> Result<()> {
        self.set_member_flag(member_id, false, |f| f.must_understand = value)
    }

    /// Allowed on struct and union members.
    pub fn member_set_external(&self, member_id: u32, is_external: bool) -> Result<()> {
        self.set_member_flag(member_id, true, |f| f.external = is_external)
    }

    fn set_member_flag(
        &self,
        member_id: u32,
        union_allowed: bool,
        set: impl FnOnce(&mut MemberFlags),
    ) -> Result<()> {
        let mut node = self.lock_constructing()?;
        let members = match &mut node.body {
            TypeBody::Structure { members, .. } => members,
            TypeBody::Union { members, .. } if union_allowed => members,
            _ => return Err(Error::bad_param("member property not applicable")),
        };
        let member = members
            .iter_mut()
            .find(|m| m.id == member_id)
            .ok_or_else(|| Error::bad_param(format!("no member with id {}", member_id)))?;
        set(&mut member.flags);
        Ok(())
    }

    /// Re-assign the id of a member from `hash_name`. The type must use
    /// [`AutoId::Hash`].
    pub fn member_set_hashid(&self, member_id: u32, hash_name: &str) -> Result<()> {
        let mut node = self.lock_constructing()?;
        let flags = *node.body.aggregate_flags()?;
        if flags.autoid != AutoId::Hash {
            return Err(Error::precondition("type does not use hashed member ids"));
        }
        let id = member_hashid(hash_name);
        let members = match &mut node.body {
            TypeBody::Structure { members, .. } | TypeBody::Union { members, .. } => members,
            _ => return Err(Error::bad_param("not a struct or union")),
        };
        let index = members
            .iter()
            .position(|m| m.id == member_id)
            .ok_or_else(|| Error::bad_param(format!("no member with id {}", member_id)))?;
        if members.iter().any(|m| m.id == id) {
            return Err(Error::bad_param(format!("member id {} already in use", id)));
        }
        members[index].id = id;
        Ok(())
    }

    /// Members of a struct or union in declaration order.
    pub fn members(&self) -> Vec<MemberInfo> {
        let node = self.inner.node.lock();
        let members = match &node.body {
            TypeBody::Structure { members, .. } | TypeBody::Union { members, .. } => members,
            _ => return Vec::new(),
        };
        members
            .iter()
            .map(|m| MemberInfo {
                name: m.name.clone(),
                id: m.id,
                kind: m.ty.kind(),
                is_key: m.flags.key,
                is_optional: m.flags.optional,
                is_external: m.flags.external,
                is_must_understand: m.flags.must_understand,
                labels: m.labels.clone(),
                is_default: m.is_default,
            })
            .collect()
    }

    pub fn enum_literals(&self) -> Vec<EnumLiteral> {
        match &self.inner.node.lock().body {
            TypeBody::Enumeration { literals, .. } => literals.clone(),
            _ => Vec::new(),
        }
    }

    pub fn bitmask_fields(&self) -> Vec<BitFlag> {
        match &self.inner.node.lock().body {
            TypeBody::Bitmask { fields, .. } => fields.clone(),
            _ => Vec::new(),
        }
    }

    pub fn extensibility(&self) -> Option<Extensibility> {
        match &self.inner.node.lock().body {
            TypeBody::Structure { flags, .. } | TypeBody::Union { flags, .. } => {
                Some(flags.extensibility)
            }
            TypeBody::Enumeration { extensibility, .. }
            | TypeBody::Bitmask { extensibility, .. } => Some(*extensibility),
            _ => None,
        }
    }

    pub fn bit_bound(&self) -> Option<u16> {
        match &self.inner.node.lock().body {
            TypeBody::Enumeration { bit_bound, .. } | TypeBody::Bitmask { bit_bound, .. } => {
                Some(*bit_bound)
            }
            _ => None,
        }
    }

    /// Element type of an array or sequence.
    pub fn element_type(&self) -> Option<DynamicType> {
        match &self.inner.node.lock().body {
            TypeBody::Array { element, .. } | TypeBody::Sequence { element, .. } => {
                Some(element.clone())
            }
            _ => None,
        }
    }

    /// Aliased type, or the base of a derived struct.
    pub fn base_type(&self) -> Option<DynamicType> {
        match &self.inner.node.lock().body {
            TypeBody::Alias { base } => Some(base.clone()),
            TypeBody::Structure { base, .. } => base.clone(),
            _ => None,
        }
    }
}

impl fmt::Debug for DynamicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.inner.node.lock();
        let mut s = f.debug_struct("DynamicType");
        s.field("kind", &node.body.kind()).field("name", &node.name);
        if let TypeState::Resolved(id) = node.state {
            s.field("id", &id);
        }
        s.finish()
    }
}

/// Turn a spec into a resolved type usable inside another type.
fn embed(
    domain_id: u32,
    spec: &DynamicTypeSpec,
    container: Option<&DynamicType>,
) -> Result<DynamicType> {
    match spec {
        DynamicTypeSpec::Unset => Err(Error::bad_param("type spec not set")),
        DynamicTypeSpec::Primitive(p) => {
            let ty = DynamicType::from_body(domain_id, String::new(), TypeBody::Primitive(*p));
            ty.complete()?;
            Ok(ty)
        }
        DynamicTypeSpec::Definition(ty) => {
            if ty.inner.domain_id != domain_id {
                return Err(Error::bad_param("type belongs to another domain"));
            }
            if container.is_some_and(|c| c.ptr_eq(ty)) {
                return Err(Error::bad_param("type cannot contain itself"));
            }
            ty.complete()?;
            Ok(ty.clone())
        }
    }
}

fn discriminator_valid(spec: &DynamicTypeSpec) -> Result<()> {
    let ok = match spec {
        DynamicTypeSpec::Unset => false,
        DynamicTypeSpec::Primitive(p) => p.is_discriminator(),
        DynamicTypeSpec::Definition(ty) => matches!(
            ty.kind(),
            DynamicTypeKind::Enumeration | DynamicTypeKind::Alias
        ),
    };
    if ok {
        Ok(())
    } else {
        Err(Error::bad_param("invalid union discriminator type"))
    }
}

fn assign_member_id(
    flags: TypeFlags,
    members: &[Member],
    name: &str,
    requested: Option<u32>,
) -> Result<u32> {
    let id = match requested {
        Some(id) => id,
        None => match flags.autoid {
            AutoId::Hash => member_hashid(name),
            AutoId::Sequential => members.iter().map(|m| m.id + 1).max().unwrap_or(0),
        },
    };
    if id & !MEMBER_ID_MASK != 0 {
        return Err(Error::bad_param(format!("member id {:#x} out of range", id)));
    }
    if members.iter().any(|m| m.id == id) {
        return Err(Error::bad_param(format!("duplicate member id {}", id)));
    }
    Ok(id)
}

fn insert_member(members: &mut Vec<Member>, index: Option<usize>, member: Member) {
    let at = index.map_or(members.len(), |i| i.min(members.len()));
    members.insert(at, member);
}

fn add_struct_member(
    flags: TypeFlags,
    members: &mut Vec<Member>,
    d: MemberDescriptor,
    ty: DynamicType,
) -> Result<()> {
    let id = assign_member_id(flags, members, &d.name, d.id)?;
    insert_member(
        members,
        d.index,
        Member {
            name: d.name,
            id,
            ty,
            flags: MemberFlags::default(),
            labels: Vec::new(),
            is_default: false,
        },
    );
    Ok(())
}

fn add_union_member(
    flags: TypeFlags,
    members: &mut Vec<Member>,
    d: MemberDescriptor,
    ty: DynamicType,
) -> Result<()> {
    let id = assign_member_id(flags, members, &d.name, d.id)?;
    for m in members.iter() {
        if d.default_label && m.is_default {
            return Err(Error::bad_param("union already has a default member"));
        }
        if let Some(l) = d.labels.iter().find(|l| m.labels.contains(l)) {
            return Err(Error::bad_param(format!("duplicate case label {}", l)));
        }
    }
    let labels = if d.default_label { Vec::new() } else { d.labels };
    insert_member(
        members,
        d.index,
        Member {
            name: d.name,
            id,
            ty,
            flags: MemberFlags::default(),
            labels,
            is_default: d.default_label,
        },
    );
    Ok(())
}
