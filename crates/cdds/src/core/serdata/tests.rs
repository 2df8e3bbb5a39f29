// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::*;
use crate::core::ser::{Endianness, CDR_BE, CDR_LE};

#[derive(Debug, Default, Clone, PartialEq)]
struct Pair {
    key: String,
    value: String,
}

impl TopicType for Pair {
    fn type_name() -> &'static str {
        "Test::Pair"
    }
    fn has_key() -> bool {
        true
    }
    fn encode(&self, w: &mut CdrWriter) -> SerResult<()> {
        w.write_string(&self.key)?;
        w.write_string(&self.value)
    }
    fn decode(r: &mut Cursor<'_>) -> SerResult<Self> {
        Ok(Self {
            key: r.read_string()?,
            value: r.read_string()?,
        })
    }
    fn encode_key(&self, w: &mut CdrWriter) -> SerResult<()> {
        w.write_string(&self.key)
    }
    fn decode_key(&mut self, r: &mut Cursor<'_>) -> SerResult<()> {
        self.key = r.read_string()?;
        Ok(())
    }
    fn key_is_valid(&self) -> bool {
        !self.key.is_empty()
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Point {
    id: u32,
    x: i32,
}

impl TopicType for Point {
    fn type_name() -> &'static str {
        "Test::Point"
    }
    fn has_key() -> bool {
        true
    }
    fn key_size_bound() -> Option<usize> {
        Some(4)
    }
    fn fixed_size() -> bool {
        true
    }
    fn encode(&self, w: &mut CdrWriter) -> SerResult<()> {
        w.write_u32(self.id)?;
        w.write_i32(self.x)
    }
    fn decode(r: &mut Cursor<'_>) -> SerResult<Self> {
        Ok(Self {
            id: r.read_u32()?,
            x: r.read_i32()?,
        })
    }
    fn encode_key(&self, w: &mut CdrWriter) -> SerResult<()> {
        w.write_u32(self.id)
    }
    fn decode_key(&mut self, r: &mut Cursor<'_>) -> SerResult<()> {
        self.id = r.read_u32()?;
        Ok(())
    }
}

fn pair(key: &str, value: &str) -> Pair {
    Pair {
        key: key.into(),
        value: value.into(),
    }
}

fn wire(sd: &dyn Serdata) -> Vec<u8> {
    let mut buf = vec![0u8; sd.get_size()];
    sd.to_ser(0, &mut buf).expect("to_ser");
    buf
}

#[test]
fn aap_banaan_roundtrip() {
    let st = DefaultSertype::<Pair>::new();
    let original = pair("aap", "banaan");
    let sd = st
        .from_sample(SerdataKind::Data, &original)
        .expect("from_sample");
    assert_eq!(sd.kind(), SerdataKind::Data);

    let bytes = wire(sd.as_ref());
    assert_eq!(&bytes[..4], &CDR_LE);

    let frags = [
        Fragment { offset: 0, bytes: &bytes[..7] },
        Fragment { offset: 5, bytes: &bytes[5..] },
    ];
    let sd2 = st
        .from_ser(SerdataKind::Data, &frags, bytes.len())
        .expect("from_ser");
    assert!(sd.eqkey(sd2.as_ref()));
    assert_eq!(sd.hash(), sd2.hash());

    let mut out = Pair::default();
    sd2.to_sample(&mut out).expect("to_sample");
    assert_eq!(out, original);
}

#[test]
fn key_only_roundtrip_leaves_other_fields() {
    let st = DefaultSertype::<Pair>::new();
    let sd = st
        .from_sample(SerdataKind::Key, &pair("aap", "banaan"))
        .expect("from_sample");
    assert_eq!(sd.kind(), SerdataKind::Key);

    let bytes = wire(sd.as_ref());
    let iov = [IoSlice::new(&bytes[..3]), IoSlice::new(&bytes[3..])];
    let sd2 = st
        .from_ser_iov(SerdataKind::Key, &iov, bytes.len())
        .expect("from_ser_iov");

    let mut out = pair("", "noot");
    sd2.to_sample(&mut out).expect("to_sample");
    assert_eq!(out, pair("aap", "noot"));
}

#[test]
fn test_to_untyped_keeps_key_and_hash() {
    let st = DefaultSertype::<Pair>::new();
    let sd = st
        .from_sample(SerdataKind::Data, &pair("mies", "wim"))
        .expect("from_sample");
    sd.set_timestamp(1234);
    sd.set_statusinfo(STATUSINFO_DISPOSE);

    let key = sd.to_untyped();
    assert_eq!(key.kind(), SerdataKind::Key);
    assert_eq!(key.hash(), sd.hash());
    assert!(key.eqkey(sd.as_ref()));
    assert_eq!(key.timestamp(), 1234);
    assert_eq!(key.statusinfo(), STATUSINFO_DISPOSE);

    let mut out = Pair::default();
    key.untyped_to_sample(&mut out).expect("untyped_to_sample");
    assert_eq!(out.key, "mies");
    assert!(out.value.is_empty());
}

#[test]
fn test_from_sample_rejects_foreign_type_and_invalid_key() {
    let st = DefaultSertype::<Pair>::new();
    let err = st
        .from_sample(SerdataKind::Data, &Point::default())
        .expect_err("foreign type");
    assert!(matches!(err, crate::dds::Error::BadParameter(_)));

    let err = st
        .from_sample(SerdataKind::Data, &pair("", "x"))
        .expect_err("empty key");
    assert!(matches!(err, crate::dds::Error::BadParameter(_)));

    let sd = st
        .from_sample(SerdataKind::Data, &pair("k", "v"))
        .expect("from_sample");
    let mut wrong = Point::default();
    assert!(sd.to_sample(&mut wrong).is_err());
}

#[test]
fn test_fragment_gap_is_rejected() {
    let st = DefaultSertype::<Point>::new();
    let sd = st
        .from_sample(SerdataKind::Data, &Point { id: 1, x: 2 })
        .expect("from_sample");
    let bytes = wire(sd.as_ref());
    let frags = [
        Fragment { offset: 0, bytes: &bytes[..4] },
        Fragment { offset: 6, bytes: &bytes[6..] },
    ];
    assert!(st.from_ser(SerdataKind::Data, &frags, bytes.len()).is_err());
    assert!(st
        .from_ser(SerdataKind::Data, &frags[..1], bytes.len())
        .is_err());
}

#[test]
fn test_keyhash_short_key_is_padded_and_recoverable() {
    let st = DefaultSertype::<Point>::new();
    let sd = st
        .from_sample(SerdataKind::Data, &Point { id: 0x0102_0304, x: -1 })
        .expect("from_sample");

    let kh = sd.get_keyhash(false);
    assert_eq!(&kh.0[..4], &[1, 2, 3, 4]);
    assert!(kh.0[4..].iter().all(|b| *b == 0));
    assert_ne!(sd.get_keyhash(true), kh);

    let key = st.from_keyhash(&kh).expect("recoverable key");
    assert!(key.eqkey(sd.as_ref()));
    assert_eq!(key.hash(), sd.hash());

    let mut garbage = kh;
    garbage.0[15] = 9;
    assert!(st.from_keyhash(&garbage).is_none());
}

#[test]
fn test_keyhash_unbounded_key_uses_md5() {
    let st = DefaultSertype::<Pair>::new();
    let sd = st
        .from_sample(SerdataKind::Data, &pair("a", "b"))
        .expect("from_sample");
    assert_eq!(sd.get_keyhash(false), sd.get_keyhash(true));
    assert!(st.from_keyhash(&sd.get_keyhash(false)).is_none());
}

#[test]
fn test_big_endian_input_is_accepted() {
    let st = DefaultSertype::<Point>::new();
    let mut w = CdrWriter::new(Endianness::Big);
    w.write_u32(7).expect("u32");
    w.write_i32(-3).expect("i32");
    let mut bytes = CDR_BE.to_vec();
    bytes.extend_from_slice(w.as_slice());

    let frag = [Fragment { offset: 0, bytes: &bytes }];
    let sd = st
        .from_ser(SerdataKind::Data, &frag, bytes.len())
        .expect("from_ser");
    let mut out = Point::default();
    sd.to_sample(&mut out).expect("to_sample");
    assert_eq!(out, Point { id: 7, x: -3 });
    // Stored little-endian regardless of input order.
    assert_eq!(&wire(sd.as_ref())[..4], &CDR_LE);
}

#[test]
fn test_to_ser_ref_bounds() {
    let st = DefaultSertype::<Point>::new();
    let sd = st
        .from_sample(SerdataKind::Data, &Point { id: 1, x: 1 })
        .expect("from_sample");
    let r = sd.to_ser_ref(4, 4).expect("in range");
    assert_eq!(&*r, &1u32.to_le_bytes());
    sd.to_ser_unref(r);
    assert!(sd.to_ser_ref(8, 8).is_err());
}

#[test]
fn test_sample_array_management() {
    let st = DefaultSertype::<Point>::new();
    let mut arr = st.realloc_samples(None, 3);
    {
        let v = arr.downcast_mut::<Vec<Point>>().expect("vec");
        assert_eq!(v.len(), 3);
        v[1].id = 5;
    }
    let mut arr = st.realloc_samples(Some(arr), 5);
    assert_eq!(arr.downcast_ref::<Vec<Point>>().expect("vec")[1].id, 5);

    st.free_samples(arr.as_mut(), 5, FreeOp::Contents);
    let v = arr.downcast_ref::<Vec<Point>>().expect("vec");
    assert_eq!(v.len(), 5);
    assert_eq!(v[1], Point::default());

    st.free_samples(arr.as_mut(), 5, FreeOp::All);
    assert!(arr.downcast_ref::<Vec<Point>>().expect("vec").is_empty());
}

#[test]
fn test_sertype_equality_and_backlink() {
    let a = DefaultSertype::<Point>::new();
    let b = DefaultSertype::<Point>::new();
    let other = DefaultSertype::<Pair>::new();
    let renamed = DefaultSertype::<Point>::with_name("Other::Point");
    assert!(a.equal(b.as_ref()));
    assert!(!a.equal(other.as_ref()));
    assert!(!a.equal(renamed.as_ref()));

    let sd = a
        .from_sample(SerdataKind::Data, &Point::default())
        .expect("from_sample");
    let back = sd.sertype().expect("sertype alive");
    assert_eq!(back.type_name(), "Test::Point");
    assert!(sd.print().starts_with("Test::Point:data"));
}

#[test]
fn test_mh3_reference_values() {
    assert_eq!(mh3(b"", 0), 0);
    assert_eq!(mh3(b"", 1), 0x514e_28b7);
    assert_eq!(mh3(b"hello", 0), 0x248b_fa47);
}
