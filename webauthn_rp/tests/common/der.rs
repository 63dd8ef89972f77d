//! DER encoding helpers for building certificates and extensions
//!
//! Thin wrappers over `asn1_rs::ToDer` that work on already-encoded
//! children, which is how the fixtures assemble nested structures.

use std::borrow::Cow;

pub use x509_parser::asn1_rs::{Class, Tag};
use x509_parser::asn1_rs::{Any, Header, Integer, Length, Oid, Sequence, ToDer};

/// Any element with an explicit class and tag number.
pub fn encode_tagged(class: Class, constructed: bool, tag: u32, value: &[u8]) -> Vec<u8> {
    let header = Header::new(class, constructed, Tag(tag), Length::Definite(value.len()));
    Any::new(header, value)
        .to_der_vec()
        .expect("Failed to encode tagged element")
}

/// A universal element; SEQUENCE and SET are encoded constructed.
pub fn encode_tlv(tag: Tag, value: &[u8]) -> Vec<u8> {
    let constructed = matches!(tag, Tag::Sequence | Tag::Set);
    encode_tagged(Class::Universal, constructed, tag.0, value)
}

pub fn encode_sequence(items: &[Vec<u8>]) -> Vec<u8> {
    Sequence::new(Cow::Owned(items.concat()))
        .to_der_vec()
        .expect("Failed to encode sequence")
}

/// Non-negative INTEGER from a big-endian magnitude.
pub fn encode_integer(magnitude: &[u8]) -> Vec<u8> {
    let start = magnitude
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(magnitude.len());
    let mut content = magnitude[start..].to_vec();
    if content.first().is_none_or(|&b| b & 0x80 != 0) {
        content.insert(0, 0x00);
    }
    Integer::new(&content)
        .to_der_vec()
        .expect("Failed to encode integer")
}

pub fn encode_oid(arcs: &[u64]) -> Vec<u8> {
    Oid::from(arcs)
        .expect("Invalid object identifier")
        .to_der_vec()
        .expect("Failed to encode object identifier")
}

#[test]
fn test_integer_encoding() {
    assert_eq!(encode_integer(&[]), vec![0x02, 0x01, 0x00]);
    assert_eq!(encode_integer(&[0x00, 0x00, 0x05]), vec![0x02, 0x01, 0x05]);
    assert_eq!(encode_integer(&[0x80]), vec![0x02, 0x02, 0x00, 0x80]);
}

#[test]
fn test_high_tag_number_encoding() {
    // [702] origin from the Android key description
    assert_eq!(
        encode_tagged(Class::ContextSpecific, true, 702, &[0x02, 0x01, 0x00]),
        vec![0xBF, 0x85, 0x3E, 0x03, 0x02, 0x01, 0x00]
    );
}
