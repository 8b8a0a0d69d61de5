//! Binary FBX reader
//!
//! Layout: a 23-byte magic, a little-endian `u32` version, then node records.
//! Each record starts with its end offset, property count and property list
//! length (`u32` before version 7500, `u64` from 7500 on) and a one-byte name
//! length. Nested records follow the properties and end with a zeroed record.

use std::io::Read;

use flate2::read::ZlibDecoder;

use super::document::{FbxDocument, FbxNode, Property};
use crate::error::LoadError;

pub const MAGIC: &[u8; 23] = b"Kaydara FBX Binary  \x00\x1a\x00";

/// Nested records deeper than this are treated as corrupt
const MAX_DEPTH: usize = 64;

pub fn is_binary(bytes: &[u8]) -> bool {
    bytes.len() >= 21 && bytes[..21] == MAGIC[..21]
}

pub fn parse(bytes: &[u8]) -> Result<FbxDocument, LoadError> {
    if !is_binary(bytes) {
        return Err(LoadError::Parse("missing binary FBX magic".to_string()));
    }
    let mut reader = Reader::new(bytes, MAGIC.len());
    let version = reader.u32()?;
    let wide = version >= 7500;
    // Old files are rejected by the caller before their layout matters
    if version < super::document::MIN_VERSION {
        return Ok(FbxDocument {
            version,
            roots: Vec::new(),
        });
    }

    let mut roots = Vec::new();
    while reader.remaining() > 0 {
        match read_node(&mut reader, wide, 0)? {
            Some(node) => roots.push(node),
            None => break,
        }
    }
    log::debug!("Binary FBX {} with {} top-level nodes", version, roots.len());
    Ok(FbxDocument { version, roots })
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], LoadError> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.bytes.len());
        match end {
            Some(end) => {
                let slice = &self.bytes[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(LoadError::IncompleteData(format!(
                "needed {} bytes at offset {}, file has {}",
                len,
                self.pos,
                self.bytes.len()
            ))),
        }
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], LoadError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, LoadError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, LoadError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, LoadError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn offset(&mut self, wide: bool) -> Result<u64, LoadError> {
        if wide {
            self.u64()
        } else {
            self.u32().map(u64::from)
        }
    }
}

fn read_node(reader: &mut Reader, wide: bool, depth: usize) -> Result<Option<FbxNode>, LoadError> {
    if depth > MAX_DEPTH {
        return Err(LoadError::Parse("node nesting is too deep".to_string()));
    }
    let end_offset = reader.offset(wide)?;
    let property_count = reader.offset(wide)?;
    let _property_list_len = reader.offset(wide)?;
    let name_len = reader.u8()? as usize;

    if end_offset == 0 {
        // Null record terminating a child list
        return Ok(None);
    }
    let end_offset = usize::try_from(end_offset)
        .map_err(|_| LoadError::Parse("record offset overflows".to_string()))?;
    if end_offset > reader.bytes.len() {
        return Err(LoadError::IncompleteData(format!(
            "record ends at {} beyond file length {}",
            end_offset,
            reader.bytes.len()
        )));
    }
    if end_offset < reader.pos {
        return Err(LoadError::Parse(format!(
            "record end {} precedes its header at {}",
            end_offset, reader.pos
        )));
    }

    let name = String::from_utf8_lossy(reader.take(name_len)?).into_owned();
    let mut node = FbxNode::new(name);
    for _ in 0..property_count {
        node.properties.push(read_property(reader)?);
    }

    while reader.pos < end_offset {
        match read_node(reader, wide, depth + 1)? {
            Some(child) => node.children.push(child),
            None => break,
        }
    }
    if reader.pos > end_offset {
        return Err(LoadError::Parse(format!(
            "node '{}' overruns its end offset",
            node.name
        )));
    }
    reader.pos = end_offset;
    Ok(Some(node))
}

fn read_property(reader: &mut Reader) -> Result<Property, LoadError> {
    let type_code = reader.u8()?;
    let property = match type_code {
        b'Y' => Property::I16(i16::from_le_bytes(reader.array()?)),
        b'C' => Property::Bool(reader.u8()? != 0),
        b'I' => Property::I32(i32::from_le_bytes(reader.array()?)),
        b'F' => Property::F32(f32::from_le_bytes(reader.array()?)),
        b'D' => Property::F64(f64::from_le_bytes(reader.array()?)),
        b'L' => Property::I64(i64::from_le_bytes(reader.array()?)),
        b'S' => {
            let len = reader.u32()? as usize;
            Property::String(String::from_utf8_lossy(reader.take(len)?).into_owned())
        }
        b'R' => {
            let len = reader.u32()? as usize;
            Property::Raw(reader.take(len)?.to_vec())
        }
        b'f' => Property::F32Array(
            read_array(reader, 4)?
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        b'd' => Property::F64Array(
            read_array(reader, 8)?
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect(),
        ),
        b'i' => Property::I32Array(
            read_array(reader, 4)?
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        b'l' => Property::I64Array(
            read_array(reader, 8)?
                .chunks_exact(8)
                .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect(),
        ),
        b'b' => Property::BoolArray(read_array(reader, 1)?.iter().map(|&b| b != 0).collect()),
        other => {
            return Err(LoadError::Parse(format!(
                "unknown property type '{}'",
                other as char
            )))
        }
    };
    Ok(property)
}

const MAX_INFLATE_RATIO: usize = 1032;

/// Reads an array payload, inflating it when zlib-encoded
fn read_array(reader: &mut Reader, element_size: usize) -> Result<Vec<u8>, LoadError> {
    let length = reader.u32()? as usize;
    let encoding = reader.u32()?;
    let compressed_len = reader.u32()? as usize;
    let expected = length
        .checked_mul(element_size)
        .ok_or_else(|| LoadError::Parse("array length overflows".to_string()))?;

    match encoding {
        0 => Ok(reader.take(expected)?.to_vec()),
        1 => {
            let compressed = reader.take(compressed_len)?;
            // Deflate cannot expand beyond ~1032:1
            let reserve = expected.min(compressed.len().saturating_mul(MAX_INFLATE_RATIO));
            let mut data = Vec::with_capacity(reserve);
            ZlibDecoder::new(compressed)
                .take(expected as u64 + 1)
                .read_to_end(&mut data)
                .map_err(|e| LoadError::Parse(format!("corrupt compressed array: {e}")))?;
            if data.len() != expected {
                return Err(LoadError::Parse(format!(
                    "compressed array inflated to {} bytes, expected {}",
                    data.len(),
                    expected
                )));
            }
            Ok(data)
        }
        other => Err(LoadError::UnsupportedFeature(format!(
            "array encoding {other}"
        ))),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn sample(version: u32) -> FbxDocument {
        FbxDocument {
            version,
            roots: vec![
                FbxNode::new("FBXHeaderExtension")
                    .with_child(FbxNode::new("FBXVersion").with_property(Property::I32(version as i32))),
                FbxNode::new("Objects").with_child(
                    FbxNode::new("Geometry")
                        .with_property(Property::I64(42))
                        .with_property(Property::String("Cube\u{0}\u{1}Geometry".into()))
                        .with_property(Property::String("Mesh".into()))
                        .with_child(
                            FbxNode::new("Vertices")
                                .with_property(Property::F64Array(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0])),
                        )
                        .with_child(
                            FbxNode::new("Flags").with_property(Property::BoolArray(vec![true, false])),
                        ),
                ),
            ],
        }
    }

    #[test]
    fn test_round_trip_32_and_64_bit_records() {
        for version in [7400, 7500] {
            let document = sample(version);
            let bytes = writer::encode(&document, false);
            assert!(is_binary(&bytes));
            assert_eq!(parse(&bytes).unwrap(), document);
        }
    }

    #[test]
    fn test_compressed_arrays_inflate() {
        let document = sample(7400);
        let bytes = writer::encode(&document, true);
        assert_eq!(parse(&bytes).unwrap(), document);
    }

    #[test]
    fn test_truncated_file_is_incomplete() {
        let bytes = writer::encode(&sample(7400), false);
        let truncated = &bytes[..bytes.len() / 2];
        assert!(matches!(parse(truncated), Err(LoadError::IncompleteData(_))));
    }

    fn compressed_array(count: u32, raw: &[u8]) -> Vec<u8> {
        use std::io::Write;

        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::best());
        encoder.write_all(raw).unwrap();
        let compressed = encoder.finish().unwrap();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&count.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&compressed);
        bytes
    }

    #[test]
    fn test_huge_declared_array_length_is_rejected() {
        let bytes = compressed_array(u32::MAX, &[0u8; 8]);
        let mut reader = Reader::new(&bytes, 0);
        assert!(matches!(read_array(&mut reader, 8), Err(LoadError::Parse(_))));
    }

    #[test]
    fn test_inflation_stops_past_declared_length() {
        // A megabyte of zeros claiming to be two doubles
        let bytes = compressed_array(2, &vec![0u8; 1 << 20]);
        let mut reader = Reader::new(&bytes, 0);
        match read_array(&mut reader, 8) {
            Err(LoadError::Parse(message)) => assert!(message.contains("17 bytes"), "{message}"),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_property_type() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&7400u32.to_le_bytes());
        let start = bytes.len();
        // end offset, one property, list length, name "X", type 'Z'
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(1);
        bytes.push(b'X');
        bytes.push(b'Z');
        let end = bytes.len() as u32;
        bytes[start..start + 4].copy_from_slice(&end.to_le_bytes());
        assert!(matches!(parse(&bytes), Err(LoadError::Parse(_))));
    }
}
