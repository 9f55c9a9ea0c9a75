//! Frame header packing/unpacking: the 24-byte ADB message header, checksum,
//! and the tag <-> id mapping. Mirrors `py_adb.common.packager.MessagePackager`.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::ProtocolError;

pub const HEADER_LEN: usize = 24;
const MAGIC: u32 = 0xFFFF_FFFF;

/// The fixed set of ADB wire tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Cnxn,
    Auth,
    Open,
    Okay,
    Wrte,
    Clse,
    Sync,
}

impl Tag {
    const ALL: [Tag; 7] = [
        Tag::Cnxn,
        Tag::Auth,
        Tag::Open,
        Tag::Okay,
        Tag::Wrte,
        Tag::Clse,
        Tag::Sync,
    ];

    fn ascii(self) -> &'static [u8; 4] {
        match self {
            Tag::Cnxn => b"CNXN",
            Tag::Auth => b"AUTH",
            Tag::Open => b"OPEN",
            Tag::Okay => b"OKAY",
            Tag::Wrte => b"WRTE",
            Tag::Clse => b"CLSE",
            Tag::Sync => b"SYNC",
        }
    }

    /// Derives the little-endian 32-bit id for this tag from its ASCII bytes.
    pub fn id(self) -> u32 {
        id_for_ascii(self.ascii())
    }

    /// Maps a wire id back to a tag, or `UnknownTag` if it matches none of the fixed set.
    pub fn from_id(id: u32) -> Result<Tag, ProtocolError> {
        Tag::ALL
            .into_iter()
            .find(|t| t.id() == id)
            .ok_or(ProtocolError::UnknownTag(id))
    }
}

fn id_for_ascii(b: &[u8; 4]) -> u32 {
    (b[0] as u32) | ((b[1] as u32) << 8) | ((b[2] as u32) << 16) | ((b[3] as u32) << 24)
}

/// One ADB protocol message: a fixed header plus an opaque payload.
#[derive(Debug, Clone)]
pub struct Frame {
    pub tag: Tag,
    pub arg0: u32,
    pub arg1: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(tag: Tag, arg0: u32, arg1: u32, payload: Vec<u8>) -> Self {
        Self { tag, arg0, arg1, payload }
    }

    /// Packs the 24-byte header for this frame. The payload is written separately
    /// by the transport to mirror the device's two-write framing.
    pub fn pack_header(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        let id = self.tag.id();
        LittleEndian::write_u32(&mut buf[0..4], id);
        LittleEndian::write_u32(&mut buf[4..8], self.arg0);
        LittleEndian::write_u32(&mut buf[8..12], self.arg1);
        LittleEndian::write_u32(&mut buf[12..16], self.payload.len() as u32);
        LittleEndian::write_u32(&mut buf[16..20], checksum(&self.payload));
        LittleEndian::write_u32(&mut buf[20..24], id ^ MAGIC);
        buf
    }
}

/// The decoded fields of a header, before the payload has been read off the wire.
#[derive(Debug, Clone, Copy)]
pub struct UnpackedHeader {
    pub tag: Tag,
    pub arg0: u32,
    pub arg1: u32,
    pub data_len: u32,
    pub checksum: u32,
}

/// Unpacks a 24-byte header, validating the tag id and the magic word.
pub fn unpack_header(bytes: &[u8]) -> Result<UnpackedHeader, ProtocolError> {
    if bytes.len() < HEADER_LEN {
        return Err(ProtocolError::ShortHeader(bytes.len()));
    }
    let id = LittleEndian::read_u32(&bytes[0..4]);
    let arg0 = LittleEndian::read_u32(&bytes[4..8]);
    let arg1 = LittleEndian::read_u32(&bytes[8..12]);
    let data_len = LittleEndian::read_u32(&bytes[12..16]);
    let checksum = LittleEndian::read_u32(&bytes[16..20]);
    let magic = LittleEndian::read_u32(&bytes[20..24]);
    let tag = Tag::from_id(id)?;
    let expected = id ^ MAGIC;
    if magic != expected {
        return Err(ProtocolError::MagicMismatch { magic, expected });
    }
    Ok(UnpackedHeader { tag, arg0, arg1, data_len, checksum })
}

/// The ADB checksum: the sum of all payload bytes, wrapped to 32 bits.
pub fn checksum(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32))
}

/// Verifies a payload against the checksum carried in its header.
pub fn verify(payload: &[u8], expected: u32) -> Result<(), ProtocolError> {
    let computed = checksum(payload);
    if computed != expected {
        return Err(ProtocolError::ChecksumMismatch { expected, computed });
    }
    Ok(())
}
