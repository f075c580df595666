// Licensed under the Apache-2.0 license

//! On-flash firmware image layout.
//!
//! Two header formats exist at the start of an image. The legacy format is
//! the 8-byte header immediately followed by the section table. The extended
//! format carries two extra words describing a leading "library" section;
//! the legacy-format header then repeats after that section and the normal
//! table begins. Raw magic bytes are decoded exactly once, into
//! [`ImageHeaderKind`].

use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// First byte of a legacy image header.
pub const IMAGE_MAGIC: u8 = 0xe9;
/// First byte of an extended image header.
pub const IMAGE_MAGIC_EXTENDED: u8 = 0xea;
/// Second byte of an extended image header (a version tag, stored where the
/// legacy format keeps its section count).
pub const IMAGE_EXTENDED_TAG: u8 = 0x04;
/// Initial value of the 8-bit XOR image checksum.
pub const CHECKSUM_INIT: u8 = 0xef;

pub const IMAGE_HEADER_LEN: usize = core::mem::size_of::<RawImageHeader>();
pub const EXTENDED_HEADER_LEN: usize = core::mem::size_of::<RawExtendedHeader>();
pub const SECTION_HEADER_LEN: usize = core::mem::size_of::<SectionHeader>();

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawImageHeader {
    pub magic: u8,
    pub section_count: u8,
    pub flags: [u8; 2],
    pub entry_point: U32<LittleEndian>,
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawExtendedHeader {
    pub magic: u8,
    pub tag: u8,
    pub flags: [u8; 2],
    pub entry_point: U32<LittleEndian>,
    pub library_offset: U32<LittleEndian>,
    pub library_len: U32<LittleEndian>,
}

/// One entry of the section table: a contiguous block to be loaded at
/// `load_address`, its payload following the header directly.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct SectionHeader {
    pub load_address: U32<LittleEndian>,
    pub length: U32<LittleEndian>,
}

/// Image header decoded from the raw magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageHeaderKind {
    Legacy {
        section_count: u8,
    },
    Extended {
        library_offset: u32,
        library_len: u32,
    },
}

impl ImageHeaderKind {
    /// Decodes the first bytes of an image. `None` for an unknown magic.
    pub fn decode(raw: &[u8; EXTENDED_HEADER_LEN]) -> Option<Self> {
        match raw[0] {
            IMAGE_MAGIC => Some(ImageHeaderKind::Legacy {
                section_count: raw[1],
            }),
            IMAGE_MAGIC_EXTENDED if raw[1] == IMAGE_EXTENDED_TAG => {
                let header = RawExtendedHeader::read_from_bytes(raw.as_slice()).ok()?;
                Some(ImageHeaderKind::Extended {
                    library_offset: header.library_offset.get(),
                    library_len: header.library_len.get(),
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_header_sizes() {
        assert_eq!(IMAGE_HEADER_LEN, 8);
        assert_eq!(EXTENDED_HEADER_LEN, 16);
        assert_eq!(SECTION_HEADER_LEN, 8);
    }

    #[test]
    fn test_decode_legacy() {
        let mut raw = [0u8; EXTENDED_HEADER_LEN];
        raw[0] = IMAGE_MAGIC;
        raw[1] = 3;
        assert_eq!(
            ImageHeaderKind::decode(&raw),
            Some(ImageHeaderKind::Legacy { section_count: 3 })
        );
    }

    #[test]
    fn test_decode_extended() {
        let mut raw = [0u8; EXTENDED_HEADER_LEN];
        raw[0] = IMAGE_MAGIC_EXTENDED;
        raw[1] = IMAGE_EXTENDED_TAG;
        raw[8..12].copy_from_slice(&0x10u32.to_le_bytes());
        raw[12..16].copy_from_slice(&0x400u32.to_le_bytes());
        assert_eq!(
            ImageHeaderKind::decode(&raw),
            Some(ImageHeaderKind::Extended {
                library_offset: 0x10,
                library_len: 0x400,
            })
        );
    }

    #[test]
    fn test_decode_rejects_unknown_magic() {
        let mut raw = [0u8; EXTENDED_HEADER_LEN];
        raw[0] = 0xff;
        assert_eq!(ImageHeaderKind::decode(&raw), None);
        // extended magic without the version tag is not a valid image either
        raw[0] = IMAGE_MAGIC_EXTENDED;
        raw[1] = 0x05;
        assert_eq!(ImageHeaderKind::decode(&raw), None);
    }
}
