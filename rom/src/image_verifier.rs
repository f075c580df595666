// Licensed under the Apache-2.0 license

//! Streaming integrity check of a candidate firmware image.
//!
//! Walks the section table, folding every payload byte into an 8-bit XOR
//! accumulator, and compares the result against the checksum byte stored in
//! the image's final 16-byte block. Reads go through a caller-owned
//! [`Scratch`] buffer, so a section of any length verifies in constant RAM.

use crate::flash::hil::FlashStorage;
use crate::image::{
    ImageHeaderKind, RawImageHeader, SectionHeader, CHECKSUM_INIT, EXTENDED_HEADER_LEN,
    IMAGE_HEADER_LEN, SECTION_HEADER_LEN,
};
use zerocopy::FromBytes;

pub const SCRATCH_SIZE: usize = 256;

/// Caller-owned read buffer bounding all streaming flash reads.
pub struct Scratch {
    buf: [u8; SCRATCH_SIZE],
}

impl Scratch {
    pub const fn new() -> Self {
        Scratch {
            buf: [0; SCRATCH_SIZE],
        }
    }
}

impl Default for Scratch {
    fn default() -> Self {
        Self::new()
    }
}

/// A successfully verified image and the address execution starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedImage {
    pub run_address: u32,
}

pub struct ImageVerifier<'a> {
    flash: &'a dyn FlashStorage,
}

impl<'a> ImageVerifier<'a> {
    pub fn new(flash: &'a dyn FlashStorage) -> Self {
        ImageVerifier { flash }
    }

    /// Verifies the image at `flash_offset`. `None` means the slot holds
    /// nothing bootable: unprogrammed offset, unknown header, short read or
    /// checksum mismatch all land here, deliberately indistinguishable.
    pub fn verify(&self, flash_offset: u32, scratch: &mut Scratch) -> Option<VerifiedImage> {
        // 0 and all-ones both mean "slot not programmed"
        if flash_offset == 0 || flash_offset == u32::MAX {
            return None;
        }

        let mut raw = [0u8; EXTENDED_HEADER_LEN];
        self.flash.read(&mut raw, flash_offset as usize).ok()?;
        let kind = ImageHeaderKind::decode(&raw)?;

        let mut pos: usize;
        let run_address: u32;
        let mut sections: u32;
        // set while the leading library section is being walked as if it
        // were a normal section; the real count is picked up from the inner
        // header that follows it
        let mut library_pending = false;

        match kind {
            ImageHeaderKind::Legacy { section_count } => {
                run_address = flash_offset;
                pos = flash_offset as usize + IMAGE_HEADER_LEN;
                sections = section_count as u32;
            }
            ImageHeaderKind::Extended { library_len, .. } => {
                run_address = flash_offset
                    .checked_add(library_len)?
                    .checked_add(EXTENDED_HEADER_LEN as u32)?;
                if cfg!(feature = "library-checksum") {
                    // re-read the extended header's trailing words as the
                    // library section's (address, length) pair and fold the
                    // library bytes into the checksum
                    pos = flash_offset as usize + IMAGE_HEADER_LEN;
                    sections = 1;
                    library_pending = true;
                } else {
                    // skip the library section; the legacy-format header
                    // repeats at the run address
                    pos = run_address as usize;
                    let mut inner = [0u8; IMAGE_HEADER_LEN];
                    self.flash.read(&mut inner, pos).ok()?;
                    let inner = RawImageHeader::read_from_bytes(&inner[..]).ok()?;
                    sections = inner.section_count as u32;
                    pos += IMAGE_HEADER_LEN;
                }
            }
        }

        let mut chksum = CHECKSUM_INIT;
        let mut done = 0u32;
        while done < sections {
            let mut raw = [0u8; SECTION_HEADER_LEN];
            self.flash.read(&mut raw, pos).ok()?;
            let section = SectionHeader::read_from_bytes(&raw[..]).ok()?;
            pos += SECTION_HEADER_LEN;

            let mut remaining = section.length.get() as usize;
            while remaining > 0 {
                let block = remaining.min(SCRATCH_SIZE);
                let buf = &mut scratch.buf[..block];
                self.flash.read(buf, pos).ok()?;
                for byte in buf.iter() {
                    chksum ^= byte;
                }
                pos += block;
                remaining -= block;
            }
            done += 1;

            if library_pending {
                // the library section is behind us; the real section table
                // starts with the legacy-format header here
                let mut inner = [0u8; IMAGE_HEADER_LEN];
                self.flash.read(&mut inner, pos).ok()?;
                let inner = RawImageHeader::read_from_bytes(&inner[..]).ok()?;
                pos += IMAGE_HEADER_LEN;
                sections = done + inner.section_count as u32;
                library_pending = false;
            }
        }

        // the stored checksum is the last byte of the 16-byte block the
        // image ends in
        pos |= 0xf;
        let mut stored = [0u8; 1];
        self.flash.read(&mut stored, pos).ok()?;
        if stored[0] != chksum {
            return None;
        }

        Some(VerifiedImage { run_address })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::flash::fake_flash::FakeFlash;
    use crate::image::{IMAGE_EXTENDED_TAG, IMAGE_MAGIC, IMAGE_MAGIC_EXTENDED};
    use rand::{Rng, RngCore, SeedableRng};

    const IMAGE_OFFSET: u32 = 0x2000;
    const ENTRY: u32 = 0x4010_0000;

    fn xor(bytes: &[u8]) -> u8 {
        bytes.iter().fold(0, |acc, b| acc ^ b)
    }

    /// Serializes a legacy image: header, sections, zero padding, checksum
    /// as the last byte of the final 16-byte block.
    fn build_legacy(sections: &[(u32, Vec<u8>)]) -> Vec<u8> {
        let mut out = vec![IMAGE_MAGIC, sections.len() as u8, 0, 0];
        out.extend_from_slice(&ENTRY.to_le_bytes());
        let mut chksum = CHECKSUM_INIT;
        for (addr, payload) in sections {
            out.extend_from_slice(&addr.to_le_bytes());
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(payload);
            chksum ^= xor(payload);
        }
        while out.len() % 16 != 15 {
            out.push(0);
        }
        out.push(chksum);
        out
    }

    /// Serializes an extended image: extended header, library payload, inner
    /// legacy header, sections, padding, checksum. The checksum covers the
    /// library bytes only when the verifier is built to include them.
    fn build_extended(library: &[u8], sections: &[(u32, Vec<u8>)]) -> Vec<u8> {
        let mut out = vec![IMAGE_MAGIC_EXTENDED, IMAGE_EXTENDED_TAG, 0, 0];
        out.extend_from_slice(&ENTRY.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // library load offset
        out.extend_from_slice(&(library.len() as u32).to_le_bytes());
        out.extend_from_slice(library);
        out.extend_from_slice(&[IMAGE_MAGIC, sections.len() as u8, 0, 0]);
        out.extend_from_slice(&ENTRY.to_le_bytes());
        let mut chksum = CHECKSUM_INIT;
        if cfg!(feature = "library-checksum") {
            chksum ^= xor(library);
        }
        for (addr, payload) in sections {
            out.extend_from_slice(&addr.to_le_bytes());
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(payload);
            chksum ^= xor(payload);
        }
        while out.len() % 16 != 15 {
            out.push(0);
        }
        out.push(chksum);
        out
    }

    fn flash_with(image: &[u8]) -> FakeFlash {
        let flash = FakeFlash::new(0x10_0000);
        flash.program(IMAGE_OFFSET as usize, image);
        flash
    }

    #[test]
    fn test_unprogrammed_slot_rejected() {
        let flash = FakeFlash::new(0x10_0000);
        let verifier = ImageVerifier::new(&flash);
        let mut scratch = Scratch::new();
        assert_eq!(verifier.verify(0, &mut scratch), None);
        assert_eq!(verifier.verify(u32::MAX, &mut scratch), None);
        // erased flash at a real offset has no valid magic either
        assert_eq!(verifier.verify(IMAGE_OFFSET, &mut scratch), None);
    }

    #[test]
    fn test_legacy_image_verifies_at_its_offset() {
        let image = build_legacy(&[(0x4000_0000, vec![0x55; 40]), (0x4000_1000, vec![0xa3; 7])]);
        let flash = flash_with(&image);
        let verifier = ImageVerifier::new(&flash);
        let mut scratch = Scratch::new();
        assert_eq!(
            verifier.verify(IMAGE_OFFSET, &mut scratch),
            Some(VerifiedImage {
                run_address: IMAGE_OFFSET
            })
        );
    }

    #[test]
    fn test_zero_section_image() {
        let image = build_legacy(&[]);
        let flash = flash_with(&image);
        let verifier = ImageVerifier::new(&flash);
        assert!(verifier
            .verify(IMAGE_OFFSET, &mut Scratch::new())
            .is_some());
    }

    #[test]
    fn test_sections_larger_than_scratch() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut payload = vec![0u8; 3 * SCRATCH_SIZE + 13];
        rng.fill_bytes(&mut payload);
        let image = build_legacy(&[(0x4000_0000, payload)]);
        let flash = flash_with(&image);
        let verifier = ImageVerifier::new(&flash);
        assert!(verifier
            .verify(IMAGE_OFFSET, &mut Scratch::new())
            .is_some());
    }

    #[test]
    fn test_extended_image_run_address_skips_library() {
        let library = vec![0x11; 0x130];
        let image = build_extended(&library, &[(0x4000_0000, vec![0x22; 64])]);
        let flash = flash_with(&image);
        let verifier = ImageVerifier::new(&flash);
        assert_eq!(
            verifier.verify(IMAGE_OFFSET, &mut Scratch::new()),
            Some(VerifiedImage {
                run_address: IMAGE_OFFSET + 0x130 + EXTENDED_HEADER_LEN as u32
            })
        );
    }

    #[test]
    fn test_any_flipped_payload_byte_fails() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(99);
        let mut payload = vec![0u8; 300];
        rng.fill_bytes(&mut payload);
        let image = build_legacy(&[(0x4000_0000, payload)]);
        // flip one random payload byte per round
        for _ in 0..8 {
            let mut corrupt = image.clone();
            let idx = 16 + rng.gen_range(0..300);
            corrupt[idx] ^= 1 << rng.gen_range(0..8);
            let flash = flash_with(&corrupt);
            let verifier = ImageVerifier::new(&flash);
            assert_eq!(verifier.verify(IMAGE_OFFSET, &mut Scratch::new()), None);
        }
    }

    #[test]
    fn test_flipped_stored_checksum_fails() {
        let image = build_legacy(&[(0x4000_0000, vec![0x5a; 24])]);
        let mut corrupt = image.clone();
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0x01;
        let flash = flash_with(&corrupt);
        let verifier = ImageVerifier::new(&flash);
        assert_eq!(verifier.verify(IMAGE_OFFSET, &mut Scratch::new()), None);
    }

    #[test]
    fn test_flipped_library_byte() {
        let library = vec![0x77; 0x40];
        let mut image = build_extended(&library, &[(0x4000_0000, vec![0x22; 16])]);
        image[EXTENDED_HEADER_LEN + 5] ^= 0x80; // inside the library section
        let flash = flash_with(&image);
        let verifier = ImageVerifier::new(&flash);
        let result = verifier.verify(IMAGE_OFFSET, &mut Scratch::new());
        if cfg!(feature = "library-checksum") {
            assert_eq!(result, None);
        } else {
            // the library section is not covered by the checksum
            assert!(result.is_some());
        }
    }

    #[test]
    fn test_read_error_fails_closed() {
        let image = build_legacy(&[(0x4000_0000, vec![0x5a; 24])]);
        let flash = flash_with(&image);
        flash.set_fail_reads(true);
        let verifier = ImageVerifier::new(&flash);
        assert_eq!(verifier.verify(IMAGE_OFFSET, &mut Scratch::new()), None);
    }
}
