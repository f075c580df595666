// Licensed under the Apache-2.0 license

//! Persisted boot configuration record and the enums decoded from it.

use crate::flash::{SLOT_0, SLOT_1};
use bitflags::bitflags;
#[cfg(feature = "config-checksum")]
use core::mem::offset_of;
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Expected value of [`BootConfig::magic`].
pub const BOOT_CONFIG_MAGIC: u8 = 0xe1;
/// Expected value of [`BootConfig::version`].
pub const BOOT_CONFIG_VERSION: u8 = 0x01;
/// Capacity of the slot tables in [`BootConfig`].
pub const MAX_SLOTS: usize = 4;

bitflags! {
    /// Flags persisted in the [`BootConfig::mode`] byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModeFlags: u8 {
        /// Booting the fallback slot via the external pin override is enabled.
        const GPIO_OVERRIDE = 0x01;
    }
}

/// How the current boot was entered. Decoded once from [`ModeFlags`] and the
/// platform-sampled override pin; selection logic never re-reads raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    Standard,
    GpioOverride,
}

/// The boot configuration record, stored in one flash sector.
///
/// Packed little-endian layout; when the `config-checksum` feature is
/// enabled the final byte is the XOR of every preceding byte. The record is
/// only trusted when magic, version and checksum all hold; anything else is
/// regenerated from the compile-time flash map. A valid record additionally
/// keeps `current_rom < count` and `previous_rom < count`; the selection
/// path restores that invariant if it ever breaks.
#[repr(C, packed)]
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct BootConfig {
    pub magic: u8,
    pub version: u8,
    pub mode: u8,
    /// Slot to boot normally.
    pub current_rom: u8,
    /// Slot to roll back to if `current_rom` repeatedly fails to confirm.
    pub previous_rom: u8,
    /// Number of valid entries in `roms`.
    pub count: u8,
    /// Non-zero while the current slot has not yet confirmed a boot.
    pub is_first_boot: u8,
    pub boot_attempts: u8,
    pub fw_updated: u8,
    /// Flash byte offset of each candidate image.
    pub roms: [U32<LittleEndian>; MAX_SLOTS],
    /// Declared byte length of each candidate image.
    pub roms_sizes: [U32<LittleEndian>; MAX_SLOTS],
    #[cfg(feature = "config-checksum")]
    pub checksum: u8,
}

impl Default for BootConfig {
    fn default() -> Self {
        let mut roms = [U32::ZERO; MAX_SLOTS];
        let mut roms_sizes = [U32::ZERO; MAX_SLOTS];
        roms[0] = U32::new(SLOT_0.offset as u32);
        roms[1] = U32::new(SLOT_1.offset as u32);
        roms_sizes[0] = U32::new(SLOT_0.size as u32);
        roms_sizes[1] = U32::new(SLOT_1.size as u32);
        BootConfig {
            magic: BOOT_CONFIG_MAGIC,
            version: BOOT_CONFIG_VERSION,
            mode: ModeFlags::empty().bits(),
            current_rom: 0,
            previous_rom: 0,
            count: 2,
            is_first_boot: 0,
            boot_attempts: 0,
            fw_updated: 0,
            roms,
            roms_sizes,
            #[cfg(feature = "config-checksum")]
            checksum: 0,
        }
    }
}

impl BootConfig {
    pub fn mode_flags(&self) -> ModeFlags {
        ModeFlags::from_bits_truncate(self.mode)
    }

    pub fn set_mode_flags(&mut self, flags: ModeFlags) {
        self.mode = flags.bits();
    }

    pub fn slot_offset(&self, slot: u8) -> u32 {
        self.roms[slot as usize].get()
    }

    pub fn slot_size(&self, slot: u8) -> u32 {
        self.roms_sizes[slot as usize].get()
    }

    pub fn first_boot(&self) -> bool {
        self.is_first_boot != 0
    }

    pub fn set_first_boot(&mut self, first_boot: bool) {
        self.is_first_boot = first_boot as u8;
    }

    pub fn updated(&self) -> bool {
        self.fw_updated != 0
    }

    pub fn set_updated(&mut self, updated: bool) {
        self.fw_updated = updated as u8;
    }

    /// Checks magic, version and the checksum (when compiled in). The
    /// slot-index invariant is enforced by the selection path, which resets
    /// an out-of-range index instead of discarding the whole record; only
    /// a count that overruns the slot tables, or an empty table (no index
    /// can satisfy `current_rom < count`), makes the record unusable.
    pub fn is_valid<C: ChecksumCalculator>(&self, calculator: &C) -> bool {
        if self.magic != BOOT_CONFIG_MAGIC || self.version != BOOT_CONFIG_VERSION {
            return false;
        }
        if !self.verify_checksum(calculator) {
            return false;
        }
        self.count >= 1 && self.count as usize <= MAX_SLOTS
    }

    /// Recomputes the trailing checksum over the serialized record. No-op
    /// when checksum protection is not compiled in.
    #[cfg_attr(not(feature = "config-checksum"), allow(unused_variables))]
    pub fn populate_checksum<C: ChecksumCalculator>(&mut self, calculator: &C) {
        #[cfg(feature = "config-checksum")]
        {
            self.checksum =
                calculator.calc_checksum(&self.as_bytes()[..offset_of!(Self, checksum)]);
        }
    }

    /// Always true when checksum protection is not compiled in.
    #[cfg_attr(not(feature = "config-checksum"), allow(unused_variables))]
    pub fn verify_checksum<C: ChecksumCalculator>(&self, calculator: &C) -> bool {
        #[cfg(feature = "config-checksum")]
        {
            return calculator.verify_checksum(
                self.checksum,
                &self.as_bytes()[..offset_of!(Self, checksum)],
            );
        }
        #[cfg(not(feature = "config-checksum"))]
        true
    }
}

/// Single-byte XOR accumulator used for config and image integrity. Not a
/// cryptographic digest.
pub trait ChecksumCalculator {
    fn calc_checksum(&self, data: &[u8]) -> u8 {
        data.iter().fold(0u8, |acc, byte| acc ^ byte)
    }
    fn verify_checksum(&self, checksum: u8, data: &[u8]) -> bool {
        self.calc_checksum(data) == checksum
    }
}

pub struct StandAloneChecksumCalculator;

impl Default for StandAloneChecksumCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl StandAloneChecksumCalculator {
    pub fn new() -> Self {
        StandAloneChecksumCalculator {}
    }
}

impl ChecksumCalculator for StandAloneChecksumCalculator {}

/// Errors surfaced by boot configuration storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootConfigError {
    InvalidSlot,
    ReadFailed,
    WriteFailed,
}
