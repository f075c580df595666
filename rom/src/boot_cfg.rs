// Licensed under the Apache-2.0 license

//! Persistent storage for the [`BootConfig`] record.
//!
//! The record lives alone in one flash sector. Every load and save
//! round-trips to flash so that a reset at any point leaves a
//! self-consistent sector; nothing is cached in RAM between calls.

use crate::flash::flash_partition::FlashPartition;
use core::fmt::Write;
use slotboot_config::boot::{BootConfig, BootConfigError, StandAloneChecksumCalculator};
use slotboot_config::flash::SECTOR_SIZE;
use zerocopy::{FromBytes, IntoBytes};

/// Write granularity of the flash device; saves are padded to it.
const WRITE_ALIGN: usize = 4;
const RECORD_LEN: usize = core::mem::size_of::<BootConfig>();
const PADDED_LEN: usize = RECORD_LEN.div_ceil(WRITE_ALIGN) * WRITE_ALIGN;

pub struct BootConfigStore<'a> {
    partition: FlashPartition<'a>,
}

impl<'a> BootConfigStore<'a> {
    /// Takes ownership of the partition holding the config sector.
    pub fn new(partition: FlashPartition<'a>) -> Self {
        BootConfigStore { partition }
    }

    /// Reads the persisted record. A sector that does not parse as a valid
    /// record (erased flash, bad magic or version, checksum mismatch) is
    /// replaced by the compile-time defaults, which are persisted before
    /// they are returned so the next load sees valid data. Fails only on
    /// flash I/O errors.
    pub fn load(&mut self) -> Result<BootConfig, BootConfigError> {
        let mut raw = [0u8; RECORD_LEN];
        self.partition
            .read(0, &mut raw)
            .map_err(|_| BootConfigError::ReadFailed)?;
        if let Ok(cfg) = BootConfig::read_from_bytes(&raw[..]) {
            if cfg.is_valid(&StandAloneChecksumCalculator::new()) {
                return Ok(cfg);
            }
        }
        slotboot_romtime::println!("[boot-cfg] no valid config found, writing defaults");
        let mut cfg = BootConfig::default();
        self.save(&mut cfg)?;
        Ok(cfg)
    }

    /// Persists the record: recomputes the checksum over the serialized
    /// bytes, erases the sector and rewrites it, padded with 0xFF up to the
    /// write granularity. Exactly one erase and one write per call.
    pub fn save(&mut self, cfg: &mut BootConfig) -> Result<(), BootConfigError> {
        cfg.populate_checksum(&StandAloneChecksumCalculator::new());
        let mut buf = [0xffu8; PADDED_LEN];
        buf[..RECORD_LEN].copy_from_slice(cfg.as_bytes());
        self.partition
            .erase(0, SECTOR_SIZE)
            .map_err(|_| BootConfigError::WriteFailed)?;
        self.partition
            .write(0, &buf)
            .map_err(|_| BootConfigError::WriteFailed)?;
        Ok(())
    }

    /// The slot that will boot on the next reset.
    pub fn current_slot(&mut self) -> Result<u8, BootConfigError> {
        Ok(self.load()?.current_rom)
    }

    /// Registers a freshly written image: makes `slot` current, remembers
    /// the old slot for rollback and arms the first-boot bookkeeping. Call
    /// after an OTA transfer completes.
    pub fn set_current_slot(&mut self, slot: u8) -> Result<(), BootConfigError> {
        let mut cfg = self.load()?;
        if slot >= cfg.count {
            return Err(BootConfigError::InvalidSlot);
        }
        if slot == cfg.current_rom {
            return Ok(());
        }
        cfg.previous_rom = cfg.current_rom;
        cfg.current_rom = slot;
        cfg.set_updated(true);
        cfg.set_first_boot(true);
        cfg.boot_attempts = 0;
        self.save(&mut cfg)
    }

    /// Confirms the running image booted successfully, clearing the
    /// first-boot bookkeeping so the next reset will not roll back.
    pub fn confirm_current_slot(&mut self) -> Result<(), BootConfigError> {
        let mut cfg = self.load()?;
        if !cfg.first_boot() && cfg.boot_attempts == 0 && !cfg.updated() {
            return Ok(());
        }
        cfg.set_first_boot(false);
        cfg.boot_attempts = 0;
        cfg.set_updated(false);
        self.save(&mut cfg)
    }
}
