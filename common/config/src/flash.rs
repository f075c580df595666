// Licensed under the Apache-2.0 license

//! Compile-time flash map for the boot subsystem.

/// Minimum erasable unit of the flash device, in bytes.
pub const SECTOR_SIZE: usize = 4096;

/// Total size of the flash device, in bytes.
pub const FLASH_CAPACITY: usize = 0x10_0000;

/// Flash offset of the sector holding the persisted boot configuration.
pub const BOOT_CONFIG_OFFSET: usize = 0x1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashSlot {
    pub name: &'static str, // name of the slot
    pub offset: usize,      // flash offset in bytes, sector aligned
    pub size: usize,        // size in bytes
}

pub const SLOT_0: FlashSlot = FlashSlot {
    name: "slot_0",
    offset: 0x2000,
    size: 0x7_e000,
};

pub const SLOT_1: FlashSlot = FlashSlot {
    name: "slot_1",
    offset: 0x8_2000,
    size: 0x7_e000,
};
