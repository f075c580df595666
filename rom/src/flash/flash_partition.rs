// Licensed under the Apache-2.0 license

use crate::flash::hil::{FlashDrvError, FlashStorage};

/// A named, bounds-checked window into a contiguous region of the underlying
/// flash. Every operation is range-checked against the window before it
/// reaches the driver, so a misbehaving caller cannot touch neighboring
/// regions (the config sector sitting next to an image slot, for instance).
pub struct FlashPartition<'a> {
    driver: &'a dyn FlashStorage,
    name: &'static str,
    base_offset: usize,
    length: usize,
}

impl<'a> FlashPartition<'a> {
    /// Creates a partition over `[base_offset, base_offset + length)`.
    /// Fails with `FlashDrvError::SIZE` if the window does not fit the
    /// device.
    pub fn new(
        driver: &'a dyn FlashStorage,
        name: &'static str,
        base_offset: usize,
        length: usize,
    ) -> Result<Self, FlashDrvError> {
        let end = base_offset.checked_add(length).ok_or(FlashDrvError::SIZE)?;
        if end > driver.capacity() {
            return Err(FlashDrvError::SIZE);
        }
        Ok(FlashPartition {
            driver,
            name,
            base_offset,
            length,
        })
    }

    fn check_range(&self, partition_offset: usize, len: usize) -> Result<(), FlashDrvError> {
        let end = partition_offset.checked_add(len).ok_or(FlashDrvError::SIZE)?;
        if end > self.length {
            return Err(FlashDrvError::SIZE);
        }
        Ok(())
    }

    /// Reads `buf.len()` bytes starting at `partition_offset` within the
    /// partition.
    pub fn read(&self, partition_offset: usize, buf: &mut [u8]) -> Result<(), FlashDrvError> {
        self.check_range(partition_offset, buf.len())?;
        self.driver.read(buf, self.base_offset + partition_offset)
    }

    /// Writes the full buffer starting at `partition_offset` within the
    /// partition.
    pub fn write(&self, partition_offset: usize, buf: &[u8]) -> Result<(), FlashDrvError> {
        self.check_range(partition_offset, buf.len())?;
        self.driver.write(buf, self.base_offset + partition_offset)
    }

    /// Erases `len` bytes starting at `partition_offset` within the
    /// partition.
    pub fn erase(&self, partition_offset: usize, len: usize) -> Result<(), FlashDrvError> {
        self.check_range(partition_offset, len)?;
        self.driver.erase(self.base_offset + partition_offset, len)
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::flash::fake_flash::FakeFlash;
    use slotboot_config::flash::SECTOR_SIZE;

    #[test]
    fn test_partition_must_fit_device() {
        let flash = FakeFlash::new(4 * SECTOR_SIZE);
        assert!(FlashPartition::new(&flash, "ok", SECTOR_SIZE, SECTOR_SIZE).is_ok());
        assert_eq!(
            FlashPartition::new(&flash, "oversize", 3 * SECTOR_SIZE, 2 * SECTOR_SIZE).err(),
            Some(FlashDrvError::SIZE)
        );
        assert_eq!(
            FlashPartition::new(&flash, "overflow", usize::MAX, 2).err(),
            Some(FlashDrvError::SIZE)
        );
    }

    #[test]
    fn test_out_of_window_access_rejected() {
        let flash = FakeFlash::new(4 * SECTOR_SIZE);
        let part = FlashPartition::new(&flash, "window", SECTOR_SIZE, SECTOR_SIZE).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(
            part.read(SECTOR_SIZE - 4, &mut buf).err(),
            Some(FlashDrvError::SIZE)
        );
        assert_eq!(
            part.write(SECTOR_SIZE, &[0u8; 4]).err(),
            Some(FlashDrvError::SIZE)
        );
        assert_eq!(
            part.erase(0, 2 * SECTOR_SIZE).err(),
            Some(FlashDrvError::SIZE)
        );
        // in-window access goes through and is offset by the window base
        part.erase(0, SECTOR_SIZE).unwrap();
        part.write(0, &[0xab, 0xcd, 0xef, 0x01]).unwrap();
        part.read(0, &mut buf).unwrap();
        assert_eq!(&buf[..4], &[0xab, 0xcd, 0xef, 0x01]);
        assert_eq!(flash.erase_log(), vec![SECTOR_SIZE]);
    }
}
