// Licensed under the Apache-2.0 license

//! In-memory flash device with NOR semantics for host-side tests.
//!
//! Erase sets a whole sector to 0xFF; writes are word-aligned and can only
//! clear bits. Violating either rule fails the operation, which is how the
//! tests catch a missing erase or a misaligned OTA write. Erases and writes
//! are logged so tests can assert on erase frequency and save counts.

use crate::flash::hil::{FlashDrvError, FlashStorage};
use slotboot_config::flash::SECTOR_SIZE;
use std::cell::{Cell, RefCell};

const WRITE_ALIGN: usize = 4;

pub struct FakeFlash {
    content: RefCell<Vec<u8>>,
    erase_log: RefCell<Vec<usize>>,
    write_count: Cell<usize>,
    fail_reads: Cell<bool>,
    fail_writes: Cell<bool>,
    fail_erases: Cell<bool>,
}

impl FakeFlash {
    /// A freshly erased device of `capacity` bytes (multiple of the sector
    /// size).
    pub fn new(capacity: usize) -> Self {
        assert_eq!(capacity % SECTOR_SIZE, 0);
        FakeFlash {
            content: RefCell::new(vec![0xff; capacity]),
            erase_log: RefCell::new(Vec::new()),
            write_count: Cell::new(0),
            fail_reads: Cell::new(false),
            fail_writes: Cell::new(false),
            fail_erases: Cell::new(false),
        }
    }

    /// Byte addresses of every erased sector, in call order.
    pub fn erase_log(&self) -> Vec<usize> {
        self.erase_log.borrow().clone()
    }

    pub fn write_count(&self) -> usize {
        self.write_count.get()
    }

    /// Copies out `len` bytes at `address`.
    pub fn contents(&self, address: usize, len: usize) -> Vec<u8> {
        self.content.borrow()[address..address + len].to_vec()
    }

    /// Pokes raw bytes for test setup, bypassing the NOR write rules.
    pub fn program(&self, address: usize, data: &[u8]) {
        self.content.borrow_mut()[address..address + data.len()].copy_from_slice(data);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    pub fn set_fail_erases(&self, fail: bool) {
        self.fail_erases.set(fail);
    }
}

impl FlashStorage for FakeFlash {
    fn read(&self, buffer: &mut [u8], address: usize) -> Result<(), FlashDrvError> {
        if self.fail_reads.get() {
            return Err(FlashDrvError::FAIL);
        }
        let content = self.content.borrow();
        let end = address
            .checked_add(buffer.len())
            .ok_or(FlashDrvError::SIZE)?;
        if end > content.len() {
            return Err(FlashDrvError::SIZE);
        }
        buffer.copy_from_slice(&content[address..end]);
        Ok(())
    }

    fn write(&self, buffer: &[u8], address: usize) -> Result<(), FlashDrvError> {
        if self.fail_writes.get() {
            return Err(FlashDrvError::FAIL);
        }
        if address % WRITE_ALIGN != 0 || buffer.len() % WRITE_ALIGN != 0 {
            return Err(FlashDrvError::INVAL);
        }
        let mut content = self.content.borrow_mut();
        let end = address
            .checked_add(buffer.len())
            .ok_or(FlashDrvError::SIZE)?;
        if end > content.len() {
            return Err(FlashDrvError::SIZE);
        }
        for (old, new) in content[address..end].iter_mut().zip(buffer) {
            // a NOR write can only clear bits
            if *old & new != *new {
                return Err(FlashDrvError::FAIL);
            }
            *old = *new;
        }
        self.write_count.set(self.write_count.get() + 1);
        Ok(())
    }

    fn erase(&self, address: usize, length: usize) -> Result<(), FlashDrvError> {
        if self.fail_erases.get() {
            return Err(FlashDrvError::FAIL);
        }
        if address % SECTOR_SIZE != 0 || length % SECTOR_SIZE != 0 {
            return Err(FlashDrvError::INVAL);
        }
        let mut content = self.content.borrow_mut();
        let end = address.checked_add(length).ok_or(FlashDrvError::SIZE)?;
        if end > content.len() {
            return Err(FlashDrvError::SIZE);
        }
        content[address..end].fill(0xff);
        let mut log = self.erase_log.borrow_mut();
        for sector in (address..end).step_by(SECTOR_SIZE) {
            log.push(sector);
        }
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.content.borrow().len()
    }
}
