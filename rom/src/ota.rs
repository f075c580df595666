// Licensed under the Apache-2.0 license

//! Incremental flash writer for over-the-air image downloads.
//!
//! Update payloads arrive in arbitrarily sized chunks (network packets,
//! protocol frames) while flash wants word-aligned programming and
//! sector-granular erases. The writer buffers up to three trailing bytes
//! between chunks and erases each sector lazily, just before the first
//! write that lands in it, so a download can be streamed straight to its
//! destination slot without staging RAM.

use crate::flash::hil::{FlashDrvError, FlashStorage};
use core::fmt::Write;
use slotboot_config::flash::SECTOR_SIZE;
use slotboot_romtime::{println, HexWord};

const WORD: usize = 4;
/// `last_sector_erased` value meaning no sector has been erased yet.
const NO_SECTOR_ERASED: u32 = u32::MAX;

/// Cursor state carried between chunks of one download.
///
/// Plain data so a caller can stash it across whatever event loop delivers
/// the chunks. `extra` holds the trailing bytes of the previous chunk that
/// did not fill a flash word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteStatus {
    start_addr: u32,
    start_sector: u32,
    last_sector_erased: u32,
    extra: [u8; WORD],
    extra_count: u8,
}

impl WriteStatus {
    /// Next flash address to be programmed.
    pub fn current_addr(&self) -> u32 {
        self.start_addr
    }

    /// Sector the download began in.
    pub fn start_sector(&self) -> u32 {
        self.start_sector
    }

    /// Bytes received but not yet programmed.
    pub fn pending(&self) -> &[u8] {
        &self.extra[..self.extra_count as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaWriteError {
    /// A single chunk may not exceed one sector.
    ChunkTooLarge,
    Flash(FlashDrvError),
}

impl From<FlashDrvError> for OtaWriteError {
    fn from(e: FlashDrvError) -> Self {
        OtaWriteError::Flash(e)
    }
}

pub struct OtaWriter<'a> {
    flash: &'a dyn FlashStorage,
}

impl<'a> OtaWriter<'a> {
    pub fn new(flash: &'a dyn FlashStorage) -> Self {
        OtaWriter { flash }
    }

    /// Starts a download targeting `start_addr`. Touches no flash; erases
    /// happen lazily as data for each sector arrives.
    pub fn begin(&self, start_addr: u32) -> WriteStatus {
        println!("[ota] write session starting at 0x{}", HexWord(start_addr));
        WriteStatus {
            start_addr,
            start_sector: start_addr / SECTOR_SIZE as u32,
            last_sector_erased: NO_SECTOR_ERASED,
            extra: [0; WORD],
            extra_count: 0,
        }
    }

    /// Appends one chunk of the download.
    ///
    /// An oversize chunk is rejected before anything is touched, so the
    /// caller may resubmit it in smaller pieces. A flash error can leave
    /// the session partially programmed; the caller abandons it and starts
    /// over from [`OtaWriter::begin`].
    pub fn write_chunk(&self, status: &mut WriteStatus, data: &[u8]) -> Result<(), OtaWriteError> {
        if data.is_empty() {
            return Ok(());
        }
        let carry = status.extra_count as usize;
        let combined = carry + data.len();
        if combined > SECTOR_SIZE {
            return Err(OtaWriteError::ChunkTooLarge);
        }
        let new_extra = combined % WORD;
        let writable = combined - new_extra;

        if writable == 0 {
            // Not enough for a full word yet; keep accumulating.
            status.extra[carry..combined].copy_from_slice(data);
            status.extra_count = combined as u8;
            return Ok(());
        }

        // Every sector this chunk's words land in must be erased before the
        // first program hits it. A chunk is at most one sector, so at most
        // the sector of the first and of the last word are involved.
        let first_sector = status.start_addr / SECTOR_SIZE as u32;
        let end_sector = (status.start_addr + writable as u32 - 1) / SECTOR_SIZE as u32;
        for sector in first_sector..=end_sector {
            if sector != status.last_sector_erased {
                if let Err(e) = self.flash.erase(sector as usize * SECTOR_SIZE, SECTOR_SIZE) {
                    println!("[ota] erase failed at sector {}", sector);
                    return Err(e.into());
                }
                status.last_sector_erased = sector;
            }
        }

        let mut addr = status.start_addr as usize;
        let mut consumed = 0;
        if carry > 0 {
            // Stitch the held-over bytes with the front of this chunk into
            // one word.
            let mut word = [0u8; WORD];
            word[..carry].copy_from_slice(&status.extra[..carry]);
            word[carry..].copy_from_slice(&data[..WORD - carry]);
            self.program(&word, addr)?;
            addr += WORD;
            consumed = WORD - carry;
        }
        let aligned = writable - if carry > 0 { WORD } else { 0 };
        if aligned > 0 {
            self.program(&data[consumed..consumed + aligned], addr)?;
        }

        status.extra[..new_extra].copy_from_slice(&data[data.len() - new_extra..]);
        status.extra_count = new_extra as u8;
        status.start_addr += writable as u32;
        Ok(())
    }

    fn program(&self, buf: &[u8], addr: usize) -> Result<(), OtaWriteError> {
        self.flash.write(buf, addr).map_err(|e| {
            println!("[ota] write failed at 0x{}", HexWord(addr as u32));
            OtaWriteError::Flash(e)
        })
    }
}
