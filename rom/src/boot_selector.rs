// Licensed under the Apache-2.0 license

//! Decides which slot to execute on reset.
//!
//! Selection runs once, to completion, before any scheduler exists. The
//! config is loaded, first-boot/rollback bookkeeping is applied, candidate
//! slots are verified (falling back through the remaining slots on
//! failure), and any config change is persisted with a single blocking
//! save before the chosen run address is handed back to the platform.

use crate::boot_cfg::BootConfigStore;
use crate::flash::hil::FlashStorage;
use crate::image_verifier::{ImageVerifier, Scratch};
use core::fmt::Write;
use slotboot_config::boot::{BootConfigError, BootMode, ModeFlags};
use slotboot_romtime::println;

/// Terminal state of a selection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// Jump to `run_address`; `slot` is what it was loaded from.
    Boot { slot: u8, run_address: u32 },
    /// Nothing trustworthy to execute. `last_slot` is the slot whose
    /// failure ended the attempt.
    Halt { last_slot: u8, cause: HaltCause },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltCause {
    /// Every configured slot failed verification.
    AllSlotsExhausted,
    /// The pin-forced slot failed verification. A forced recovery slot must
    /// fail visibly instead of silently falling back.
    OverrideImageInvalid,
    /// The updated config could not be persisted, so no selection can be
    /// trusted to survive the next reset.
    ConfigSave(BootConfigError),
}

pub struct BootSelector<'a> {
    flash: &'a dyn FlashStorage,
    store: BootConfigStore<'a>,
}

impl<'a> BootSelector<'a> {
    pub fn new(flash: &'a dyn FlashStorage, store: BootConfigStore<'a>) -> Self {
        BootSelector { flash, store }
    }

    pub fn store_mut(&mut self) -> &mut BootConfigStore<'a> {
        &mut self.store
    }

    /// Runs slot selection. `override_pin` is the platform-sampled state of
    /// the manual boot-select pin; it is honored only when the persisted
    /// mode flag enables it.
    pub fn select_and_boot(&mut self, override_pin: bool, scratch: &mut Scratch) -> BootOutcome {
        let mut cfg = match self.store.load() {
            Ok(cfg) => cfg,
            Err(e) => {
                return BootOutcome::Halt {
                    last_slot: 0,
                    cause: HaltCause::ConfigSave(e),
                }
            }
        };

        let mode = if override_pin && cfg.mode_flags().contains(ModeFlags::GPIO_OVERRIDE) {
            BootMode::GpioOverride
        } else {
            BootMode::Standard
        };
        let mut requested = match mode {
            BootMode::GpioOverride => {
                println!("[boot] pin override, requesting slot {}", cfg.previous_rom);
                cfg.previous_rom
            }
            BootMode::Standard => cfg.current_rom,
        };
        let mut dirty = false;

        // Bookkeeping is re-evaluated from the top after a rollback changes
        // the slot under consideration.
        loop {
            if requested >= cfg.count {
                println!("[boot] slot {} out of range, resetting to 0", requested);
                requested = 0;
                cfg.set_updated(false);
                cfg.set_first_boot(false);
                dirty = true;
            } else if cfg.first_boot() {
                if cfg.boot_attempts == 0 {
                    // First attempt at a freshly updated slot. Recorded (and
                    // persisted before control transfer) so that a crash
                    // before confirmation is visible on the next reset.
                    cfg.boot_attempts = 1;
                    dirty = true;
                } else {
                    // The previous attempt never confirmed; roll back.
                    println!(
                        "[boot] slot {} failed to confirm, rolling back to slot {}",
                        cfg.current_rom, cfg.previous_rom
                    );
                    cfg.current_rom = cfg.previous_rom;
                    cfg.set_updated(false);
                    cfg.set_first_boot(false);
                    cfg.boot_attempts = 0;
                    dirty = true;
                    requested = cfg.current_rom;
                    continue;
                }
            }
            break;
        }

        let verifier = ImageVerifier::new(self.flash);
        let first_tried = requested;
        let run_address = loop {
            match verifier.verify(cfg.slot_offset(requested), scratch) {
                Some(image) => break image.run_address,
                None => {
                    println!("[boot] slot {} failed verification", requested);
                    if mode == BootMode::GpioOverride {
                        return BootOutcome::Halt {
                            last_slot: requested,
                            cause: HaltCause::OverrideImageInvalid,
                        };
                    }
                    let failed = requested;
                    requested = if requested == 0 {
                        cfg.count - 1
                    } else {
                        requested - 1
                    };
                    dirty = true;
                    if requested == first_tried {
                        println!("[boot] no bootable slot found");
                        return BootOutcome::Halt {
                            last_slot: failed,
                            cause: HaltCause::AllSlotsExhausted,
                        };
                    }
                }
            }
        };

        if mode == BootMode::Standard && requested != cfg.current_rom {
            // Sticky fallback: future boots start from the last known good
            // slot rather than retrying the one configured before.
            println!("[boot] switching current slot to {}", requested);
            cfg.current_rom = requested;
            dirty = true;
        }
        if dirty {
            if let Err(e) = self.store.save(&mut cfg) {
                return BootOutcome::Halt {
                    last_slot: requested,
                    cause: HaltCause::ConfigSave(e),
                };
            }
        }
        println!(
            "[boot] booting slot {} at 0x{}",
            requested,
            slotboot_romtime::HexWord(run_address)
        );
        BootOutcome::Boot {
            slot: requested,
            run_address,
        }
    }
}
