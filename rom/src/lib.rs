/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    Boot selection and OTA flash-write subsystem: verifies candidate
    firmware images, picks the slot to execute, tracks first-boot
    confirmation and rollback, and streams OTA updates into flash.

--*/

#![cfg_attr(target_arch = "riscv32", no_std)]

pub mod flash;
pub use flash::*;
pub mod boot_cfg;
pub use boot_cfg::BootConfigStore;
pub mod image;
pub mod image_verifier;
pub use image_verifier::{ImageVerifier, Scratch, VerifiedImage};
pub mod boot_selector;
pub use boot_selector::{BootOutcome, BootSelector, HaltCause};
pub mod ota;
pub use ota::{OtaWriteError, OtaWriter, WriteStatus};
