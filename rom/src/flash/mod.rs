// Licensed under the Apache-2.0 license

pub mod flash_partition;
pub mod hil;

#[cfg(not(target_arch = "riscv32"))]
pub mod fake_flash;
