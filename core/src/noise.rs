//! Per-0x40-frame noise generator.
//!
//! Modeled as an owned value passed into the command layer rather than a
//! process-global: the fixed-noise latch is test-only state, not a true
//! global.

use std::fs::File;
use std::io::Read;

use crate::error::{Error, Result};

const RANGE_BASE: u32 = 10001;
const RANGE_TOP: u32 = 32766;
const RANGE_SIZE: u32 = RANGE_TOP - RANGE_BASE;

#[derive(Debug)]
pub enum NoiseGenerator {
    /// Draws from the system CSPRNG (`/dev/urandom`) on every call.
    Random,
    /// Deterministic sequence for regression testing: each call returns
    /// the current counter mapped into range, then increments it.
    Fixed(u32),
}

impl NoiseGenerator {
    pub fn random() -> Self {
        NoiseGenerator::Random
    }

    pub fn fixed(start: u32) -> Self {
        NoiseGenerator::Fixed(start)
    }

    /// Draw the next noise value, in `[10001, 32766]` inclusive.
    pub fn next(&mut self) -> Result<u32> {
        match self {
            NoiseGenerator::Random => {
                let mut buf = [0u8; 2];
                let mut f = File::open("/dev/urandom").map_err(Error::Io)?;
                f.read_exact(&mut buf).map_err(Error::Io)?;
                let udata = u16::from_le_bytes(buf) as u32;
                Ok(RANGE_BASE + (udata % RANGE_SIZE))
            }
            NoiseGenerator::Fixed(current) => {
                let udata = current.wrapping_sub(RANGE_BASE) as u16;
                *current = current.wrapping_add(1);
                Ok(RANGE_BASE + (udata as u32 % RANGE_SIZE))
            }
        }
    }
}
