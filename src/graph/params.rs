//! Lock-free parameter cells.
//!
//! Control writes (volume, EQ gain, sends) land in these cells and become
//! visible to the next rendered block. No locks, no graph rebuilds; a
//! parameter change during playback is just an atomic store.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// One shared `f32` parameter, stored as raw bits.
///
/// Writers use `Release`, the render path reads with `Acquire`, so a value
/// written before a block is rendered is guaranteed visible to that block.
#[derive(Debug)]
pub struct ParamCell(AtomicU32);

impl ParamCell {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// One shared boolean flag with the same visibility contract.
#[derive(Debug)]
pub struct FlagCell(AtomicBool);

impl FlagCell {
    pub fn new(value: bool) -> Self {
        Self(AtomicBool::new(value))
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.0.store(value, Ordering::Release);
    }
}
