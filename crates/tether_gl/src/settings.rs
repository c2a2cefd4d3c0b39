//! # Context Settings and Video Modes
//!
//! Plain value types handed to drivers at creation time. Both are loaded
//! from TOML as part of [`RuntimeConfig`](crate::RuntimeConfig).

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Requested attributes of a rendering context.
///
/// Drivers treat these as a wish list: [`ContextDriver::settings`] reports
/// what was actually obtained.
///
/// [`ContextDriver::settings`]: crate::ContextDriver::settings
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Bits of the depth buffer.
    pub depth_bits: u32,
    /// Bits of the stencil buffer.
    pub stencil_bits: u32,
    /// Level of antialiasing.
    pub antialiasing_level: u32,
    /// Major number of the context version to create.
    pub major_version: u32,
    /// Minor number of the context version to create.
    pub minor_version: u32,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            depth_bits: 0,
            stencil_bits: 0,
            antialiasing_level: 0,
            major_version: 2,
            minor_version: 0,
        }
    }
}

impl ContextSettings {
    /// Scores a candidate pixel format against these settings.
    ///
    /// Lower is better, zero is an exact match. The score is the sum of the
    /// absolute differences of colour, depth, stencil and antialiasing bits.
    #[must_use]
    pub fn evaluate_format(
        &self,
        bits_per_pixel: u32,
        color_bits: u32,
        depth_bits: u32,
        stencil_bits: u32,
        antialiasing: u32,
    ) -> u32 {
        bits_per_pixel.abs_diff(color_bits)
            + self.depth_bits.abs_diff(depth_bits)
            + self.stencil_bits.abs_diff(stencil_bits)
            + self.antialiasing_level.abs_diff(antialiasing)
    }

    /// Returns true if the context version is at least `major.minor`.
    #[must_use]
    pub fn version_at_least(&self, major: u32, minor: u32) -> bool {
        (self.major_version, self.minor_version) >= (major, minor)
    }
}

/// A video mode: dimensions and pixel depth.
///
/// Ordering compares pixel depth first, then area.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoMode {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel depth in bits per pixel.
    pub bits_per_pixel: u32,
}

impl VideoMode {
    /// Creates a 32 bpp mode.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits_per_pixel: 32,
        }
    }

    /// Creates a mode with an explicit pixel depth.
    #[must_use]
    pub const fn with_depth(width: u32, height: u32, bits_per_pixel: u32) -> Self {
        Self {
            width,
            height,
            bits_per_pixel,
        }
    }

    /// Number of pixels covered by the mode.
    #[inline]
    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl Ord for VideoMode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bits_per_pixel
            .cmp(&other.bits_per_pixel)
            .then_with(|| self.area().cmp(&other.area()))
            // Tie-break so the order agrees with `Eq`.
            .then_with(|| self.width.cmp(&other.width))
            .then_with(|| self.height.cmp(&other.height))
    }
}

impl PartialOrd for VideoMode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
