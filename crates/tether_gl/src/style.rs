//! Window decoration flags.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::window::WindowError;

/// Set of window decoration flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowStyle(u8);

impl WindowStyle {
    /// No border and no title bar.
    pub const NONE: Self = Self(0);
    /// Title bar and border.
    pub const TITLEBAR: Self = Self(1 << 0);
    /// Resizable border and maximize button. Requires [`TITLEBAR`](Self::TITLEBAR).
    pub const RESIZE: Self = Self(1 << 1);
    /// Close button. Requires [`TITLEBAR`](Self::TITLEBAR).
    pub const CLOSE: Self = Self(1 << 2);
    /// Fullscreen. Mutually exclusive with every other flag.
    pub const FULLSCREEN: Self = Self(1 << 3);
    /// Title bar, resize and close.
    pub const DEFAULT: Self = Self(Self::TITLEBAR.0 | Self::RESIZE.0 | Self::CLOSE.0);

    /// Returns true if every flag in `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw flag bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Validates the flag combination.
    ///
    /// # Errors
    ///
    /// Returns [`WindowError::InvalidStyle`] if fullscreen is combined with
    /// other flags, or if resize/close are requested without a title bar.
    pub fn check(self) -> Result<(), WindowError> {
        if self.contains(Self::FULLSCREEN) && self != Self::FULLSCREEN {
            return Err(WindowError::InvalidStyle(
                "fullscreen is mutually exclusive with all other flags",
            ));
        }
        if self.contains(Self::RESIZE) && !self.contains(Self::TITLEBAR) {
            return Err(WindowError::InvalidStyle("resize requires a title bar"));
        }
        if self.contains(Self::CLOSE) && !self.contains(Self::TITLEBAR) {
            return Err(WindowError::InvalidStyle("close requires a title bar"));
        }
        Ok(())
    }
}

impl Default for WindowStyle {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl BitOr for WindowStyle {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for WindowStyle {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for WindowStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(WindowStyle, &str); 4] = [
            (WindowStyle::TITLEBAR, "TITLEBAR"),
            (WindowStyle::RESIZE, "RESIZE"),
            (WindowStyle::CLOSE, "CLOSE"),
            (WindowStyle::FULLSCREEN, "FULLSCREEN"),
        ];

        if self.0 == 0 {
            return f.write_str("WindowStyle(NONE)");
        }
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "WindowStyle({})", names.join(" | "))
    }
}
