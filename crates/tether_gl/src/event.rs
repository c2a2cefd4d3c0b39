//! Window events delivered by [`Window::poll_events`](crate::Window::poll_events).

/// Platform key code.
///
/// Opaque: translating platform codes into a portable key set is left to the
/// driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(pub u32);

/// Modifier keys held while a key event was generated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    /// Alt.
    pub alt: bool,
    /// Control.
    pub control: bool,
    /// Shift.
    pub shift: bool,
    /// System (Windows / Command).
    pub system: bool,
}

/// Concrete mouse buttons as reported in events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Left button on a right-handed mouse (primary).
    LeftRightHanded,
    /// Right button on a right-handed mouse (secondary).
    RightRightHanded,
    /// Left button on a left-handed mouse (secondary).
    LeftLeftHanded,
    /// Right button on a left-handed mouse (primary).
    RightLeftHanded,
    /// Middle (wheel) button.
    Middle,
    /// First extra button.
    XButton1,
    /// Second extra button.
    XButton2,
}

impl MouseButton {
    /// Returns true for the primary button regardless of handedness.
    #[must_use]
    pub fn is_primary(self) -> bool {
        matches!(self, Self::LeftRightHanded | Self::RightLeftHanded)
    }
}

/// An event reported by a window.
///
/// Mouse coordinates are relative to the top-left corner of the window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// The window was asked to close.
    Closed,
    /// The window was resized.
    Resized {
        /// New width in pixels.
        width: u32,
        /// New height in pixels.
        height: u32,
    },
    /// The window lost focus.
    LostFocus,
    /// The window gained focus.
    GainedFocus,
    /// A character was entered.
    TextEntered(char),
    /// A key was pressed.
    KeyPressed {
        /// Key code.
        code: Key,
        /// Modifiers held.
        modifiers: Modifiers,
    },
    /// A key was released.
    KeyReleased {
        /// Key code.
        code: Key,
        /// Modifiers held.
        modifiers: Modifiers,
    },
    /// The cursor moved.
    MouseMoved {
        /// X position.
        x: i32,
        /// Y position.
        y: i32,
    },
    /// A mouse button was pressed.
    MouseButtonPressed {
        /// Button.
        button: MouseButton,
        /// X position.
        x: i32,
        /// Y position.
        y: i32,
    },
    /// A mouse button was released.
    MouseButtonReleased {
        /// Button.
        button: MouseButton,
        /// X position.
        x: i32,
        /// Y position.
        y: i32,
    },
    /// The wheel was scrolled. Positive is up.
    MouseWheel {
        /// Number of ticks.
        delta: i32,
        /// X position.
        x: i32,
        /// Y position.
        y: i32,
    },
    /// The cursor entered the window.
    MouseEntered,
    /// The cursor left the window.
    MouseLeft,
}
