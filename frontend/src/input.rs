//! Host keycode to device control translation (§4.K).
//!
//! Each device button binds both its arrow key and the reference
//! interpreter's matching letter key; the reset and quit controls sit
//! outside the button bitmask entirely and are reported separately.

use phosphor_core::prelude::Button;
use sdl2::keyboard::Scancode;

pub enum Control {
    Button(Button),
    Reset,
    Quit,
}

/// Resolves a scancode to the device control it drives, if any.
pub fn control_for(scancode: Scancode) -> Option<Control> {
    use Scancode::*;
    Some(match scancode {
        Left | A => Control::Button(Button::Left),
        Down | S => Control::Button(Button::Middle),
        Right | D => Control::Button(Button::Right),
        Delete | Q => Control::Button(Button::SideLeft),
        PageDown | E => Control::Button(Button::SideRight),
        R => Control::Reset,
        Escape => Control::Quit,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrow_and_letter_keys_agree() {
        assert!(matches!(control_for(Scancode::Left), Some(Control::Button(Button::Left))));
        assert!(matches!(control_for(Scancode::A), Some(Control::Button(Button::Left))));
    }

    #[test]
    fn unbound_key_is_none() {
        assert!(control_for(Scancode::F1).is_none());
    }

    #[test]
    fn reset_and_quit_are_distinct_from_buttons() {
        assert!(matches!(control_for(Scancode::R), Some(Control::Reset)));
        assert!(matches!(control_for(Scancode::Escape), Some(Control::Quit)));
    }
}
