//! Device-button bit assignment (§4.K) and the global kill-flag bits the
//! game loop tests every tick (§4.I). Host keycode → [`Button`] binding is
//! the frontend's job; this module only knows the per-model bit layout.

use crate::rom::Model;

/// One of the five physical buttons the handheld exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Button {
    Left,
    Middle,
    Right,
    SideLeft,
    SideRight,
}

/// Bit position for `button` on `model`, per the two keymap tables in §4.K.
pub fn button_bit(model: Model, button: Button) -> u32 {
    match (model, button) {
        (Model::Model550, Button::Left) => 4,
        (Model::Model550, Button::Middle) => 5,
        (Model::Model550, Button::Right) => 6,
        (Model::Model550, Button::SideLeft) => 3,
        (Model::Model550, Button::SideRight) => 2,

        (Model::Model560, Button::Left) => 2,
        (Model::Model560, Button::Middle) => 3,
        (Model::Model560, Button::Right) => 4,
        (Model::Model560, Button::SideLeft) => 5,
        (Model::Model560, Button::SideRight) => 6,
    }
}

/// Global flags the game loop inspects outside the 5-bit button mask.
/// These live alongside the buttons in the same `u32` the frontend hands
/// [`crate::system::System::tick`] each iteration.
pub const FLAG_QUIT: u32 = 1 << 16;
pub const FLAG_RESET: u32 = 1 << 17;
pub const FLAG_POWER_OFF: u32 = 1 << 18;
pub const FLAG_WAI: u32 = 1 << 19;
pub const FLAG_LCD_CLEAN: u32 = 1 << 20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_550_and_560_keymaps_disagree_on_left() {
        assert_eq!(button_bit(Model::Model550, Button::Left), 4);
        assert_eq!(button_bit(Model::Model560, Button::Left), 2);
    }

    #[test]
    fn all_five_buttons_get_distinct_bits_per_model() {
        for model in [Model::Model550, Model::Model560] {
            let bits: Vec<u32> = [
                Button::Left,
                Button::Middle,
                Button::Right,
                Button::SideLeft,
                Button::SideRight,
            ]
            .into_iter()
            .map(|b| button_bit(model, b))
            .collect();
            let mut sorted = bits.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), bits.len());
        }
    }
}
