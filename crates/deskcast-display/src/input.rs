use std::sync::Arc;

use deskcast_protocol::control::{ControlMessage, ScrollAccumulator};
use x11rb::protocol::xproto::{BUTTON_PRESS_EVENT, BUTTON_RELEASE_EVENT, MOTION_NOTIFY_EVENT};
use x11rb::protocol::xtest::ConnectionExt as _;
use x11rb::rust_connection::RustConnection;
use x11rb::CURRENT_TIME;

use crate::error::DisplayError;

/// Left mouse button, as XTest/X11 numbers pointer buttons (1-indexed).
const BUTTON_LEFT: u8 = 1;
/// Wheel-up and wheel-down are conventionally buttons 4 and 5.
const BUTTON_WHEEL_UP: u8 = 4;
const BUTTON_WHEEL_DOWN: u8 = 5;

/// Replays inbound pointer/scroll control messages onto the X server via
/// the XTest extension.
pub struct InputInjector {
    conn: Arc<RustConnection>,
    root: u32,
    scroll: ScrollAccumulator,
}

impl InputInjector {
    pub fn new(conn: Arc<RustConnection>, root: u32) -> Self {
        // One wheel click per whole unit of accumulated deltaY, matching
        // the browser's raw scroll delta 1:1 -- no extra scaling factor.
        Self { conn, root, scroll: ScrollAccumulator::new(1.0) }
    }

    /// Dispatch one decoded control message.
    pub fn dispatch(&mut self, msg: ControlMessage) -> Result<(), DisplayError> {
        match msg {
            ControlMessage::TouchStart { x, y } => {
                self.move_pointer(x, y)?;
                self.button(BUTTON_LEFT, true)?;
            }
            ControlMessage::TouchMove { x, y } => {
                self.move_pointer(x, y)?;
            }
            ControlMessage::TouchEnd { x, y } => {
                self.move_pointer(x, y)?;
                self.button(BUTTON_LEFT, false)?;
            }
            ControlMessage::Scroll { delta_y } => {
                let clicks = self.scroll.feed(delta_y);
                let button = if clicks >= 0 { BUTTON_WHEEL_DOWN } else { BUTTON_WHEEL_UP };
                for _ in 0..clicks.unsigned_abs() {
                    self.button(button, true)?;
                    self.button(button, false)?;
                }
            }
        }
        Ok(())
    }

    fn move_pointer(&self, x: f64, y: f64) -> Result<(), DisplayError> {
        self.conn
            .xtest_fake_input(
                MOTION_NOTIFY_EVENT,
                0,
                CURRENT_TIME,
                self.root,
                x as i16,
                y as i16,
                0,
            )
            .map_err(|e| DisplayError::Input(e.to_string()))?;
        Ok(())
    }

    fn button(&self, button: u8, press: bool) -> Result<(), DisplayError> {
        let event_type = if press { BUTTON_PRESS_EVENT } else { BUTTON_RELEASE_EVENT };
        self.conn
            .xtest_fake_input(event_type, button, CURRENT_TIME, self.root, 0, 0, 0)
            .map_err(|e| DisplayError::Input(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scroll_direction_follows_sign() {
        let mut acc = ScrollAccumulator::new(1.0);
        let clicks = acc.feed(2.0);
        assert_eq!(clicks, 2);
        let clicks = acc.feed(-3.0);
        assert_eq!(clicks, -3);
    }

    #[test]
    fn scroll_accumulates_fractional_deltas_from_injector_default() {
        let mut acc = ScrollAccumulator::new(1.0);
        assert_eq!(acc.feed(0.4), 0);
        assert_eq!(acc.feed(0.4), 0);
        assert_eq!(acc.feed(0.4), 1);
    }
}
