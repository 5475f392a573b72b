pub mod error;
pub mod grabber;
pub mod input;

pub use error::DisplayError;
pub use grabber::{Grabber, RawFrame};
pub use input::InputInjector;
