pub mod convert;
pub mod encoder;

pub use convert::Converter;
pub use encoder::{EncodedFrame, Encoder};
