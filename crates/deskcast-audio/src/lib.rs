pub mod capture;
pub mod device;
pub mod encoder;

pub use capture::AudioCapturer;
pub use encoder::Encoder;
