//! Microphone capture and speaker playback.

pub mod clock;
pub mod frame;
pub mod input;
pub mod playback;

#[cfg(feature = "cpal-audio")]
pub mod capture;
#[cfg(feature = "cpal-audio")]
pub mod output;
