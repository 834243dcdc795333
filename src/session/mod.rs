//! Remote session lifecycle and transcript assembly.

pub mod controller;
pub mod events;
pub mod status;
pub mod transcript;
