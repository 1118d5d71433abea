// Discord adapters for the anti-spam detector.

pub mod commands;
pub mod enforcement;
