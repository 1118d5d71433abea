// Core anti-spam module - contains repeated-message detection logic.

pub mod antispam_detector;
pub mod antispam_models;

pub use antispam_detector::*;
pub use antispam_models::*;
