// The infra module contains startup-time implementations of core
// concerns (configuration loading).

#[path = "antispam/mod.rs"]
pub mod antispam;
