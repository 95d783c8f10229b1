//! Data models for nudge

pub mod approval;
pub mod configuration;
pub mod message;

pub use approval::*;
pub use configuration::*;
pub use message::*;
