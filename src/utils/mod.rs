//! Utility modules for the build engine.

pub mod exec;
pub mod markdown;
pub mod template;
pub mod xml;
