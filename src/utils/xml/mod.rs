//! Markup parsing and serialization.

pub mod common;
pub mod dom;

pub use dom::{Document, DomError, Element, Node};
