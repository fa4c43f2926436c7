//! Shared data models for registries and connections

mod descriptor;
mod signature;

pub use descriptor::*;
pub use signature::*;
