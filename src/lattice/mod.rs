//! Lattice module - symmetry groups, bonds and basis enumeration.

mod bonds;
mod group;
mod space;

pub use bonds::Lattice;
pub use group::{Group, TranslationGroup};
pub use space::{magnetization, SpinSpace};
