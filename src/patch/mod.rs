//! The diff/patch engine: per-section differencing, the patch file codec and the drivers
//! that run them over whole containers.

pub mod remap;
pub mod operation;
pub mod placement;
pub mod diff;
pub mod apply;
pub mod file;
pub mod exclude;
pub mod config;
pub mod generator;
pub mod applier;

pub use applier::DexPatchApplier;
pub use config::DexPatchConfig;
pub use diff::SectionStats;
pub use file::DexPatchFile;
pub use generator::{DexPatchGenerator, PatchOutput};
pub use operation::PatchOperation;
pub use remap::{IndexMap, Remap};
