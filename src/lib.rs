//! # dexpatch
//!
//! Structural diff and patch for Android dex files. A patch lists, per section, which items
//! of the old container are deleted, added or replaced; applying it rebuilds the new
//! container with every cross-reference rewritten.
//!
//! ```no_run
//!  use dexpatch::{apply_patch, generate_patch, DexPatchConfig};
//!
//!  let old = std::fs::read("classes-old.dex").unwrap();
//!  let new = std::fs::read("classes-new.dex").unwrap();
//!  let output = generate_patch(&old, &new, &DexPatchConfig::default()).unwrap();
//!  let patched = apply_patch(&old, &output.patch).unwrap();
//!  println!("{} byte patch, {} byte container", output.patch.len(), patched.len());
//! ```
use std::fs;
use std::path::Path;

#[macro_use]
pub mod dex;
pub mod patch;
#[cfg(test)]
mod tests;

pub use dex::error::{DexError, ErrorKind};
pub use dex::DexFile;
pub use patch::{DexPatchApplier, DexPatchConfig, DexPatchFile, DexPatchGenerator, PatchOutput};

/// Generate a patch turning the container `old` into `new`.
pub fn generate_patch(old: &[u8], new: &[u8], config: &DexPatchConfig) -> Result<PatchOutput, DexError> {
    let old = DexFile::from_bytes(old)?;
    let new = DexFile::from_bytes(new)?;
    DexPatchGenerator::new(&old, &new).with_config(config.clone()).generate()
}

/// Apply `patch` to the container `old` it was generated against.
pub fn apply_patch(old: &[u8], patch: &[u8]) -> Result<Vec<u8>, DexError> {
    let old = DexFile::from_bytes(old)?;
    let patch = DexPatchFile::parse(patch)?;
    DexPatchApplier::new(&old, &patch).apply()
}

/// File variant of [`generate_patch`]; the patch is written to `patch_path`.
pub fn generate_patch_file(
    old_path: &Path,
    new_path: &Path,
    patch_path: &Path,
    config: &DexPatchConfig,
) -> Result<PatchOutput, DexError> {
    let old = DexFile::from_file(old_path)?;
    let new = DexFile::from_file(new_path)?;
    let output = DexPatchGenerator::new(&old, &new).with_config(config.clone()).generate()?;
    fs::write(patch_path, &output.patch)
        .map_err(|e| DexError::with_context(e.into(), format!("writing {}", patch_path.display())))?;
    Ok(output)
}

/// File variant of [`apply_patch`]. `out_path` is only written when the patch applies.
pub fn apply_patch_file(old_path: &Path, patch_path: &Path, out_path: &Path) -> Result<(), DexError> {
    let old = DexFile::from_file(old_path)?;
    let patch = DexPatchFile::from_file(patch_path)?;
    DexPatchApplier::new(&old, &patch).apply_to_file(out_path)
}
