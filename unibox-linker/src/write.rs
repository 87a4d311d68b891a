// Atomic output: stage the whole tree next to the destination, then rename

use crate::error::{MergeError, MergeResult, Phase};
use crate::synthesizer::{MergedProgram, REGISTRY_MANIFEST};
use std::fs;
use std::path::Path;

/// Writes `program` to `out`, which must be absent or an empty directory.
/// Nothing is left at `out` if writing fails.
pub fn write_program(program: &MergedProgram, out: &Path) -> MergeResult<()> {
    if out.exists() {
        let mut entries = fs::read_dir(out).map_err(|e| MergeError::io(Phase::Write, out, e))?;
        if entries.next().is_some() {
            return Err(MergeError::OutputNotEmpty {
                phase: Phase::Write,
                path: out.to_path_buf(),
            });
        }
    }

    let parent = match out.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    fs::create_dir_all(&parent).map_err(|e| MergeError::io(Phase::Write, &parent, e))?;

    let staging = tempfile::Builder::new()
        .prefix(".unibox-staging-")
        .tempdir_in(&parent)
        .map_err(|e| MergeError::io(Phase::Write, &parent, e))?;

    for (relative, text) in &program.files {
        let path = staging.path().join(relative);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| MergeError::io(Phase::Write, dir, e))?;
        }
        fs::write(&path, text).map_err(|e| MergeError::io(Phase::Write, &path, e))?;
    }
    let manifest = staging.path().join(REGISTRY_MANIFEST);
    fs::write(&manifest, program.manifest_json()?)
        .map_err(|e| MergeError::io(Phase::Write, &manifest, e))?;

    if out.exists() {
        fs::remove_dir(out).map_err(|e| MergeError::io(Phase::Write, out, e))?;
    }
    // On success the staging directory is gone and dropping it is a no-op;
    // on failure the drop removes it
    fs::rename(staging.path(), out).map_err(|e| MergeError::io(Phase::Write, out, e))?;
    drop(staging);

    log::info!(
        "write: {} files to {}",
        program.files.len() + 1,
        out.display()
    );
    Ok(())
}
