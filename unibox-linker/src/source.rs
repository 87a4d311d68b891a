// Unit inputs: a named, ordered set of source texts

use crate::error::{MergeError, MergeResult, Phase};
use std::path::{Path, PathBuf};

pub const SOURCE_EXTENSION: &str = "ub";

/// One source file of a unit
#[derive(Debug, Clone, PartialEq)]
pub struct SourceText {
    /// File name inside the unit, e.g. `main.ub`
    pub name: String,
    /// Path shown in diagnostics
    pub display: String,
    pub text: String,
}

/// A unit as handed to the merger; never modified
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSource {
    pub name: String,
    pub files: Vec<SourceText>,
}

impl UnitSource {
    /// In-memory unit; files are sorted by name
    pub fn new<N, T>(name: &str, files: impl IntoIterator<Item = (N, T)>) -> Self
    where
        N: Into<String>,
        T: Into<String>,
    {
        let mut files: Vec<SourceText> = files
            .into_iter()
            .map(|(file, text)| {
                let file = file.into();
                SourceText {
                    display: format!("{}/{}", name, file),
                    name: file,
                    text: text.into(),
                }
            })
            .collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            name: name.to_string(),
            files,
        }
    }

    /// Reads every `*.ub` file directly inside `dir`. The unit is named
    /// after the directory unless `name` is given.
    pub fn from_dir(dir: &Path, name: Option<&str>) -> MergeResult<Self> {
        let name = match name {
            Some(name) => name.to_string(),
            None => dir_name(dir),
        };
        validate_unit_name(&name)?;

        let entries = std::fs::read_dir(dir).map_err(|e| MergeError::io(Phase::Load, dir, e))?;
        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MergeError::io(Phase::Load, dir, e))?;
            let path = entry.path();
            let is_source = path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION);
            if is_source && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        if paths.is_empty() {
            return Err(MergeError::EmptyUnit {
                phase: Phase::Load,
                unit: name,
                dir: dir.to_path_buf(),
            });
        }

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| MergeError::io(Phase::Load, &path, e))?;
            files.push(SourceText {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                display: path.display().to_string(),
                text,
            });
        }

        Ok(Self { name, files })
    }
}

fn dir_name(dir: &Path) -> String {
    let absolute;
    let dir = if dir.file_name().is_none() {
        // `.` or `..`: name the unit after the resolved directory
        absolute = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        absolute.as_path()
    } else {
        dir
    };
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Unit names become directory names in the output and command names at run time
pub fn validate_unit_name(name: &str) -> MergeResult<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if name.is_empty() || name == "." || name == ".." || !valid_chars {
        return Err(MergeError::InvalidUnitName {
            phase: Phase::Load,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Unit name as it may appear inside an identifier
pub fn identifier_suffix(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sorts_files() {
        let unit = UnitSource::new("cat", [("b.ub", "fn b() {}"), ("a.ub", "fn main() {}")]);
        let names: Vec<_> = unit.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.ub", "b.ub"]);
        assert_eq!(unit.files[0].display, "cat/a.ub");
    }

    #[test]
    fn test_from_dir_reads_only_sources() {
        let dir = tempfile::tempdir().unwrap();
        let unit_dir = dir.path().join("wc");
        std::fs::create_dir(&unit_dir).unwrap();
        std::fs::write(unit_dir.join("main.ub"), "fn main() {}").unwrap();
        std::fs::write(unit_dir.join("README.md"), "docs").unwrap();
        std::fs::create_dir(unit_dir.join("nested.ub")).unwrap();

        let unit = UnitSource::from_dir(&unit_dir, None).unwrap();
        assert_eq!(unit.name, "wc");
        assert_eq!(unit.files.len(), 1);
        assert_eq!(unit.files[0].name, "main.ub");
    }

    #[test]
    fn test_empty_unit() {
        let dir = tempfile::tempdir().unwrap();
        let err = UnitSource::from_dir(dir.path(), Some("empty")).unwrap_err();
        assert!(matches!(err, MergeError::EmptyUnit { .. }));
    }

    #[test]
    fn test_unit_names() {
        assert!(validate_unit_name("cat").is_ok());
        assert!(validate_unit_name("x86_64-ls.v2").is_ok());
        assert!(validate_unit_name("").is_err());
        assert!(validate_unit_name("..").is_err());
        assert!(validate_unit_name("a b").is_err());
        assert!(validate_unit_name("a/b").is_err());
        assert_eq!(identifier_suffix("ls.v2-x"), "ls_v2_x");
    }
}
