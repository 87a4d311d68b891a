// Post-merge verification: the output must stand on its own as one package

use crate::error::{MergeError, MergeResult, Phase};
use crate::index::DependencyIndex;
use crate::resolve::{analyze_package, FileInput, PackageAnalysis, SymbolKind};
use crate::synthesizer::{MergedProgram, REGISTRY_SOURCE};
use unibox_parser::parse_source;

/// Re-parses every output file and resolves them together. Any finding is
/// a merger bug, reported as an internal invariant violation.
pub fn verify(program: &MergedProgram, index: &DependencyIndex) -> MergeResult<()> {
    let mut asts = Vec::with_capacity(program.files.len());
    for (path, text) in &program.files {
        let ast = parse_source(path, text).map_err(|e| {
            MergeError::internal(Phase::Verify, format!("{} does not parse: {}", path, e))
        })?;
        asts.push(ast);
    }

    let inputs: Vec<FileInput> = program
        .files
        .iter()
        .zip(&asts)
        .map(|((path, text), ast)| FileInput {
            display: path,
            source: text,
            ast,
        })
        .collect();

    let index = index.clone().with_runtime();
    let analysis = analyze_package(&inputs, &index);

    if let Some(diag) = analysis.diagnostics.first() {
        return Err(MergeError::internal(
            Phase::Verify,
            format!("{}: {}", diag.span, diag.message),
        ));
    }

    let inits = analysis
        .symbols
        .iter()
        .filter(|s| s.kind == SymbolKind::Function && s.name == "init")
        .count();
    if inits > 0 {
        return Err(MergeError::internal(
            Phase::Verify,
            format!("{} `init` functions survived the merge", inits),
        ));
    }

    expect_function(&analysis, &inputs, "main", REGISTRY_SOURCE)?;
    for (name, entry) in program.manifest.registry.iter() {
        expect_function(&analysis, &inputs, &entry.init.symbol, &entry.init.file)
            .and_then(|_| expect_function(&analysis, &inputs, &entry.entry.symbol, &entry.entry.file))
            .map_err(|e| match e {
                MergeError::InternalInvariant { phase, message } => MergeError::InternalInvariant {
                    phase,
                    message: format!("command `{}`: {}", name, message),
                },
                other => other,
            })?;
    }

    log::info!("verify: {} files resolve as one package", inputs.len());
    Ok(())
}

fn expect_function(
    analysis: &PackageAnalysis,
    inputs: &[FileInput<'_>],
    name: &str,
    file: &str,
) -> MergeResult<()> {
    let declared_in = analysis
        .lookup(name)
        .filter(|s| s.kind == SymbolKind::Function)
        .and_then(|s| inputs.get(s.file))
        .map(|input| input.display);

    match declared_in {
        Some(display) if display == file => Ok(()),
        Some(display) => Err(MergeError::internal(
            Phase::Verify,
            format!("`{}` is declared in {}, expected {}", name, display, file),
        )),
        None => Err(MergeError::internal(
            Phase::Verify,
            format!("function `{}` is not declared", name),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use unibox_runtime::{EntryRef, ProgramManifest, Registry, ThunkRef};

    fn program(files: &[(&str, &str)]) -> MergedProgram {
        let registry = Registry::builder()
            .with(
                "cat",
                ThunkRef {
                    symbol: "initializers_cat".to_string(),
                    file: "cat/main.ub".to_string(),
                },
                EntryRef {
                    symbol: "main_cat".to_string(),
                    file: "cat/main.ub".to_string(),
                    takes_args: false,
                    returns_status: false,
                },
            )
            .unwrap()
            .build();
        MergedProgram {
            files: files
                .iter()
                .map(|(p, t)| (p.to_string(), t.to_string()))
                .collect::<BTreeMap<_, _>>(),
            manifest: ProgramManifest {
                program: "box".to_string(),
                registry,
            },
        }
    }

    const REGISTRY: &str = "import runtime \"unibox/runtime\";\nfn main(args: [string]) -> int {\n    runtime.register(\"cat\", initializers_cat, main_cat);\n    return runtime.dispatch(\"box\", args);\n}\n";

    #[test]
    fn test_consistent_output_passes() {
        let merged = program(&[
            ("registry.ub", REGISTRY),
            ("cat/main.ub", "fn main_cat() {}\nfn initializers_cat() {}\n"),
        ]);
        assert!(verify(&merged, &DependencyIndex::default()).is_ok());
    }

    #[test]
    fn test_stale_reference_fails() {
        let merged = program(&[
            ("registry.ub", REGISTRY),
            ("cat/main.ub", "fn main_cat() { helper(); }\nfn initializers_cat() {}\n"),
        ]);
        let err = verify(&merged, &DependencyIndex::default()).unwrap_err();
        assert_eq!(err.phase(), Phase::Verify);
        assert!(err.to_string().contains("helper"));
    }

    #[test]
    fn test_surviving_init_fails() {
        let merged = program(&[
            ("registry.ub", REGISTRY),
            ("cat/main.ub", "fn main_cat() {}\nfn initializers_cat() {}\nfn init() {}\n"),
        ]);
        assert!(verify(&merged, &DependencyIndex::default()).is_err());
    }

    #[test]
    fn test_missing_thunk_fails() {
        let merged = program(&[
            ("registry.ub", REGISTRY.replace("initializers_cat, ", "main_cat, ").as_str()),
            ("cat/main.ub", "fn main_cat() {}\n"),
        ]);
        let err = verify(&merged, &DependencyIndex::default()).unwrap_err();
        assert!(err.to_string().contains("initializers_cat"));
    }
}
