// Merge pipeline: load -> namespace -> detect -> plan -> reconcile -> synthesize -> verify

use crate::detector::{detect, summarize, Collision};
use crate::error::MergeResult;
use crate::index::DependencyIndex;
use crate::loader::{load_units, LoadedUnit};
use crate::manifest::DEFAULT_PROGRAM_NAME;
use crate::namespace::Namespace;
use crate::planner::{plan, RenamePlan};
use crate::reconciler::{reconcile, ImportPlan};
use crate::source::UnitSource;
use crate::synthesizer::{output_path, synthesize, MergedProgram};
use crate::verify::verify;
use crate::write::write_program;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use unibox_diagnostics::{error_codes, Diagnostic, Span};
use unibox_formatter::Config;

#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Name the merged program answers to as a multiplexer
    pub program_name: String,
    pub jobs: usize,
    pub formatter: Config,
    pub index: DependencyIndex,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            program_name: DEFAULT_PROGRAM_NAME.to_string(),
            jobs: default_jobs(),
            formatter: Config::default(),
            index: DependencyIndex::default(),
        }
    }
}

pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// What a merge would do, without producing any output
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub units: Vec<String>,
    pub collisions: Vec<CollisionReport>,
    pub renames: Vec<RenameReport>,
    pub imports: Vec<ImportReport>,
    pub plan: RenamePlan,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollisionReport {
    pub name: String,
    pub description: String,
    pub collision: Collision,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenameReport {
    /// `unit::name`, or the import for an alias
    pub target: String,
    pub old: String,
    pub new: String,
    pub reason: crate::planner::RenameReason,
    pub sites: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub file: String,
    pub alias: String,
    pub path: String,
}

pub struct Merger {
    options: MergeOptions,
}

impl Merger {
    pub fn new(options: MergeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Loads and checks every unit
    pub fn load(&self, sources: &[UnitSource]) -> MergeResult<Vec<LoadedUnit>> {
        let units = load_units(sources, &self.options.index, self.options.jobs)?;
        let files: usize = units.iter().map(|u| u.files.len()).sum();
        log::info!("load: {} units, {} files", units.len(), files);
        warn_unused_packages(&units, &self.options.index);
        Ok(units)
    }

    /// Dry run: collisions, renames and added imports
    pub fn plan(&self, sources: &[UnitSource]) -> MergeResult<PlanReport> {
        let units = self.load(sources)?;
        let namespace = Namespace::build(&units);
        let (collisions, rename_plan, imports) = self.resolve_names(&namespace)?;
        Ok(report(&namespace, &collisions, rename_plan, &imports))
    }

    /// Runs the whole pipeline in memory
    pub fn merge(&self, sources: &[UnitSource]) -> MergeResult<MergedProgram> {
        let units = self.load(sources)?;
        let namespace = Namespace::build(&units);
        let (_, rename_plan, imports) = self.resolve_names(&namespace)?;

        let program = synthesize(
            &namespace,
            &rename_plan,
            &imports,
            &self.options.program_name,
            &self.options.formatter,
        )?;
        verify(&program, &self.options.index)?;
        Ok(program)
    }

    /// Merges and writes the result to `out` in one step
    pub fn merge_to_dir(&self, sources: &[UnitSource], out: &Path) -> MergeResult<MergedProgram> {
        let program = self.merge(sources)?;
        write_program(&program, out)?;
        Ok(program)
    }

    fn resolve_names(
        &self,
        namespace: &Namespace,
    ) -> MergeResult<(Vec<Collision>, RenamePlan, ImportPlan)> {
        let collisions = detect(namespace);
        log::info!(
            "detect: {} collisions ({})",
            collisions.len(),
            summarize(&collisions)
        );
        for collision in &collisions {
            log::debug!("collision: {}", collision.describe(namespace));
        }

        let rename_plan = plan(namespace, &collisions)?;
        let imports = reconcile(namespace, &rename_plan, &self.options.index)?;
        Ok((collisions, rename_plan, imports))
    }
}

fn report(
    namespace: &Namespace,
    collisions: &[Collision],
    plan: RenamePlan,
    imports: &ImportPlan,
) -> PlanReport {
    let collisions = collisions
        .iter()
        .map(|c| CollisionReport {
            name: c.name().to_string(),
            description: c.describe(namespace),
            collision: c.clone(),
        })
        .collect();

    let symbol_renames = plan.symbols.iter().map(|(key, rename)| RenameReport {
        target: namespace.describe(*key),
        old: rename.old.clone(),
        new: rename.new.clone(),
        reason: rename.reason,
        sites: rename.sites.len(),
    });
    let alias_renames = plan.aliases.iter().map(|(key, rename)| RenameReport {
        target: namespace.describe_alias(*key),
        old: rename.old.clone(),
        new: rename.new.clone(),
        reason: rename.reason,
        sites: rename.sites.len(),
    });
    let renames = symbol_renames.chain(alias_renames).collect();

    let imports = imports
        .added
        .iter()
        .flat_map(|(file, added)| {
            let path = namespace
                .unit(file.unit)
                .and_then(|u| u.files.get(file.file).map(|f| output_path(&u.name, &f.name)))
                .unwrap_or_default();
            added.iter().map(move |import| ImportReport {
                file: path.clone(),
                alias: import.alias.clone(),
                path: import.path.clone(),
            })
        })
        .collect();

    PlanReport {
        units: namespace.units().iter().map(|u| u.name.clone()).collect(),
        collisions,
        renames,
        imports,
        plan,
    }
}

fn warn_unused_packages(units: &[LoadedUnit], index: &DependencyIndex) {
    let imported: BTreeSet<&str> = units
        .iter()
        .flat_map(|u| u.analysis.bindings.iter().flatten())
        .map(|b| b.path.as_str())
        .collect();
    for path in index.known_paths() {
        if !imported.contains(path) {
            let diag = Diagnostic::warning(
                error_codes::UNUSED_DEPENDENCY,
                format!("dependency `{}` is never imported", path),
                Span::unknown(),
            );
            log::warn!("{}", diag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> MergeOptions {
        MergeOptions {
            program_name: "box".to_string(),
            jobs: 2,
            ..MergeOptions::default()
        }
    }

    #[test]
    fn test_merge_two_units() {
        let sources = vec![
            UnitSource::new("ls", [("main.ub", "fn main() { println(\"ls\"); }\n")]),
            UnitSource::new("cat", [("main.ub", "fn main() { println(\"cat\"); }\n")]),
        ];
        let program = Merger::new(options()).merge(&sources).unwrap();

        let paths: Vec<&str> = program.files.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["cat/main.ub", "ls/main.ub", "registry.ub"]);
        assert_eq!(program.manifest.program, "box");
        assert_eq!(program.manifest.registry.len(), 2);
        assert!(program.files["cat/main.ub"].contains("fn main_cat()"));
    }

    #[test]
    fn test_plan_reports_renames() {
        let sources = vec![
            UnitSource::new("a", [("main.ub", "fn helper() {}\nfn main() { helper(); }\n")]),
            UnitSource::new("b", [("main.ub", "fn helper() {}\nfn main() { helper(); }\n")]),
        ];
        let report = Merger::new(options()).plan(&sources).unwrap();

        assert_eq!(report.units, vec!["a", "b"]);
        let helper = report
            .renames
            .iter()
            .find(|r| r.target == "b::helper")
            .unwrap();
        assert_eq!(helper.new, "helper_b");
        assert_eq!(helper.sites, 2);
        assert!(report.renames.iter().all(|r| r.target != "a::helper"));
        assert!(report
            .collisions
            .iter()
            .any(|c| c.description == "`helper` declared by a, b"));
    }

    #[test]
    fn test_load_failure_aborts() {
        let sources = vec![UnitSource::new("a", [("main.ub", "fn helper() {}\n")])];
        let err = Merger::new(options()).merge(&sources).unwrap_err();
        assert_eq!(err.unit(), Some("a"));
    }
}
