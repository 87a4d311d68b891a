use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use unibox_diagnostics::DiagnosticEngine;
use unibox_formatter::Config;
use unibox_linker::merge::default_jobs;
use unibox_linker::resolve::SymbolKind;
use unibox_linker::{
    load_unit, DependencyIndex, MergeError, MergeManifest, MergeOptions, Merger, PlanReport,
    UnitSource, MANIFEST_FILE,
};
use unibox_runtime::{
    DispatchError, Dispatcher, Entry, EntryRef, Initializer, InvocationContext, ProgramManifest,
    Registry, ThunkRef,
};

#[derive(Parser)]
#[command(name = "unibox")]
#[command(version = "0.2.0")]
#[command(about = "Merge independent programs into one multi-call program", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge units into one program
    Merge {
        /// Unit directories (default: the manifest's units)
        #[arg(value_name = "UNITS")]
        units: Vec<PathBuf>,

        /// Output directory (must be absent or empty)
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,

        /// Merge manifest (default: ./unibox.json when no units are given)
        #[arg(long, value_name = "FILE")]
        manifest: Option<PathBuf>,

        /// Dependency index
        #[arg(long, value_name = "FILE")]
        deps: Option<PathBuf>,

        /// Loader workers
        #[arg(short, long, value_name = "N")]
        jobs: Option<usize>,

        /// Multiplexer name of the merged program
        #[arg(long, value_name = "NAME")]
        name: Option<String>,

        /// Output diagnostics and the registry as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show collisions and the rename plan without writing anything
    Plan {
        #[arg(value_name = "UNITS")]
        units: Vec<PathBuf>,

        #[arg(long, value_name = "FILE")]
        manifest: Option<PathBuf>,

        #[arg(long, value_name = "FILE")]
        deps: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Load one unit and report its entry, initializers and symbols
    Check {
        /// Unit directory
        #[arg(value_name = "UNIT")]
        unit: PathBuf,

        #[arg(long, value_name = "FILE")]
        deps: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Format unit source code
    Fmt {
        /// Input .ub file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Format in place
        #[arg(short, long)]
        in_place: bool,
    },

    /// Resolve an invocation against a merged program's registry.json
    Dispatch {
        #[arg(long, value_name = "FILE", default_value = "registry.json")]
        registry: PathBuf,

        /// Invocation as the merged program would see it, argv[0] first
        #[arg(last = true, value_name = "ARGV")]
        argv: Vec<String>,
    },
}

/// Everything a merge or plan run needs, after flags override the manifest
#[derive(Debug)]
struct MergeSettings {
    sources: Vec<UnitSource>,
    options: MergeOptions,
    output: Option<PathBuf>,
}

struct Overrides {
    units: Vec<PathBuf>,
    manifest: Option<PathBuf>,
    deps: Option<PathBuf>,
    jobs: Option<usize>,
    name: Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Merge {
            units,
            output,
            manifest,
            deps,
            jobs,
            name,
            json,
        } => {
            let settings = merge_settings(Overrides {
                units,
                manifest,
                deps,
                jobs,
                name,
            })?;
            let out = output
                .or(settings.output.clone())
                .context("no output directory: pass -o OUT or set `output` in unibox.json")?;

            if !json {
                println!(
                    "🔗 Merging {} units into {}",
                    settings.sources.len(),
                    out.display()
                );
            }

            let merger = Merger::new(settings.options);
            match merger.merge_to_dir(&settings.sources, &out) {
                Ok(program) => {
                    if json {
                        println!("{}", program.manifest_json()?);
                    } else {
                        for name in program.manifest.registry.names() {
                            println!("   ✅ {}", name);
                        }
                        println!(
                            "✅ Wrote {} files to {}",
                            program.files.len() + 1,
                            out.display()
                        );
                    }
                    Ok(())
                }
                Err(err) => Err(report_merge_error(err, &settings.sources, json)),
            }
        }

        Commands::Plan {
            units,
            manifest,
            deps,
            json,
        } => {
            let settings = merge_settings(Overrides {
                units,
                manifest,
                deps,
                jobs: None,
                name: None,
            })?;
            let merger = Merger::new(settings.options);
            match merger.plan(&settings.sources) {
                Ok(report) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        print_plan(&report);
                    }
                    Ok(())
                }
                Err(err) => Err(report_merge_error(err, &settings.sources, json)),
            }
        }

        Commands::Check { unit, deps, json } => {
            let index = load_index(deps.as_deref())?;
            let source = UnitSource::from_dir(&unit, None)?;
            if !json {
                println!("🔍 Checking: {}", unit.display());
            }

            match load_unit(&source, &index) {
                Ok(loaded) => {
                    let report = CheckReport::new(&loaded);
                    if json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        print_check(&report);
                    }
                    Ok(())
                }
                Err(err) => Err(report_merge_error(err, std::slice::from_ref(&source), json)),
            }
        }

        Commands::Fmt { input, in_place } => {
            let config = Config::from_dir(input.parent().unwrap_or(Path::new(".")))?;
            let formatted = unibox_formatter::format_file(&input, &config)?;

            if in_place {
                std::fs::write(&input, &formatted)
                    .with_context(|| format!("Failed to write {}", input.display()))?;
                println!("✅ Formatted {} in place", input.display());
            } else {
                print!("{}", formatted);
            }
            Ok(())
        }

        Commands::Dispatch { registry, argv } => {
            let manifest = ProgramManifest::load(&registry)
                .with_context(|| format!("Failed to read {}", registry.display()))?;
            match dry_run(&manifest, argv) {
                Ok(status) => {
                    println!("✅ Exit status {}", status);
                    Ok(())
                }
                Err(err) => {
                    eprintln!("❌ {}", err);
                    if let DispatchError::UnknownCommand { suggestions, .. } = &err {
                        if !suggestions.is_empty() {
                            eprintln!("   did you mean `{}`?", suggestions.join("`, `"));
                        }
                    }
                    std::process::exit(err.exit_status());
                }
            }
        }
    }
}

/// Reads the manifest (if any) and applies command-line overrides
fn merge_settings(overrides: Overrides) -> Result<MergeSettings> {
    let manifest_path = match overrides.manifest {
        Some(path) => Some(path),
        None if overrides.units.is_empty() => Some(PathBuf::from(MANIFEST_FILE)),
        None => None,
    };
    let manifest = manifest_path
        .map(|path| MergeManifest::from_file(&path))
        .transpose()?;

    let sources = if overrides.units.is_empty() {
        let specs = manifest.as_ref().map(|m| m.units.as_slice()).unwrap_or_default();
        specs
            .iter()
            .map(|spec| UnitSource::from_dir(spec.path(), spec.name()))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        overrides
            .units
            .iter()
            .map(|dir| UnitSource::from_dir(dir, None))
            .collect::<Result<Vec<_>, _>>()?
    };
    if sources.is_empty() {
        anyhow::bail!("no units to merge");
    }

    let deps = overrides
        .deps
        .or_else(|| manifest.as_ref().and_then(|m| m.dependencies.clone()));
    let jobs = overrides
        .jobs
        .or_else(|| manifest.as_ref().and_then(|m| m.jobs))
        .unwrap_or_else(default_jobs);
    if jobs == 0 {
        anyhow::bail!("--jobs must be at least 1");
    }

    let defaults = MergeOptions::default();
    let options = MergeOptions {
        program_name: overrides
            .name
            .or_else(|| manifest.as_ref().map(|m| m.name.clone()))
            .unwrap_or(defaults.program_name),
        jobs,
        formatter: manifest
            .as_ref()
            .map(|m| m.formatter.clone())
            .unwrap_or(defaults.formatter),
        index: load_index(deps.as_deref())?,
    };

    Ok(MergeSettings {
        sources,
        options,
        output: manifest.and_then(|m| m.output),
    })
}

fn load_index(path: Option<&Path>) -> Result<DependencyIndex> {
    match path {
        Some(path) => Ok(DependencyIndex::load(path)?),
        None => Ok(DependencyIndex::default()),
    }
}

/// Prints the error's diagnostics with source snippets and hands the error back
fn report_merge_error(err: MergeError, sources: &[UnitSource], json: bool) -> anyhow::Error {
    let mut engine = DiagnosticEngine::new();
    for diag in err.diagnostics() {
        engine.emit(diag);
    }

    if json {
        println!("{}", engine.to_json());
    } else {
        eprintln!("❌ {} failed", err.phase());
        engine.print_all(|file| {
            sources
                .iter()
                .flat_map(|unit| &unit.files)
                .find(|f| f.display == file)
                .map(|f| f.text.clone())
        });
        engine.print_summary();
    }
    anyhow::Error::new(err)
}

fn print_plan(report: &PlanReport) {
    println!("📋 Units: {}", report.units.join(", "));

    println!("\n{} ({})", "Collisions".bold(), report.collisions.len());
    for collision in &report.collisions {
        println!("   {} {}", "•".yellow(), collision.description);
    }

    println!("\n{} ({})", "Renames".bold(), report.renames.len());
    for rename in &report.renames {
        println!(
            "   {} {} {} {}  ({:?}, {} sites)",
            rename.target,
            rename.old.dimmed(),
            "→".cyan(),
            rename.new.green(),
            rename.reason,
            rename.sites
        );
    }

    if !report.imports.is_empty() {
        println!("\n{} ({})", "Added imports".bold(), report.imports.len());
        for import in &report.imports {
            println!("   {}: import {} \"{}\"", import.file, import.alias, import.path);
        }
    }

    println!("\n{} runtime imported as `{}`", "Dispatcher".bold(), report.plan.runtime_alias);
}

#[derive(Debug, Serialize)]
struct CheckReport {
    unit: String,
    files: Vec<String>,
    entry: String,
    takes_args: bool,
    returns_status: bool,
    initializers: Vec<String>,
    symbols: Vec<SymbolReport>,
}

#[derive(Debug, Serialize)]
struct SymbolReport {
    name: String,
    kind: SymbolKind,
    file: String,
}

impl CheckReport {
    fn new(unit: &unibox_linker::LoadedUnit) -> Self {
        let file_name = |file: usize| {
            unit.files
                .get(file)
                .map(|f| f.name.clone())
                .unwrap_or_default()
        };
        let located = |id: usize| {
            unit.symbol(id)
                .map(|s| format!("{} ({})", s.name, file_name(s.file)))
                .unwrap_or_default()
        };

        Self {
            unit: unit.name.clone(),
            files: unit.files.iter().map(|f| f.name.clone()).collect(),
            entry: located(unit.entry),
            takes_args: unit.signature.takes_args,
            returns_status: unit.signature.returns_status,
            initializers: unit.initializers.iter().map(|&id| located(id)).collect(),
            symbols: unit
                .analysis
                .symbols
                .iter()
                .map(|s| SymbolReport {
                    name: s.name.clone(),
                    kind: s.kind,
                    file: file_name(s.file),
                })
                .collect(),
        }
    }
}

fn print_check(report: &CheckReport) {
    println!("✅ Unit `{}` OK ({} files)", report.unit, report.files.len());
    let mut signature = Vec::new();
    if report.takes_args {
        signature.push("takes args");
    }
    if report.returns_status {
        signature.push("returns status");
    }
    if signature.is_empty() {
        println!("   entry: {}", report.entry);
    } else {
        println!("   entry: {} [{}]", report.entry, signature.join(", "));
    }
    if report.initializers.is_empty() {
        println!("   initializers: none");
    } else {
        println!("   initializers: {}", report.initializers.join(", "));
    }
    println!("   symbols:");
    for symbol in &report.symbols {
        println!(
            "     {:<8} {} {}",
            kind_label(symbol.kind),
            symbol.name,
            symbol.file.dimmed()
        );
    }
}

fn kind_label(kind: SymbolKind) -> &'static str {
    match kind {
        SymbolKind::Function => "fn",
        SymbolKind::Variable => "var",
        SymbolKind::Constant => "const",
        SymbolKind::Type => "struct",
    }
}

/// Initializer thunk as recorded in registry.json; running it reports it
struct PlannedInit(ThunkRef);

/// Entry as recorded in registry.json; always reports success
struct PlannedEntry(EntryRef);

impl Initializer for PlannedInit {
    fn initialize(&self) {
        println!("   ▶ {}()  {}", self.0.symbol, self.0.file.dimmed());
    }
}

impl Entry for PlannedEntry {
    fn enter(&self, args: &[String]) -> i32 {
        let call = if self.0.takes_args {
            format!("{}({:?})", self.0.symbol, args)
        } else {
            format!("{}()", self.0.symbol)
        };
        println!("   ▶ {}  {}", call, self.0.file.dimmed());
        0
    }
}

/// Runs the dispatcher over the recorded registry without executing any unit
fn dry_run(manifest: &ProgramManifest, argv: Vec<String>) -> Result<i32, DispatchError> {
    let mut builder = Registry::builder();
    for (name, entry) in manifest.registry.iter() {
        // Names come from an already validated registry
        let registered = builder.register(
            name,
            PlannedInit(entry.init.clone()),
            PlannedEntry(entry.entry.clone()),
        );
        if let Err(err) = registered {
            log::warn!("skipping `{}`: {}", name, err);
        }
    }
    let registry = builder.build();

    let mut dispatcher = Dispatcher::new(&manifest.program, &registry);
    dispatcher.run(&InvocationContext::new(argv))
}
