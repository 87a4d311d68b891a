use std::fs;
use unibox_linker::*;

fn options() -> MergeOptions {
    MergeOptions {
        program_name: "box".to_string(),
        jobs: 2,
        ..MergeOptions::default()
    }
}

fn units(specs: &[(&str, &[(&str, &str)])]) -> Vec<UnitSource> {
    specs
        .iter()
        .map(|(name, files)| UnitSource::new(name, files.iter().copied()))
        .collect()
}

fn merge(specs: &[(&str, &[(&str, &str)])]) -> MergedProgram {
    Merger::new(options()).merge(&units(specs)).unwrap()
}

const SHARED: &[(&str, &[(&str, &str)])] = &[
    (
        "cat",
        &[
            ("main.ub", "var count = 0;\nfn main(args: [string]) -> int { helper(); return count; }"),
            ("util.ub", "fn helper() { count = count + 1; }"),
        ],
    ),
    (
        "ls",
        &[("main.ub", "var count: int;\nfn helper() {}\nfn main() { helper(); println(count); }")],
    ),
];

#[test]
fn test_merge_is_deterministic() {
    let first = merge(SHARED);

    let mut reversed = units(SHARED);
    reversed.reverse();
    let second = Merger::new(MergeOptions {
        jobs: 1,
        ..options()
    })
    .merge(&reversed)
    .unwrap();

    assert_eq!(first, second);
    assert_eq!(
        first.manifest_json().unwrap(),
        second.manifest_json().unwrap()
    );
}

#[test]
fn test_renamed_symbols_have_no_stale_references() {
    let program = merge(SHARED);

    let ls = &program.files["ls/main.ub"];
    assert!(ls.contains("var count_ls: int;"));
    assert!(ls.contains("fn helper_ls() {}"));
    assert!(ls.contains("helper_ls();"));
    assert!(ls.contains("println(count_ls);"));
    assert!(!ls.contains("helper();"));

    // The first unit in name order keeps its names
    let cat_util = &program.files["cat/util.ub"];
    assert!(cat_util.contains("fn helper() {"));
    assert!(cat_util.contains("count = count + 1;"));
}

#[test]
fn test_entries_registered_under_unit_names() {
    let program = merge(SHARED);
    let registry = &program.manifest.registry;

    let names: Vec<&str> = registry.names().collect();
    assert_eq!(names, vec!["cat", "ls"]);

    let cat = registry.get("cat").unwrap();
    assert_eq!(cat.entry.symbol, "main_cat");
    assert_eq!(cat.init.symbol, "initializers_cat");
    assert!(cat.entry.takes_args);
    assert!(cat.entry.returns_status);

    let registry_source = &program.files[REGISTRY_SOURCE];
    assert!(registry_source.contains("fn main(args: [string]) -> int {"));
    assert!(registry_source.contains("return runtime.dispatch(\"box\", args);"));
}

#[test]
fn test_block_comments_do_not_disturb_renames() {
    let program = merge(&[
        ("a", &[("main.ub", "fn helper() {}\nfn main() { helper(); }")]),
        (
            "b",
            &[(
                "main.ub",
                "/* Helper for b.\n * Shadows a's helper */\nfn helper() {}\nfn main() { /* call it */ helper(); }",
            )],
        ),
    ]);

    let b = &program.files["b/main.ub"];
    assert!(b.contains("fn helper_b() {}"));
    assert!(b.contains("helper_b();"));
    assert!(!b.contains("helper();"));
}

#[test]
fn test_diamond_aliases_keep_their_packages() {
    let program = merge(&[
        ("a", &[("main.ub", "import x \"lib/p1\";\nfn main() { x.run(); }")]),
        ("b", &[("main.ub", "import x \"lib/p2\";\nfn main() { x.run(); }")]),
    ]);

    assert!(program.files["a/main.ub"].starts_with("import x \"lib/p1\";\n"));
    assert!(program.files["b/main.ub"].starts_with("import x \"lib/p2\";\n"));
}

#[test]
fn test_alias_shadowed_by_other_unit_is_renamed() {
    let program = merge(&[
        ("a", &[("main.ub", "fn x() {}\nfn main() { x(); }")]),
        ("b", &[("main.ub", "import x \"lib/p2\";\nfn main() { x.run(); }")]),
    ]);

    let b = &program.files["b/main.ub"];
    assert!(b.starts_with("import x_b \"lib/p2\";\n"));
    assert!(b.contains("x_b.run();"));
    assert!(program.files["a/main.ub"].contains("fn x() {}"));
}

#[test]
fn test_conflicting_init_hooks_are_isolated() {
    let program = merge(&[
        ("a", &[("main.ub", "fn init() { println(\"a\"); }\nfn main() {}")]),
        ("b", &[("main.ub", "fn init() { println(\"b\"); }\nfn main() {}")]),
    ]);

    let a = &program.files["a/main.ub"];
    let b = &program.files["b/main.ub"];
    assert!(a.contains("fn init_a() {"));
    assert!(a.contains("fn initializers_a() {\n    init_a();\n}"));
    assert!(!a.contains("init_b"));
    assert!(b.contains("fn initializers_b() {\n    init_b();\n}"));
    assert!(!b.contains("init_a"));
    assert!(program.files.values().all(|text| !text.contains("fn init(")));
}

#[test]
fn test_implicit_dependency_import_is_added_once() {
    let index: DependencyIndex = serde_json::from_str(
        r#"{"packages": {
            "lib/dial": {"functions": {"open": "lib/net.Conn"}},
            "lib/net": {"types": ["Conn"]}
        }}"#,
    )
    .unwrap();
    let merger = Merger::new(MergeOptions {
        index,
        ..options()
    });
    let sources = units(&[(
        "a",
        &[(
            "main.ub",
            "import \"lib/dial\";\nvar c1 = dial.open();\nvar c2 = dial.open();\nfn main() {}",
        )],
    )]);

    let program = merger.merge(&sources).unwrap();
    let a = &program.files["a/main.ub"];
    assert_eq!(a.matches("import net \"lib/net\";").count(), 1);
    assert!(a.contains("var c1: net.Conn;"));
    assert!(a.contains("var c2: net.Conn;"));

    let report = merger.plan(&sources).unwrap();
    assert_eq!(report.imports.len(), 1);
    assert_eq!(report.imports[0].file, "a/main.ub");
    assert_eq!(report.imports[0].path, "lib/net");
}

#[test]
fn test_globals_initialize_in_dependency_order() {
    let program = merge(&[(
        "u",
        &[("main.ub", "var total = base + 1;\nvar base = 41;\nfn init() {}\nfn main() {}")],
    )]);

    let u = &program.files["u/main.ub"];
    assert!(u.contains("var total: int;"));
    assert!(u.contains("fn init_total_u() {\n    total = base + 1;\n}"));
    assert!(u.contains(
        "fn initializers_u() {\n    init_base_u();\n    init_total_u();\n    init_u();\n}"
    ));
}

#[test]
fn test_unit_errors_abort_the_merge() {
    let merger = Merger::new(options());

    let err = merger
        .merge(&units(&[
            ("a", &[("main.ub", "fn main() {}")]),
            ("b", &[("main.ub", "fn helper() {}")]),
        ]))
        .unwrap_err();
    assert!(matches!(err, MergeError::ContractViolation { .. }));
    assert_eq!(err.unit(), Some("b"));
    assert_eq!(err.phase(), Phase::Load);

    let err = merger
        .merge(&units(&[("a", &[("main.ub", "fn main( {}")])]))
        .unwrap_err();
    assert!(matches!(err, MergeError::Parse { .. }));
    assert_eq!(err.unit(), Some("a"));

    let err = merger
        .merge(&units(&[
            ("a", &[("main.ub", "fn main() {}")]),
            ("a", &[("other.ub", "fn main() {}")]),
        ]))
        .unwrap_err();
    assert!(matches!(err, MergeError::DuplicateUnit { .. }));
}

#[test]
fn test_plan_report_serializes() {
    let report = Merger::new(options()).plan(&units(SHARED)).unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["units"], serde_json::json!(["cat", "ls"]));
    let targets: Vec<&str> = report.renames.iter().map(|r| r.target.as_str()).collect();
    assert!(targets.contains(&"ls::helper"));
    assert!(targets.contains(&"ls::count"));
    assert!(targets.contains(&"cat::main"));
}

#[test]
fn test_merge_from_manifest_to_directory() {
    let dir = tempfile::tempdir().unwrap();
    for (name, text) in [
        ("cat", "fn main(args: [string]) -> int { return len(args); }"),
        ("true", "fn main() {}"),
    ] {
        let unit = dir.path().join("cmds").join(name);
        fs::create_dir_all(&unit).unwrap();
        fs::write(unit.join("main.ub"), text).unwrap();
    }
    let manifest_path = dir.path().join(MANIFEST_FILE);
    fs::write(
        &manifest_path,
        r#"{"name": "box", "units": ["cmds/cat", {"name": "yes", "path": "cmds/true"}], "output": "out"}"#,
    )
    .unwrap();

    let manifest = MergeManifest::from_file(&manifest_path).unwrap();
    let sources: Vec<UnitSource> = manifest
        .units
        .iter()
        .map(|spec| UnitSource::from_dir(spec.path(), spec.name()).unwrap())
        .collect();
    let out = manifest.output.clone().unwrap();

    let program = Merger::new(options()).merge_to_dir(&sources, &out).unwrap();
    assert!(out.join("cat/main.ub").is_file());
    assert!(out.join("yes/main.ub").is_file());
    assert_eq!(
        fs::read_to_string(out.join(REGISTRY_SOURCE)).unwrap(),
        program.files[REGISTRY_SOURCE]
    );
    let written = unibox_runtime::ProgramManifest::load(&out.join(REGISTRY_MANIFEST)).unwrap();
    assert_eq!(written, program.manifest);

    // A second merge into the same directory is refused and changes nothing
    let err = Merger::new(options()).merge_to_dir(&sources, &out).unwrap_err();
    assert!(matches!(err, MergeError::OutputNotEmpty { .. }));
    assert_eq!(
        fs::read_to_string(out.join(REGISTRY_SOURCE)).unwrap(),
        program.files[REGISTRY_SOURCE]
    );
}
