use unibox_formatter::{format_source, format_with_defaults, Config};

#[test]
fn test_canonical_layout() {
    let source = r#"import   "lib/strings";
import fs "lib/os/files";
var   count:int=0;
fn main(args:[string])->int{let n=len(args);if n>1{println(strings.upper(args[1]));}else if n==1{exit(2);}else{}
while n<3 {n=n+1;}
return n;}
struct Point{x:int,y:int}
"#;

    let expected = r#"import "lib/strings";
import fs "lib/os/files";

var count: int = 0;

fn main(args: [string]) -> int {
    let n = len(args);
    if n > 1 {
        println(strings.upper(args[1]));
    } else if n == 1 {
        exit(2);
    } else {}
    while n < 3 {
        n = n + 1;
    }
    return n;
}

struct Point {
    x: int,
    y: int,
}
"#;

    assert_eq!(format_with_defaults(source).unwrap(), expected);
}

#[test]
fn test_idempotent() {
    let source = r#"
        import s "lib/strings";
        const GREETING = "hi\t\"there\"";
        type Names = [string];
        fn init() { println(s.upper(GREETING)); }
        fn main() { let xs: Names = ["a", "b"]; print(-(1 + 2) * 3); }
    "#;
    let once = format_with_defaults(source).unwrap();
    let twice = format_with_defaults(&once).unwrap();
    assert_eq!(once, twice);
    assert!(once.contains("const GREETING = \"hi\\t\\\"there\\\"\";"));
    assert!(once.contains("print(-(1 + 2) * 3);"));
}

#[test]
fn test_config_indent_and_spacing() {
    let config = Config {
        indent_size: 2,
        blank_lines_between_items: 0,
    };
    let formatted = format_source("fn a() { return; } fn b() {}", &config).unwrap();
    assert_eq!(formatted, "fn a() {\n  return;\n}\nfn b() {}\n");
}

#[test]
fn test_empty_file() {
    assert_eq!(format_with_defaults("// only a comment\n").unwrap(), "");
}

#[test]
fn test_refuses_broken_code() {
    assert!(format_with_defaults("fn main() {").is_err());
}

#[test]
fn test_format_file_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.ub");
    std::fs::write(&path, "fn main(){println(\"x\");}").unwrap();
    let formatted = unibox_formatter::format_file(&path, &Config::default()).unwrap();
    assert_eq!(formatted, "fn main() {\n    println(\"x\");\n}\n");
}
