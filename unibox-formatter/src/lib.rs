// unibox-formatter - canonical printer for unit source files
// The merger prints every rewritten file through this crate, so output
// depends only on the syntax tree and the configuration.

pub mod config;
pub mod formatter;
pub mod visitor;

pub use config::Config;
pub use formatter::Formatter;

use anyhow::Result;
use std::path::Path;
use unibox_ast::SourceFile;

/// Format a source file on disk
pub fn format_file<P: AsRef<Path>>(path: P, config: &Config) -> Result<String> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)?;
    Formatter::new(config.clone()).format_named(&path.display().to_string(), &source)
}

/// Format source code string
pub fn format_source(source: &str, config: &Config) -> Result<String> {
    let formatter = Formatter::new(config.clone());
    formatter.format(source)
}

/// Print an already parsed (or synthesized) file
pub fn print_file(file: &SourceFile, config: &Config) -> String {
    let mut visitor = visitor::FormattingVisitor::new(config);
    visitor.visit_file(file);
    visitor.output()
}

/// Format source code with default configuration
pub fn format_with_defaults(source: &str) -> Result<String> {
    format_source(source, &Config::default())
}
