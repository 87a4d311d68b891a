// Source-to-source formatting entry point

use crate::config::Config;
use crate::visitor::FormattingVisitor;
use anyhow::Result;
use unibox_parser::Parser;

/// Code formatter
pub struct Formatter {
    config: Config,
}

impl Formatter {
    /// Create new formatter with configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Format source code
    pub fn format(&self, source: &str) -> Result<String> {
        self.format_named("<input>", source)
    }

    /// Format source code, naming `file` in parse errors
    pub fn format_named(&self, file: &str, source: &str) -> Result<String> {
        // Broken code is never reformatted
        let program = Parser::with_file(file, source)?.parse()?;

        let mut visitor = FormattingVisitor::new(&self.config);
        visitor.visit_file(&program);

        Ok(visitor.output())
    }

    /// Format source code and return if it changed
    pub fn format_check(&self, source: &str) -> Result<bool> {
        let formatted = self.format(source)?;
        Ok(formatted != source)
    }
}
