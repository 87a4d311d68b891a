// Diagnostic reporting for the unit merger
// Rust-style messages with spans, colors and "did you mean" suggestions

use colored::Colorize;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Source code location (line, column, file)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Span {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub length: usize, // Length of the error span
}

impl Span {
    pub fn new(file: String, line: usize, column: usize, length: usize) -> Self {
        Self {
            file,
            line,
            column,
            length,
        }
    }

    pub fn from_file_and_span(file: &str, source: &str, span: std::ops::Range<usize>) -> Self {
        let before = source.get(..span.start).unwrap_or(source);
        let line = before.chars().filter(|&c| c == '\n').count() + 1;
        let column = before
            .rsplit('\n')
            .next()
            .map_or(1, |l| l.chars().count() + 1);
        let length = span.end.saturating_sub(span.start).max(1);

        Self {
            file: file.to_string(),
            line,
            column,
            length,
        }
    }

    pub fn unknown() -> Self {
        Self {
            file: "<unknown>".to_string(),
            line: 0,
            column: 0,
            length: 0,
        }
    }

    /// Create span from file path
    pub fn from_path(path: &Path) -> Self {
        Self {
            file: path.display().to_string(),
            line: 0,
            column: 0,
            length: 0,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}", self.file)
        } else {
            write!(f, "{}:{}:{}", self.file, self.line, self.column)
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorLevel {
    Error,
    Warning,
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorLevel::Error => write!(f, "{}", "error".red().bold()),
            ErrorLevel::Warning => write!(f, "{}", "warning".yellow().bold()),
        }
    }
}

/// Structured diagnostic message
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub level: ErrorLevel,
    pub code: String, // e.g. "E0102" for a duplicate declaration
    pub message: String,
    pub span: Span,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<Suggestion>,
}

/// Code suggestion with replacement
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub message: String,
    pub replacement: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn new(level: ErrorLevel, code: &str, message: String, span: Span) -> Self {
        Self {
            level,
            code: code.to_string(),
            message,
            span,
            notes: Vec::new(),
            help: None,
            suggestion: None,
        }
    }

    pub fn error(code: &str, message: String, span: Span) -> Self {
        Self::new(ErrorLevel::Error, code, message, span)
    }

    pub fn warning(code: &str, message: String, span: Span) -> Self {
        Self::new(ErrorLevel::Warning, code, message, span)
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    pub fn with_suggestion(mut self, message: String, replacement: String, span: Span) -> Self {
        self.suggestion = Some(Suggestion {
            message,
            replacement,
            span,
        });
        self
    }

    /// Format diagnostic in Rust-style
    pub fn format(&self, source_code: &str) -> String {
        let mut output = self.header();

        // Source code snippet with highlight
        if let Some(snippet) = self.get_source_snippet(source_code) {
            output.push_str(&snippet);
        }

        output.push_str(&self.trailer());

        // Suggestion
        if let Some(suggestion) = &self.suggestion {
            output.push_str(&format!(
                " {} {}\n",
                "help:".green().bold(),
                suggestion.message
            ));
            if let Some(suggested_snippet) = self.get_suggestion_snippet(source_code) {
                output.push_str(&suggested_snippet);
            }
        }

        output
    }

    // error[E0102]: message
    //  --> file.ub:12:15
    fn header(&self) -> String {
        let mut output = if self.code.is_empty() {
            format!("{}: {}\n", self.level, self.message.bold())
        } else {
            format!("{}[{}]: {}\n", self.level, self.code, self.message.bold())
        };

        output.push_str(&format!(" {} {}\n", "-->".cyan().bold(), self.span));
        output
    }

    fn trailer(&self) -> String {
        let mut output = String::new();

        for note in &self.notes {
            output.push_str(&format!(" {} {}\n", "=".cyan().bold(), note.cyan()));
        }

        if let Some(help) = &self.help {
            output.push_str(&format!(" {} {}\n", "help:".green().bold(), help));
        }

        output
    }

    /// Extract source code snippet with error highlight
    fn get_source_snippet(&self, source_code: &str) -> Option<String> {
        if self.span.line == 0 {
            return None;
        }
        let line = source_code.lines().nth(self.span.line - 1)?;

        let mut snippet = String::new();

        // Line number with padding
        let line_num_width = self.span.line.to_string().len().max(2);

        snippet.push_str(&format!(" {}\n", " ".repeat(line_num_width + 1).cyan()));

        snippet.push_str(&format!(
            " {} {} {}\n",
            format!("{:>width$}", self.span.line, width = line_num_width)
                .cyan()
                .bold(),
            "|".cyan().bold(),
            line
        ));

        // Error indicator (^^^)
        let padding = " ".repeat(self.span.column.saturating_sub(1));
        let underline = "^".repeat(self.span.length.max(1));
        snippet.push_str(&format!(
            " {} {} {}{}\n",
            " ".repeat(line_num_width).cyan(),
            "|".cyan().bold(),
            padding,
            underline.red().bold()
        ));

        Some(snippet)
    }

    /// Get suggestion snippet with replacement
    fn get_suggestion_snippet(&self, source_code: &str) -> Option<String> {
        let suggestion = self.suggestion.as_ref()?;
        if suggestion.span.line == 0 {
            return None;
        }
        let line = source_code.lines().nth(suggestion.span.line - 1)?;

        let line_num_width = suggestion.span.line.to_string().len().max(2);

        let chars: Vec<char> = line.chars().collect();
        let col = suggestion.span.column.saturating_sub(1).min(chars.len());
        let end = (col + suggestion.span.length).min(chars.len());
        let before: String = chars.iter().take(col).collect();
        let after: String = chars.iter().skip(end).collect();
        let modified_line = format!("{}{}{}", before, &suggestion.replacement, after);

        let mut snippet = String::new();
        snippet.push_str(&format!(
            " {} {} {}\n",
            format!("{:>width$}", suggestion.span.line, width = line_num_width)
                .cyan()
                .bold(),
            "|".cyan().bold(),
            modified_line
        ));

        // Indicator for added text
        let padding = " ".repeat(col);
        let indicator = "+".repeat(suggestion.replacement.chars().count());
        snippet.push_str(&format!(
            " {} {} {}{}\n",
            " ".repeat(line_num_width).cyan(),
            "|".cyan().bold(),
            padding,
            indicator.green().bold()
        ));

        Some(snippet)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.header(), self.trailer())
    }
}

/// Diagnostic collection and reporting engine
#[derive(Debug, Default)]
pub struct DiagnosticEngine {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, diagnostic: Diagnostic) {
        match diagnostic.level {
            ErrorLevel::Error => self.error_count += 1,
            ErrorLevel::Warning => self.warning_count += 1,
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Print all diagnostics to stderr, with snippets when the file's source is known
    pub fn print_all(&self, source_for: impl Fn(&str) -> Option<String>) {
        for diag in &self.diagnostics {
            match source_for(&diag.span.file) {
                Some(source) => eprintln!("{}", diag.format(&source)),
                None => eprintln!("{}", diag),
            }
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        if self.error_count > 0 {
            eprintln!(
                "\n{}: {} error{} emitted",
                "error".red().bold(),
                self.error_count,
                if self.error_count == 1 { "" } else { "s" }
            );
        }

        if self.warning_count > 0 {
            eprintln!(
                "{}: {} warning{} emitted",
                "warning".yellow().bold(),
                self.warning_count,
                if self.warning_count == 1 { "" } else { "s" }
            );
        }
    }

    /// Export diagnostics as JSON for tooling
    pub fn to_json(&self) -> String {
        serde_json::json!({ "diagnostics": self.diagnostics }).to_string()
    }
}

/// Declaration appearing twice inside one unit
pub fn duplicate_declaration(name: &str, span: Span, previous: &Span) -> Diagnostic {
    Diagnostic::error(
        error_codes::DUPLICATE_DECLARATION,
        format!("`{}` is declared more than once", name),
        span,
    )
    .with_note(format!("previous declaration at {}", previous))
}

/// Undefined name with "did you mean?" help
pub fn undefined_name(name: &str, span: Span, suggestions: Vec<String>) -> Diagnostic {
    let span_of_name = span.clone();
    let diag = Diagnostic::error(
        error_codes::UNDEFINED_NAME,
        format!("cannot find `{}` in this scope", name),
        span,
    );

    match suggestions.first() {
        None => diag,
        Some(best) => {
            let replacement = best.clone();
            diag.with_help(format!("did you mean `{}`?", suggestions.join("`, `")))
                .with_suggestion(
                    format!("replace with `{}`", replacement),
                    replacement,
                    span_of_name,
                )
        }
    }
}

/// Error codes reported by the merger
pub mod error_codes {
    // Syntax errors (E0001-E0099)
    pub const SYNTAX_ERROR: &str = "E0001";
    pub const INVALID_TOKEN: &str = "E0002";

    // Unit contract (E0100-E0199)
    pub const MISSING_ENTRY: &str = "E0100";
    pub const MULTIPLE_ENTRY: &str = "E0101";
    pub const DUPLICATE_DECLARATION: &str = "E0102";
    pub const UNDEFINED_NAME: &str = "E0103";
    pub const BAD_SIGNATURE: &str = "E0104";
    pub const UNTYPED_GLOBAL: &str = "E0105";
    pub const INIT_CYCLE: &str = "E0106";
    pub const IMPORT_CONFLICT: &str = "E0107";
    pub const RESERVED_NAME: &str = "E0108";
    pub const NON_CONSTANT: &str = "E0109";

    // Merge invocation (E0200-E0299)
    pub const DUPLICATE_UNIT: &str = "E0200";
    pub const INVALID_UNIT_NAME: &str = "E0201";
    pub const EMPTY_UNIT: &str = "E0202";
    pub const OUTPUT_NOT_EMPTY: &str = "E0203";
    pub const IO_ERROR: &str = "E0204";
    pub const DEPENDENCY_INDEX: &str = "E0205";

    // Merger bugs (E0900-E0999)
    pub const INTERNAL_INVARIANT: &str = "E0900";

    // Warnings (W0001-W9999)
    pub const UNUSED_DEPENDENCY: &str = "W0001";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_format() {
        colored::control::set_override(false);
        let source = "fn main() {\n    pritn(\"hello\");\n}";

        let span = Span::new("cat/main.ub".to_string(), 2, 5, 5);
        let diag = undefined_name("pritn", span, vec!["print".to_string()]);

        let formatted = diag.format(source);

        assert!(formatted.contains("error[E0103]"));
        assert!(formatted.contains("cannot find `pritn` in this scope"));
        assert!(formatted.contains("cat/main.ub:2:5"));
        assert!(formatted.contains("    ^^^^^"));
        assert!(formatted.contains("did you mean `print`?"));
        assert!(formatted.contains("replace with `print`"));
        assert!(formatted.contains("    print(\"hello\");"));

        let plain = undefined_name("zzz", Span::unknown(), Vec::new());
        assert!(plain.help.is_none());
        assert!(plain.suggestion.is_none());
    }

    #[test]
    fn test_span_from_byte_range() {
        let source = "var a = 1;\nvar b = c;";
        let span = Span::from_file_and_span("x.ub", source, 19..20);
        assert_eq!((span.line, span.column, span.length), (2, 9, 1));
    }

    #[test]
    fn test_engine_counts_and_json() {
        let mut engine = DiagnosticEngine::new();
        engine.emit(Diagnostic::error(
            error_codes::MISSING_ENTRY,
            "unit `cat` has no entry function".to_string(),
            Span::unknown(),
        ));
        engine.emit(Diagnostic::warning(
            error_codes::UNUSED_DEPENDENCY,
            "dependency `lib/x` is never imported".to_string(),
            Span::unknown(),
        ));

        assert!(engine.has_errors());
        assert_eq!(engine.error_count(), 1);
        assert_eq!(engine.warning_count(), 1);

        let json: serde_json::Value = serde_json::from_str(&engine.to_json()).unwrap();
        assert_eq!(json["diagnostics"][0]["code"], "E0100");
        assert_eq!(json["diagnostics"][0]["level"], "error");
        assert_eq!(json["diagnostics"][1]["level"], "warning");
        assert!(json["diagnostics"][1].get("help").is_none());
    }
}

/// Fuzzy matching utilities for "did you mean?" suggestions
pub mod fuzzy {
    use strsim::jaro_winkler;

    /// Find similar names using fuzzy matching (Jaro-Winkler distance)
    /// Returns up to `max_suggestions` names with similarity > threshold
    pub fn find_similar_names<S: AsRef<str>>(
        target: &str,
        candidates: &[S],
        threshold: f64,
        max_suggestions: usize,
    ) -> Vec<String> {
        let mut scored: Vec<(String, f64)> = candidates
            .iter()
            .map(|candidate| {
                let candidate = candidate.as_ref();
                (candidate.to_string(), jaro_winkler(target, candidate))
            })
            .filter(|(name, score)| *score > threshold && name != target)
            .collect();

        // Sort by similarity (descending), ties by name for stable output
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.dedup_by(|a, b| a.0 == b.0);

        scored
            .into_iter()
            .take(max_suggestions)
            .map(|(name, _)| name)
            .collect()
    }

}
