//! Parses gate output into a bounded list of diagnostics.
//!
//! TypeScript gets a dedicated regex since `tsc --noEmit` output is
//! structured; every other gate collapses to one message per line that
//! mentions "error" or "failed", same as the rustc-diagnostic parser does
//! for unrecognized compiler output.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const MAX_DIAGNOSTICS_PER_GATE: usize = 10;

static TS_DIAGNOSTIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<file>.+)\((?P<line>\d+),(?P<col>\d+)\): error TS(?P<code>\d+): (?P<message>.+)$").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnostic {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub code: Option<String>,
    pub message: String,
}

/// Parse TypeScript compiler output, one diagnostic per matching line,
/// capped at [`MAX_DIAGNOSTICS_PER_GATE`].
pub fn parse_typescript(output: &str) -> Vec<Diagnostic> {
    output
        .lines()
        .filter_map(|line| {
            TS_DIAGNOSTIC.captures(line).map(|caps| Diagnostic {
                file: Some(caps["file"].to_string()),
                line: caps["line"].parse().ok(),
                column: caps["col"].parse().ok(),
                code: Some(format!("TS{}", &caps["code"])),
                message: caps["message"].to_string(),
            })
        })
        .take(MAX_DIAGNOSTICS_PER_GATE)
        .collect()
}

/// Generic fallback: one diagnostic per line containing "error" or "failed"
/// (case-insensitive), capped at [`MAX_DIAGNOSTICS_PER_GATE`].
pub fn parse_generic(output: &str) -> Vec<Diagnostic> {
    output
        .lines()
        .filter(|line| {
            let lower = line.to_lowercase();
            lower.contains("error") || lower.contains("failed")
        })
        .take(MAX_DIAGNOSTICS_PER_GATE)
        .map(|line| Diagnostic { file: None, line: None, column: None, code: None, message: line.trim().to_string() })
        .collect()
}

pub fn parse(gate_name: &str, output: &str) -> Vec<Diagnostic> {
    if gate_name == "typescript" {
        let parsed = parse_typescript(output);
        if !parsed.is_empty() {
            return parsed;
        }
    }
    parse_generic(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typescript_diagnostic_line() {
        let output = "src/app.ts(12,5): error TS2322: Type 'string' is not assignable to type 'number'.";
        let diagnostics = parse_typescript(output);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].file.as_deref(), Some("src/app.ts"));
        assert_eq!(diagnostics[0].line, Some(12));
        assert_eq!(diagnostics[0].code.as_deref(), Some("TS2322"));
    }

    #[test]
    fn generic_parse_collapses_to_error_lines() {
        let output = "Running build...\nmodule a failed to compile\nall good here\nerror: missing semicolon";
        let diagnostics = parse_generic(output);
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn caps_at_ten_diagnostics() {
        let output = (0..20).map(|i| format!("error: problem {i}")).collect::<Vec<_>>().join("\n");
        assert_eq!(parse_generic(&output).len(), 10);
    }

    #[test]
    fn parse_falls_back_to_generic_for_unrecognized_typescript_output() {
        let output = "error: could not find tsconfig.json";
        let diagnostics = parse("typescript", output);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].file.is_none());
    }
}
