//! Shell argument validation — defense-in-depth for gate command arguments.
//!
//! Gate commands run via `std::process::Command::new(program).args(args)`,
//! which never invokes a shell, so metacharacters in an argument can't cause
//! injection on their own. We validate anyway: a gate command ultimately
//! comes from `quality-gates.json` or an auto-detected `package.json`
//! script, and a malformed or tampered one shouldn't silently run.

/// Metacharacters that indicate shell chaining/injection intent. Globbing
/// characters (`*`, `?`, `[`, `]`) are deliberately not included here —
/// legitimate gate arguments (e.g. `src/**/*.ts`) can contain them.
const INJECTION_CHARACTERS: &[char] = &[';', '|', '&', '`', '$', '(', ')', '\n', '\r'];

/// Validation error for argument checking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgValidationError {
    /// The problematic character found.
    pub character: char,
    /// Position in the input string.
    pub position: usize,
    /// The original input, truncated to 100 chars.
    pub input_preview: String,
}

impl std::fmt::Display for ArgValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "dangerous character '{}' at position {} in: {}",
            self.character.escape_default(),
            self.position,
            self.input_preview
        )
    }
}

impl std::error::Error for ArgValidationError {}

/// Validate that an argument contains no injection-class metacharacters.
/// Returns `Ok(())` if clean, `Err` with details if a dangerous character is found.
pub fn validate_arg(arg: &str) -> Result<(), ArgValidationError> {
    for (pos, ch) in arg.chars().enumerate() {
        if INJECTION_CHARACTERS.contains(&ch) {
            return Err(ArgValidationError {
                character: ch,
                position: pos,
                input_preview: if arg.len() > 100 { format!("{}...", &arg[..100]) } else { arg.to_string() },
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_arguments_pass() {
        assert!(validate_arg("hello").is_ok());
        assert!(validate_arg("--flag=value").is_ok());
        assert!(validate_arg("/path/to/file").is_ok());
        assert!(validate_arg("").is_ok());
        // Globbing chars are fine; only injection chars are blocked.
        assert!(validate_arg("*.rs").is_ok());
        assert!(validate_arg("src/**/*.ts").is_ok());
    }

    #[test]
    fn injection_characters_are_rejected() {
        let err = validate_arg("; rm -rf /").unwrap_err();
        assert_eq!(err.character, ';');
        assert_eq!(err.position, 0);

        assert_eq!(validate_arg("foo | bar").unwrap_err().character, '|');
        assert_eq!(validate_arg("foo & bar").unwrap_err().character, '&');
        assert_eq!(validate_arg("$(evil)").unwrap_err().character, '$');
        assert_eq!(validate_arg("`evil`").unwrap_err().character, '`');
        assert_eq!(validate_arg("foo\nbar").unwrap_err().character, '\n');
    }

    #[test]
    fn error_display_includes_preview() {
        let err = validate_arg("; injection").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("dangerous character"));
        assert!(msg.contains("; injection"));
    }

    #[test]
    fn long_input_is_truncated_in_preview() {
        let long = "a".repeat(200) + ";";
        let err = validate_arg(&long).unwrap_err();
        assert!(err.input_preview.ends_with("..."));
        assert!(err.input_preview.len() < 110);
    }
}
