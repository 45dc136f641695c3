//! Output mode flags shared by every subcommand.
//!
//! `main` records the global `--json` / `--quiet` / `--verbose` flags in the
//! environment so subcommands can check them without threading them through.

const JSON_VAR: &str = "FLIPBOOK_DL_JSON";
const QUIET_VAR: &str = "FLIPBOOK_DL_QUIET";
const VERBOSE_VAR: &str = "FLIPBOOK_DL_VERBOSE";

/// Record the global flags for this process.
pub fn init(json: bool, quiet: bool, verbose: bool) {
    for (var, on) in [(JSON_VAR, json), (QUIET_VAR, quiet), (VERBOSE_VAR, verbose)] {
        if on {
            std::env::set_var(var, "1");
        }
    }
}

fn flag(var: &str) -> bool {
    std::env::var(var).is_ok_and(|v| v == "1")
}

pub fn is_json() -> bool {
    flag(JSON_VAR)
}

pub fn is_quiet() -> bool {
    flag(QUIET_VAR)
}

pub fn is_verbose() -> bool {
    flag(VERBOSE_VAR)
}

/// Whether a failed command is worth running again as is.
pub fn is_retryable(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<crate::Error>()
        .is_some_and(crate::Error::is_retryable)
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors_through_anyhow() {
        let transient = anyhow::Error::new(crate::Error::PageCaptureFailed {
            page: 2,
            attempts: 2,
            cause: "timed out".to_string(),
        });
        assert!(is_retryable(&transient));

        let permanent = anyhow::Error::new(crate::Error::InvalidIdentifier("x".to_string()));
        assert!(!is_retryable(&permanent));
        assert!(!is_retryable(&anyhow::anyhow!("plain failure")));
    }
}
