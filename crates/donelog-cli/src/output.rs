//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use anyhow::{Context, Result};
use serde::Serialize;

use donelog_core::{LogEntry, StorageError};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a single entry
    pub fn print_entry(&self, entry: &LogEntry) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", entry.id);
                println!("When:     {}", entry.timestamp.format("%Y-%m-%d %H:%M"));
                if let Some(modified) = entry.modified_at {
                    println!("Modified: {}", modified.format("%Y-%m-%d %H:%M:%S"));
                }
                if entry.is_deleted {
                    println!("Status:   in trash");
                }
                println!();
                println!("{}", entry.content);
            }
            OutputFormat::Json => print_json(entry)?,
            OutputFormat::Quiet => println!("{}", entry.id),
        }
        Ok(())
    }

    /// Print a list of entries, one line each
    pub fn print_entries(&self, entries: &[LogEntry], empty: &str) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                if entries.is_empty() {
                    println!("{}", empty);
                    return Ok(());
                }
                for entry in entries {
                    println!(
                        "{} | {} | {}",
                        short_id(&entry.id),
                        entry.timestamp.format("%Y-%m-%d %H:%M"),
                        truncate_line(&entry.content, 60)
                    );
                }
                println!("\n{} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
            }
            OutputFormat::Json => print_json(&entries)?,
            OutputFormat::Quiet => {
                for entry in entries {
                    println!("{}", entry.id);
                }
            }
        }
        Ok(())
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Recovery hint for a local storage failure anywhere in the error chain
pub fn recovery_hint(error: &anyhow::Error) -> Option<&'static str> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<StorageError>())
        .and_then(StorageError::recovery_suggestion)
}

/// Pretty-print any serializable value as JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

/// First eight characters of an id
pub fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("überlange zeile", 8), "überl...");
    }

    #[test]
    fn test_truncate_line() {
        assert_eq!(truncate_line("single line", 20), "single line");
        assert_eq!(truncate_line("line one\nline two", 20), "line one");
        assert_eq!(truncate_line("", 20), "");
    }

    #[test]
    fn test_recovery_hint_found_through_context() {
        let err = anyhow::Error::new(StorageError::AmbiguousId {
            prefix: "ab".to_string(),
            count: 2,
        })
        .context("Failed to delete entry");
        assert_eq!(recovery_hint(&err), Some("Use more characters of the entry id."));

        let plain = anyhow::anyhow!("Sync failed: timed out");
        assert_eq!(recovery_hint(&plain), None);
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0f8fad5b-d9cb-469f-a165-70867728950e"), "0f8fad5b");
        assert_eq!(short_id("1700"), "1700");
    }
}
