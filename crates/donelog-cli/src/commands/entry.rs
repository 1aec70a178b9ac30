//! Entry command handlers

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};

use donelog_core::{LogEntry, Store};

use crate::editor::{confirm, edit_text};
use crate::output::{print_json, short_id, Output};

/// Add a new entry; opens the editor when no text is given
pub fn add(store: &mut Store, words: Vec<String>, output: &Output) -> Result<()> {
    let content = if words.is_empty() {
        edit_text("")?
    } else {
        words.join(" ")
    };

    if content.trim().is_empty() {
        bail!("Entry is empty, nothing added.");
    }

    let entry = store.add(content).context("Failed to add entry")?;
    output.success(&format!("Added entry: {}", short_id(&entry.id)));
    if output.is_json() || output.is_quiet() {
        output.print_entry(&entry)?;
    }
    Ok(())
}

/// List active entries, oldest first
pub fn list(store: &Store, output: &Output) -> Result<()> {
    output.print_entries(&store.active_sorted(), "No entries yet.")
}

/// Show a single entry (active or trashed)
pub fn show(store: &Store, id: String, output: &Output) -> Result<()> {
    let entry = store.find(&id)?;
    output.print_entry(entry)
}

/// Edit an entry's content and optionally its time
pub fn edit(
    store: &mut Store,
    id: String,
    content: Option<String>,
    at: Option<String>,
    output: &Output,
) -> Result<()> {
    let current = store.find(&id)?.clone();
    if current.is_deleted {
        bail!("Entry {} is in the trash. Restore it first.", short_id(&current.id));
    }

    let content = match content {
        Some(content) => content,
        None => edit_text(&current.content)?,
    };
    if content.trim().is_empty() {
        bail!("Entry content cannot be empty.");
    }

    let timestamp = at.as_deref().map(parse_time).transpose()?;
    let entry = store
        .edit(&current.id, content, timestamp)
        .context("Failed to edit entry")?;

    output.success(&format!("Updated entry: {}", short_id(&entry.id)));
    Ok(())
}

/// Move an entry to the trash
pub fn delete(store: &mut Store, id: String, output: &Output) -> Result<()> {
    let entry = store.delete(&id).context("Failed to delete entry")?;
    output.success(&format!(
        "Moved to trash: {} (undo with `donelog restore {}`)",
        short_id(&entry.id),
        short_id(&entry.id)
    ));
    Ok(())
}

/// Bring an entry back from the trash
pub fn restore(store: &mut Store, id: String, output: &Output) -> Result<()> {
    let entry = store.restore(&id).context("Failed to restore entry")?;
    output.success(&format!("Restored entry: {}", short_id(&entry.id)));
    Ok(())
}

/// List trashed entries, most recently deleted first
pub fn trash(store: &Store, output: &Output) -> Result<()> {
    output.print_entries(store.trash(), "Trash is empty.")
}

/// Drop every trashed entry locally
pub fn empty_trash(store: &mut Store, yes: bool, output: &Output) -> Result<()> {
    let count = store.trash().len();
    if count == 0 {
        output.message("Trash is already empty.");
        return Ok(());
    }

    if !yes {
        if !output.should_prompt() {
            bail!("Refusing to empty the trash without --yes.");
        }
        if !confirm(&format!("Permanently remove {} entries from this device?", count))? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let removed = store.empty_trash().context("Failed to empty trash")?;
    output.success(&format!("Removed {} entries from the trash", removed));
    Ok(())
}

/// Import entries from a JSON export
pub fn import(store: &mut Store, path: &Path, output: &Output) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {:?}", path))?;
    let entries: Vec<LogEntry> = serde_json::from_str(&content)
        .with_context(|| format!("Import file is not a list of entries: {:?}", path))?;

    let total = entries.len();
    let imported = store.import(entries).context("Failed to import entries")?;

    output.success(&format!(
        "Imported {} of {} entries ({} already present)",
        imported,
        total,
        total - imported
    ));
    Ok(())
}

/// Export active entries as JSON, to a file or stdout
pub fn export(store: &Store, path: Option<&Path>, output: &Output) -> Result<()> {
    let entries = store.active_sorted();
    match path {
        Some(path) => {
            let json =
                serde_json::to_string_pretty(&entries).context("Failed to serialize entries")?;
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write export file: {:?}", path))?;
            output.success(&format!("Exported {} entries to {}", entries.len(), path.display()));
        }
        None => print_json(&entries)?,
    }
    Ok(())
}

/// Parse a business time given on the command line
///
/// Accepts RFC 3339 or `YYYY-MM-DD HH:MM`, read as UTC.
fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M")
        .map(|naive| naive.and_utc())
        .with_context(|| {
            format!(
                "Invalid time '{}'. Use RFC 3339 or 'YYYY-MM-DD HH:MM'.",
                value
            )
        })
}
