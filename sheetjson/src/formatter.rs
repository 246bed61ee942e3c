//! Output formatters for conversion results

use anyhow::{Context, Result, bail};
use colored::*;
use serde_json::Value;
use sheetjson_core::Conversion;
use std::fs;
use std::path::{Path, PathBuf};

/// Print a summary of the conversion with colors
pub fn print_human(file_path: &Path, conversion: &Conversion) {
    println!("{}", format!("Converting: {}", file_path.display()).bold());
    println!();

    if conversion.collections().is_empty() && conversion.failures.is_empty() {
        println!("{}", "No sheets converted".yellow().bold());
        return;
    }

    println!("{}", "Collections:".bold().underline());
    for (name, records) in conversion.collections() {
        println!("  {} {} records", name.cyan().bold(), records.len());
    }
    println!();

    if !conversion.failures.is_empty() {
        println!("{}", "Sheet failures:".bold().underline());
        for failure in &conversion.failures {
            println!(
                "  {} [{}] {} {}",
                "ERROR".red().bold(),
                failure.num.to_string().bright_black(),
                failure.name.cyan(),
                failure.error
            );
        }
        println!();
    }

    for (name, links) in &conversion.link.errors {
        println!("{} {}", "Collection:".bold(), name.cyan().bold());
        for link in links {
            let reference = link
                .record
                .get("__ref")
                .map(Value::to_string)
                .unwrap_or_default();
            println!(
                "  {} [{}] {} {}",
                "WARN".yellow().bold(),
                link.sheet.bright_black(),
                link.reason,
                reference
            );
        }
        println!();
    }

    if conversion.is_clean() {
        println!("{}", "✓ All records linked!".green().bold());
    } else {
        println!("{}", "Summary:".bold().underline());
        if !conversion.failures.is_empty() {
            println!("  {} {}", "Failed sheets:".red().bold(), conversion.failures.len());
        }
        let unresolved = conversion.link.unresolved_count();
        if unresolved > 0 {
            println!("  {} {}", "Unresolved records:".yellow().bold(), unresolved);
        }
    }
}

fn render(value: &Value, pretty: bool) -> Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}

/// Print collections and unresolved records as one JSON document
pub fn print_json(conversion: &Conversion, pretty: bool) -> Result<()> {
    let mut output = serde_json::json!({
        "collections": conversion.collections(),
    });
    if !conversion.is_clean() {
        output["errors"] = serde_json::json!({
            "sheets": conversion.failures,
            "links": conversion.link.errors,
        });
    }

    println!("{}", render(&output, pretty)?);
    Ok(())
}

/// File for one collection inside `dir`
///
/// Collection names come from the workbook, so anything that is not a plain
/// file name is rejected.
fn collection_path(dir: &Path, name: &str) -> Result<PathBuf> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        bail!("Collection name {:?} is not a valid file name", name);
    }
    Ok(dir.join(format!("{}.json", name)))
}

/// Write each collection as an array of its records into `dir`
///
/// All names are checked before anything is written.
pub fn write_collections(dir: &Path, conversion: &Conversion, pretty: bool) -> Result<()> {
    let targets = conversion
        .collections()
        .iter()
        .map(|(name, records)| Ok((collection_path(dir, name)?, records)))
        .collect::<Result<Vec<_>>>()?;

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    for (path, records) in targets {
        let list = Value::Array(records.values().cloned().collect());
        fs::write(&path, render(&list, pretty)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), records = records.len(), "wrote collection");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetjson_core::{Cell, FormattedSheet, SheetOptions, format_sheet, link_collections};

    fn conversion(names: &[&str]) -> Conversion {
        let sheets = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let cells = vec![
                    Cell::new("A", 1, format!(r#"{{"name":{:?}}}"#, name)),
                    Cell::new("A", 2, "_id"),
                    Cell::new("A", 4, "x"),
                ];
                let output = format_sheet(&cells, SheetOptions::default()).unwrap();
                FormattedSheet::new(i + 1, format!("Sheet{}", i + 1), output)
            })
            .collect();
        Conversion {
            link: link_collections(sheets),
            failures: Vec::new(),
        }
    }

    #[test]
    fn test_collection_path() {
        let dir = Path::new("out");
        assert_eq!(collection_path(dir, "units").unwrap(), dir.join("units.json"));
        assert_eq!(collection_path(dir, "..units").unwrap(), dir.join("..units.json"));
        assert!(collection_path(dir, "../units").is_err());
        assert!(collection_path(dir, "a/b").is_err());
        assert!(collection_path(dir, "a\\b").is_err());
        assert!(collection_path(dir, "..").is_err());
        assert!(collection_path(dir, "").is_err());
    }

    #[test]
    fn test_write_collections() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        write_collections(&out, &conversion(&["units"]), false).unwrap();
        let written = fs::read_to_string(out.join("units.json")).unwrap();
        assert_eq!(written, r#"[{"_id":"x"}]"#);
    }

    #[test]
    fn test_unsafe_collection_name_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let err = write_collections(&out, &conversion(&["units", "../escape"]), false).unwrap_err();
        assert!(err.to_string().contains("../escape"));
        assert!(!out.exists());
        assert!(!dir.path().join("escape.json").exists());
    }
}
