//! XML parsing for the cell stream of XLSX files

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::io::BufReader;
use zip::ZipArchive;

use super::workbook::column_letters;
use super::{Cell, SheetCells, WorkbookReader};

/// A sheet declared in xl/workbook.xml
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    /// Path of the worksheet part inside the archive
    pub path: String,
}

/// Read sheet names and their relationship ids from xl/workbook.xml, in workbook order
fn read_sheet_declarations(
    archive: &mut ZipArchive<impl std::io::Read + std::io::Seek>,
) -> Result<Vec<(String, String)>> {
    let workbook_xml = archive
        .by_name("xl/workbook.xml")
        .context("xl/workbook.xml not exists (maybe not xlsx file)")?;
    let mut reader = Reader::from_reader(BufReader::new(workbook_xml));
    reader.config_mut().trim_text(true);

    let mut declarations = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => {
                if e.local_name().as_ref() == b"sheet" {
                    let mut name = String::new();
                    let mut r_id = String::new();
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"name" => name = attr.unescape_value()?.to_string(),
                            key if attr.key.local_name().as_ref() == b"id" && key != b"id" => {
                                r_id = attr.unescape_value()?.to_string()
                            }
                            _ => {}
                        }
                    }
                    declarations.push((name, r_id));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(declarations)
}

/// Map relationship ids to targets from xl/_rels/workbook.xml.rels
fn read_workbook_relationships(
    archive: &mut ZipArchive<impl std::io::Read + std::io::Seek>,
) -> Result<HashMap<String, String>> {
    let mut rels = HashMap::new();
    let rels_xml = match archive.by_name("xl/_rels/workbook.xml.rels") {
        Ok(file) => file,
        Err(_) => return Ok(rels),
    };
    let mut reader = Reader::from_reader(BufReader::new(rels_xml));
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => {
                if e.local_name().as_ref() == b"Relationship" {
                    let mut id = String::new();
                    let mut target = String::new();
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"Id" => id = attr.unescape_value()?.to_string(),
                            b"Target" => target = attr.unescape_value()?.to_string(),
                            _ => {}
                        }
                    }
                    rels.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

/// Resolve every declared sheet to its worksheet part
pub fn list_sheets(
    archive: &mut ZipArchive<impl std::io::Read + std::io::Seek>,
) -> Result<Vec<SheetEntry>> {
    let declarations = read_sheet_declarations(archive)?;
    let rels = read_workbook_relationships(archive)?;

    Ok(declarations
        .into_iter()
        .enumerate()
        .map(|(i, (name, r_id))| {
            let path = match rels.get(&r_id) {
                Some(target) => normalize_part_path(target),
                // Fall back to the conventional part name
                None => format!("xl/worksheets/sheet{}.xml", i + 1),
            };
            SheetEntry { name, path }
        })
        .collect())
}

/// Targets are relative to `xl/` unless absolute
fn normalize_part_path(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        absolute.to_string()
    } else if target.starts_with("xl/") {
        target.to_string()
    } else {
        format!("xl/{}", target)
    }
}

/// Load the shared string table, skipping phonetic (`rPh`) runs
pub fn extract_shared_strings(
    archive: &mut ZipArchive<impl std::io::Read + std::io::Seek>,
) -> Result<Vec<String>> {
    let mut strings = Vec::new();
    let ss_xml = match archive.by_name("xl/sharedStrings.xml") {
        Ok(file) => file,
        Err(_) => {
            tracing::debug!("no xl/sharedStrings.xml, using an empty table");
            return Ok(strings);
        }
    };

    let mut reader = Reader::from_reader(BufReader::new(ss_xml));
    let mut buf = Vec::new();
    let mut current_string = String::new();
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current_string.clear(),
                b"rPh" => phonetic_depth += 1,
                b"t" => {
                    let text = read_text_node(&mut reader)?;
                    if phonetic_depth == 0 {
                        current_string.push_str(&text);
                    }
                }
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current_string)),
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn read_text_node<R: std::io::BufRead>(reader: &mut Reader<R>) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(e.unescape()?.as_ref()),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::End(_) => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

/// Raw contents of one `<c>` element
#[derive(Default)]
struct CellContents {
    value: Option<String>,
    inline: Option<String>,
}

fn read_cell_contents<R: std::io::BufRead>(reader: &mut Reader<R>) -> Result<CellContents> {
    let mut contents = CellContents::default();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"v" => contents.value = Some(read_text_node(reader)?),
                b"t" => {
                    let text = read_text_node(reader)?;
                    contents.inline.get_or_insert_with(String::new).push_str(&text);
                }
                // Phonetic runs inside inline strings carry no cell text
                b"rPh" => {
                    reader.read_to_end_into(e.name(), &mut Vec::new())?;
                }
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"c" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(contents)
}

/// Stream the non-empty cells of one worksheet part in document order
pub fn parse_sheet_cells(
    archive: &mut ZipArchive<impl std::io::Read + std::io::Seek>,
    path: &str,
    shared_strings: &[String],
) -> Result<Vec<Cell>> {
    let sheet_xml = archive
        .by_name(path)
        .with_context(|| format!("Failed to find worksheet part {}", path))?;
    let mut reader = Reader::from_reader(BufReader::new(sheet_xml));

    let mut cells = Vec::new();
    let mut buf = Vec::new();
    let mut current_row = 0u32;
    let mut current_col = 0u32;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                let mut row = None;
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"r" {
                        row = Some(attr.unescape_value()?.parse::<u32>()?);
                    }
                }
                current_row = row.unwrap_or(current_row + 1);
                current_col = 0;
            }
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                let mut r_attr = String::new();
                let mut t_attr = String::new();
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"r" => r_attr = attr.unescape_value()?.to_string(),
                        b"t" => t_attr = attr.unescape_value()?.to_string(),
                        _ => {}
                    }
                }

                let contents = read_cell_contents(&mut reader)?;
                let value = match t_attr.as_str() {
                    "s" => contents
                        .value
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .and_then(|idx| shared_strings.get(idx).cloned())
                        .unwrap_or_default(),
                    "inlineStr" => contents.inline.unwrap_or_default(),
                    _ => contents.value.unwrap_or_default(),
                };

                let cell = Cell::from_ref(&r_attr, value.clone()).unwrap_or_else(|| {
                    Cell::new(column_letters(current_col + 1), current_row, value)
                });
                current_col = cell.column_index();
                current_row = cell.row;

                if !cell.value.is_empty() {
                    cells.push(cell);
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                // Styled but empty cell; only moves the cursor
                let mut position = None;
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"r" {
                        position = Cell::from_ref(&attr.unescape_value()?, String::new());
                    }
                }
                match position {
                    Some(cell) => {
                        current_col = cell.column_index();
                        current_row = cell.row;
                    }
                    None => current_col += 1,
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(cells)
}

pub struct XlsxReader<'a, R: std::io::Read + std::io::Seek> {
    archive: &'a mut ZipArchive<R>,
    shared_strings: Vec<String>,
    sheets: Vec<SheetEntry>,
}

impl<'a, R: std::io::Read + std::io::Seek> XlsxReader<'a, R> {
    pub fn new(archive: &'a mut ZipArchive<R>) -> Result<Self> {
        let sheets = list_sheets(archive)?;
        let shared_strings = extract_shared_strings(archive)?;
        Ok(Self {
            archive,
            shared_strings,
            sheets,
        })
    }

    /// Read one sheet by its 1-based workbook position
    pub fn read_sheet(&mut self, num: usize) -> Result<SheetCells> {
        let entry = num
            .checked_sub(1)
            .and_then(|i| self.sheets.get(i))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("sheet {} not exists", num))?;

        let cells = parse_sheet_cells(self.archive, &entry.path, &self.shared_strings)
            .with_context(|| format!("Failed to read sheet {} ({})", num, entry.name))?;
        tracing::debug!(sheet = %entry.name, num, cells = cells.len(), "read sheet");

        Ok(SheetCells {
            num,
            name: entry.name,
            cells,
        })
    }
}

impl<'a, R: std::io::Read + std::io::Seek> WorkbookReader for XlsxReader<'a, R> {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    fn read_sheets(&mut self, selection: &[usize]) -> Result<Vec<SheetCells>> {
        let nums: Vec<usize> = if selection.is_empty() {
            (1..=self.sheets.len()).collect()
        } else {
            selection.to_vec()
        };
        nums.into_iter().map(|num| self.read_sheet(num)).collect()
    }
}
