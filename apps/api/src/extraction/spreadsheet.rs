//! XLSX text extraction.
//!
//! Each worksheet is rendered as a `Sheet: <name>` line followed by one line
//! per non-empty row, cells separated by tabs. Cell positions come from the
//! `r` reference so sparse rows keep their column alignment. Phonetic runs
//! (`<rPh>`) are reading aids, not cell text, and are dropped.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use tracing::debug;
use xml::attribute::OwnedAttribute;
use xml::reader::XmlEvent;

use crate::extraction::ooxml::{
    numbered_entries, open_archive, read_entry, xml_blocks, xml_events, Archive,
};

/// Gaps wider than this are not padded with empty cells.
const MAX_PADDED_COLUMNS: usize = 256;

/// Excel's last column is XFD.
const MAX_COLUMN_LETTERS: usize = 3;

const PHONETIC_TAG: &str = "rPh";

/// Extracts every worksheet of an XLSX workbook.
pub fn extract_xlsx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;

    let shared = match read_entry(&mut archive, "xl/sharedStrings.xml") {
        Ok(xml) => xml_blocks(&xml, "t", "si", Some(PHONETIC_TAG))
            .context("unreadable shared strings")?,
        Err(_) => Vec::new(),
    };

    let sheets = worksheet_parts(&mut archive);
    if sheets.is_empty() {
        bail!("no worksheets found in workbook");
    }

    let mut lines = Vec::new();
    for (name, path) in sheets {
        let xml = read_entry(&mut archive, &path)?;
        lines.push(format!("Sheet: {name}"));
        lines.extend(sheet_rows(&xml, &shared).with_context(|| format!("sheet '{name}'"))?);
    }

    Ok(lines.join("\n"))
}

/// (sheet name, archive path) in workbook order.
/// Falls back to `xl/worksheets/sheetN.xml` when the workbook parts are unreadable.
fn worksheet_parts(archive: &mut Archive<'_>) -> Vec<(String, String)> {
    let workbook = read_entry(archive, "xl/workbook.xml");
    let rels = read_entry(archive, "xl/_rels/workbook.xml.rels");

    if let (Ok(workbook), Ok(rels)) = (workbook, rels) {
        match workbook_sheets(&workbook, &rels) {
            Ok(parts) if !parts.is_empty() => return parts,
            Ok(_) => debug!("Workbook lists no resolvable sheets, using numbered parts"),
            Err(e) => debug!("Workbook parts unreadable, using numbered parts: {e:#}"),
        }
    }

    numbered_entries(archive, "xl/worksheets/sheet", ".xml")
        .into_iter()
        .enumerate()
        .map(|(i, path)| (format!("Sheet{}", i + 1), path))
        .collect()
}

fn workbook_sheets(workbook: &str, rels: &str) -> Result<Vec<(String, String)>> {
    let mut targets: HashMap<String, String> = HashMap::new();
    for event in xml_events(rels) {
        if let XmlEvent::StartElement {
            name, attributes, ..
        } = event?
        {
            if name.local_name != "Relationship" {
                continue;
            }
            if let (Some(id), Some(target)) =
                (attribute(&attributes, "Id"), attribute(&attributes, "Target"))
            {
                targets.insert(id.to_string(), target.to_string());
            }
        }
    }

    let mut parts = Vec::new();
    for event in xml_events(workbook) {
        if let XmlEvent::StartElement {
            name, attributes, ..
        } = event?
        {
            if name.local_name != "sheet" {
                continue;
            }
            let Some(sheet_name) = attribute(&attributes, "name") else {
                continue;
            };
            let Some(target) = relationship_id(&attributes).and_then(|id| targets.get(id)) else {
                continue;
            };
            parts.push((sheet_name.to_string(), resolve_target(target)));
        }
    }

    Ok(parts)
}

fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{target}"),
    }
}

/// Unprefixed attribute by local name.
fn attribute<'a>(attributes: &'a [OwnedAttribute], local: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|a| a.name.prefix.is_none() && a.name.local_name == local)
        .map(|a| a.value.as_str())
}

/// The `r:id` attribute linking a sheet to its part.
fn relationship_id(attributes: &[OwnedAttribute]) -> Option<&str> {
    attributes
        .iter()
        .find(|a| a.name.prefix.is_some() && a.name.local_name == "id")
        .map(|a| a.value.as_str())
}

#[derive(Debug, Default)]
struct Cell {
    column: Option<usize>,
    cell_type: Option<String>,
    value: String,
    inline: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Nothing,
    Value,
    InlineText,
}

fn sheet_rows(xml: &str, shared: &[String]) -> Result<Vec<String>> {
    let mut rows = Vec::new();
    let mut cells: Vec<String> = Vec::new();
    let mut cell: Option<Cell> = None;
    let mut capture = Capture::Nothing;
    let mut phonetic_depth = 0usize;

    for event in xml_events(xml) {
        match event? {
            XmlEvent::StartElement {
                name, attributes, ..
            } => match name.local_name.as_str() {
                "row" => cells.clear(),
                "c" => {
                    cell = Some(Cell {
                        column: attribute(&attributes, "r").and_then(column_index),
                        cell_type: attribute(&attributes, "t").map(str::to_string),
                        ..Cell::default()
                    })
                }
                PHONETIC_TAG => phonetic_depth += 1,
                "v" if cell.is_some() => capture = Capture::Value,
                "t" if cell.is_some() && phonetic_depth == 0 => capture = Capture::InlineText,
                _ => {}
            },
            XmlEvent::EndElement { name } => match name.local_name.as_str() {
                "v" | "t" => capture = Capture::Nothing,
                PHONETIC_TAG => phonetic_depth = phonetic_depth.saturating_sub(1),
                "c" => {
                    if let Some(done) = cell.take() {
                        place_cell(&mut cells, done, shared);
                    }
                }
                "row" => {
                    let line = cells.join("\t").trim_end().to_string();
                    if !line.is_empty() {
                        rows.push(line);
                    }
                    cells.clear();
                }
                _ => {}
            },
            XmlEvent::Characters(text) | XmlEvent::CData(text) | XmlEvent::Whitespace(text) => {
                match (cell.as_mut(), capture) {
                    (Some(c), Capture::Value) => c.value.push_str(&text),
                    (Some(c), Capture::InlineText) => c.inline.push_str(&text),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    Ok(rows)
}

fn place_cell(cells: &mut Vec<String>, cell: Cell, shared: &[String]) {
    if let Some(col) = cell.column {
        if col > cells.len() && col - cells.len() <= MAX_PADDED_COLUMNS {
            cells.resize(col, String::new());
        }
    }
    cells.push(cell_value(
        cell.cell_type.as_deref(),
        &cell.value,
        &cell.inline,
        shared,
    ));
}

fn cell_value(cell_type: Option<&str>, value: &str, inline: &str, shared: &[String]) -> String {
    match cell_type {
        Some("s") => value
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|idx| shared.get(idx).cloned())
            .unwrap_or_default(),
        Some("inlineStr") => inline.trim().to_string(),
        Some("b") => match value.trim() {
            "1" => "TRUE".to_string(),
            _ => "FALSE".to_string(),
        },
        _ => value.to_string(),
    }
}

/// Zero-based column index of an A1-style reference ("C7" → 2).
/// References with more than three column letters are not positions.
fn column_index(reference: &str) -> Option<usize> {
    let mut index = 0usize;
    for (i, b) in reference
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .enumerate()
    {
        if i == MAX_COLUMN_LETTERS {
            return None;
        }
        index = index * 26 + usize::from(b.to_ascii_uppercase() - b'A' + 1);
    }
    index.checked_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ooxml::test_support::zip_of;

    const WORKBOOK: &str = r#"<workbook xmlns:r="r"><sheets>
<sheet name="P&amp;L" sheetId="1" r:id="rId1"/>
<sheet name="Cash" sheetId="2" r:id="rId2"/>
</sheets></workbook>"#;

    const RELS: &str = r#"<Relationships>
<Relationship Id="rId2" Type="worksheet" Target="worksheets/sheet2.xml"/>
<Relationship Id="rId1" Type="worksheet" Target="/xl/worksheets/sheet1.xml"/>
<Relationship Id="rId3" Type="sharedStrings" Target="sharedStrings.xml"/>
</Relationships>"#;

    const SHARED: &str = r#"<sst><si><t>Line item</t></si><si><t>Revenue</t></si><si><r><t>Operating </t></r><r><t>costs</t></r></si></sst>"#;

    const SHEET1: &str = r#"<worksheet><cols><col min="1" max="2"/></cols><sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="inlineStr"><is><t>FY2024</t></is></c></row>
<row r="2"><c r="A2" t="s"><v>1</v></c><c r="B2"><v>1250000</v></c></row>
<row r="3"/>
<row r="4"><c r="A4" t="s"><v>2</v></c><c r="C4"><v>-830000</v></c><c r="D4" t="b"><v>1</v></c></row>
</sheetData></worksheet>"#;

    const SHEET2: &str = r#"<worksheet><sheetData><row r="1"><c r="B1" t="str"><f>SUM(A1)</f><v>42</v></c></row></sheetData></worksheet>"#;

    #[test]
    fn test_extract_xlsx_resolves_names_strings_and_gaps() {
        let bytes = zip_of(&[
            ("xl/workbook.xml", WORKBOOK),
            ("xl/_rels/workbook.xml.rels", RELS),
            ("xl/sharedStrings.xml", SHARED),
            ("xl/worksheets/sheet1.xml", SHEET1),
            ("xl/worksheets/sheet2.xml", SHEET2),
        ]);

        let text = extract_xlsx(&bytes).unwrap();
        assert_eq!(
            text,
            "Sheet: P&L\n\
             Line item\tFY2024\n\
             Revenue\t1250000\n\
             Operating costs\t\t-830000\tTRUE\n\
             Sheet: Cash\n\
             \t42"
        );
    }

    #[test]
    fn test_extract_xlsx_falls_back_to_numbered_sheets() {
        let bytes = zip_of(&[
            ("xl/worksheets/sheet2.xml", SHEET2),
            ("xl/worksheets/sheet1.xml", SHEET2),
        ]);
        let text = extract_xlsx(&bytes).unwrap();
        assert_eq!(text, "Sheet: Sheet1\n\t42\nSheet: Sheet2\n\t42");
    }

    #[test]
    fn test_extract_xlsx_without_sheets_fails() {
        let bytes = zip_of(&[("docProps/app.xml", "<Properties/>")]);
        assert!(extract_xlsx(&bytes).is_err());
    }

    #[test]
    fn test_phonetic_readings_are_not_cell_text() {
        let shared = r#"<sst><si><t>東京</t><rPh sb="0" eb="2"><t>トウキョウ</t></rPh><phoneticPr fontId="1"/></si></sst>"#;
        let sheet = r#"<worksheet><sheetData><row r="1">
<c r="A1" t="s"><v>0</v></c>
<c r="B1" t="inlineStr"><is><t>大阪</t><rPh sb="0" eb="2"><t>オオサカ</t></rPh></is></c>
</row></sheetData></worksheet>"#;
        let bytes = zip_of(&[
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);

        assert_eq!(extract_xlsx(&bytes).unwrap(), "Sheet: Sheet1\n東京\t大阪");
    }

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("c7"), Some(2));
        assert_eq!(column_index("AA10"), Some(26));
        assert_eq!(column_index("XFD1048576"), Some(16383));
        assert_eq!(column_index("12"), None);
    }

    #[test]
    fn test_overlong_cell_reference_is_not_a_position() {
        let reference = format!("{}1", "Z".repeat(40));
        assert_eq!(column_index(&reference), None);

        let sheet = format!(
            r#"<worksheet><sheetData><row r="1"><c r="{reference}"><v>7</v></c><c r="C1"><v>9</v></c></row></sheetData></worksheet>"#
        );
        assert_eq!(sheet_rows(&sheet, &[]).unwrap(), vec!["7\t\t9"]);
    }

    #[test]
    fn test_shared_string_out_of_range_is_blank() {
        assert_eq!(cell_value(Some("s"), "99", "", &[]), "");
    }
}
