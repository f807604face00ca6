//! Office Open XML (DOCX / PPTX) text extraction.
//!
//! Word documents go through the docx-rs reader: every body paragraph and
//! every table cell paragraph becomes one output line. Presentations are
//! read slide by slide with an XML event reader, one line per `<a:p>`.

use std::io::{Cursor, Read};

use anyhow::{anyhow, Context, Result};
use docx_rs::{
    read_docx, DocumentChild, Paragraph, ParagraphChild, RunChild, Table, TableCellContent,
    TableChild, TableRowChild,
};
use xml::reader::{EventReader, XmlEvent};
use zip::ZipArchive;

pub(crate) type Archive<'a> = ZipArchive<Cursor<&'a [u8]>>;

/// Extracts paragraph and table text from a Word document body.
pub fn extract_docx(bytes: &[u8]) -> Result<String> {
    let docx = read_docx(bytes).map_err(|e| anyhow!("failed to read Word document: {e}"))?;

    let mut lines = Vec::new();
    for child in &docx.document.children {
        match child {
            DocumentChild::Paragraph(p) => lines.push(paragraph_text(p)),
            DocumentChild::Table(t) => table_lines(t, &mut lines),
            _ => {}
        }
    }

    Ok(join_non_empty(lines))
}

fn paragraph_text(paragraph: &Paragraph) -> String {
    let mut text = String::new();
    for child in &paragraph.children {
        if let ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                match run_child {
                    RunChild::Text(t) => text.push_str(&t.text),
                    RunChild::Tab(_) => text.push('\t'),
                    RunChild::Break(_) => text.push('\n'),
                    _ => {}
                }
            }
        }
    }
    text
}

fn table_lines(table: &Table, lines: &mut Vec<String>) {
    for row in &table.rows {
        let TableChild::TableRow(row) = row;
        for cell in &row.cells {
            let TableRowChild::TableCell(cell) = cell;
            for content in &cell.children {
                match content {
                    TableCellContent::Paragraph(p) => lines.push(paragraph_text(p)),
                    TableCellContent::Table(nested) => table_lines(nested, lines),
                    _ => {}
                }
            }
        }
    }
}

/// Extracts text from every slide, in slide order.
pub fn extract_pptx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let slides = numbered_entries(&archive, "ppt/slides/slide", ".xml");

    let mut parts = Vec::with_capacity(slides.len());
    for slide in slides {
        let xml = read_entry(&mut archive, &slide)?;
        let text = xml_text(&xml, "t", "p").with_context(|| format!("slide '{slide}'"))?;
        if !text.is_empty() {
            parts.push(text);
        }
    }

    Ok(parts.join("\n"))
}

pub(crate) fn open_archive(bytes: &[u8]) -> Result<Archive<'_>> {
    ZipArchive::new(Cursor::new(bytes)).context("not a valid OOXML (zip) archive")
}

pub(crate) fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<String> {
    let mut entry = archive
        .by_name(name)
        .with_context(|| format!("archive entry '{name}' not found"))?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .with_context(|| format!("archive entry '{name}' is not valid UTF-8 XML"))?;
    Ok(xml)
}

/// Entries named `<prefix><N><suffix>`, sorted by N.
pub(crate) fn numbered_entries(archive: &Archive<'_>, prefix: &str, suffix: &str) -> Vec<String> {
    let mut numbered: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name.strip_prefix(prefix)?.strip_suffix(suffix)?;
            let n = number.parse::<u32>().ok()?;
            Some((n, name.to_string()))
        })
        .collect();
    numbered.sort_by_key(|(n, _)| *n);
    numbered.into_iter().map(|(_, name)| name).collect()
}

/// XML events with parser errors lifted into `anyhow`.
pub(crate) fn xml_events(xml: &str) -> impl Iterator<Item = Result<XmlEvent>> + '_ {
    EventReader::from_str(xml)
        .into_iter()
        .map(|event| event.map_err(|e| anyhow!("malformed XML: {e}")))
}

/// Non-empty paragraphs joined by newlines.
pub(crate) fn xml_text(xml: &str, text_tag: &str, block_tag: &str) -> Result<String> {
    Ok(join_non_empty(xml_blocks(xml, text_tag, block_tag, None)?))
}

/// Collects the text inside `text_tag` elements, one string per `block_tag`.
/// Elements are matched on their local name. Anything under `skip_tag` is
/// ignored. Empty blocks are kept so positional lookups (e.g. shared strings)
/// stay aligned.
pub(crate) fn xml_blocks(
    xml: &str,
    text_tag: &str,
    block_tag: &str,
    skip_tag: Option<&str>,
) -> Result<Vec<String>> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut skip_depth = 0usize;

    for event in xml_events(xml) {
        match event? {
            XmlEvent::StartElement { name, .. } => {
                let local = name.local_name.as_str();
                if skip_tag == Some(local) {
                    skip_depth += 1;
                } else if skip_depth > 0 {
                    continue;
                } else if local == text_tag {
                    in_text = true;
                } else if local == "br" {
                    current.push('\n');
                }
            }
            XmlEvent::EndElement { name } => {
                let local = name.local_name.as_str();
                if skip_tag == Some(local) {
                    skip_depth = skip_depth.saturating_sub(1);
                } else if local == text_tag {
                    in_text = false;
                } else if local == block_tag && skip_depth == 0 {
                    blocks.push(current.trim().to_string());
                    current.clear();
                }
            }
            XmlEvent::Characters(text) | XmlEvent::CData(text) | XmlEvent::Whitespace(text) => {
                if in_text && skip_depth == 0 {
                    current.push_str(&text);
                }
            }
            _ => {}
        }
    }

    if !current.trim().is_empty() {
        blocks.push(current.trim().to_string());
    }

    Ok(blocks)
}

fn join_non_empty(lines: Vec<String>) -> String {
    lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
