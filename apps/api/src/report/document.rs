//! DOCX assembly for the generated report.
//!
//! Layout: one `Title` paragraph, then for every section a `Heading1`
//! paragraph followed by its body, one paragraph per non-blank line.

use std::io::Cursor;

use anyhow::{Context, Result};
use docx_rs::{Docx, Paragraph, Run, Style, StyleType};

pub const REPORT_TITLE: &str = "Financial Optimization Report";

const TITLE_STYLE: &str = "Title";
const HEADING_STYLE: &str = "Heading1";

// Half-points.
const TITLE_SIZE: usize = 40;
const HEADING_SIZE: usize = 28;

struct SectionBlock {
    heading: String,
    body: String,
}

/// In-memory report, rendered to bytes once every section is in.
pub struct ReportDocument {
    title: String,
    sections: Vec<SectionBlock>,
}

impl ReportDocument {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            sections: Vec::new(),
        }
    }

    pub fn push_section(&mut self, heading: &str, body: &str) {
        self.sections.push(SectionBlock {
            heading: heading.to_string(),
            body: body.to_string(),
        });
    }

    pub fn to_docx_bytes(&self) -> Result<Vec<u8>> {
        let mut docx = Docx::new()
            .add_style(
                Style::new(TITLE_STYLE, StyleType::Paragraph)
                    .name("Title")
                    .size(TITLE_SIZE)
                    .bold(),
            )
            .add_style(
                Style::new(HEADING_STYLE, StyleType::Paragraph)
                    .name("Heading 1")
                    .size(HEADING_SIZE)
                    .bold(),
            )
            .add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_text(&self.title))
                    .style(TITLE_STYLE),
            );

        for section in &self.sections {
            docx = docx.add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_text(&section.heading))
                    .style(HEADING_STYLE),
            );
            for line in body_lines(&section.body) {
                let run = if line.emphasized {
                    Run::new().add_text(&line.text).bold()
                } else {
                    Run::new().add_text(&line.text)
                };
                docx = docx.add_paragraph(Paragraph::new().add_run(run));
            }
        }

        let mut buf = Vec::new();
        docx.build()
            .pack(Cursor::new(&mut buf))
            .context("failed to pack report document")?;
        Ok(buf)
    }
}

#[derive(Debug, PartialEq)]
struct BodyLine {
    text: String,
    emphasized: bool,
}

/// Splits model output into paragraphs, dropping the markdown the model tends
/// to emit: `#` headings become bold lines, list markers become bullets, and
/// `**` emphasis markers are removed.
fn body_lines(body: &str) -> Vec<BodyLine> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let heading = line.trim_start_matches('#');
            let emphasized = heading.len() != line.len() && heading.starts_with(' ');
            let line = if emphasized { heading.trim_start() } else { line };

            let line = match line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
                Some(item) => format!("• {item}"),
                None => line.to_string(),
            };

            BodyLine {
                text: line.replace("**", ""),
                emphasized,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ooxml::extract_docx;
    use crate::extraction::ooxml::{open_archive, read_entry};

    fn document_xml(bytes: &[u8]) -> String {
        let mut archive = open_archive(bytes).unwrap();
        read_entry(&mut archive, "word/document.xml").unwrap()
    }

    #[test]
    fn test_headings_are_styled_in_order() {
        let mut doc = ReportDocument::new(REPORT_TITLE);
        for i in 0..7 {
            doc.push_section(&format!("Heading number {i}"), "Body text.");
        }
        let bytes = doc.to_docx_bytes().unwrap();
        let xml = document_xml(&bytes);

        assert_eq!(xml.matches(r#"w:val="Heading1""#).count(), 7);
        assert_eq!(xml.matches(r#"w:val="Title""#).count(), 1);

        let mut cursor = 0;
        for i in 0..7 {
            let needle = format!("Heading number {i}");
            let pos = xml[cursor..].find(&needle).expect("heading out of order");
            cursor += pos + needle.len();
        }
    }

    #[test]
    fn test_text_survives_a_read_back() {
        let mut doc = ReportDocument::new(REPORT_TITLE);
        doc.push_section("0. Executive Summary", "Cash & equivalents < 3 months of <opex>.");
        let text = extract_docx(&doc.to_docx_bytes().unwrap()).unwrap();

        assert_eq!(
            text,
            "Financial Optimization Report\n0. Executive Summary\nCash & equivalents < 3 months of <opex>."
        );
    }

    #[test]
    fn test_empty_report_still_has_title() {
        let doc = ReportDocument::new(REPORT_TITLE);
        let text = extract_docx(&doc.to_docx_bytes().unwrap()).unwrap();
        assert_eq!(text, REPORT_TITLE);
    }

    #[test]
    fn test_body_lines_strip_markdown() {
        let lines = body_lines("## Key risks\n\n- **Liquidity** is thin\n* Debt rolls in Q3\n#hashtag stays");
        let texts: Vec<_> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(
            texts,
            ["Key risks", "• Liquidity is thin", "• Debt rolls in Q3", "#hashtag stays"]
        );
        assert!(lines[0].emphasized);
        assert!(!lines[1].emphasized);
        assert!(!lines[3].emphasized);
    }
}
