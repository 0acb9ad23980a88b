//! DOCX text extraction via `docx-rs`.
//!
//! Walks the parsed document's paragraph and table children in document
//! order, concatenating run text and inserting a newline between
//! paragraphs. Table rows are rendered as `cell | cell` lines, one per row,
//! with each cell's paragraphs flattened to a single space-joined string.

use std::path::Path;

use docx_rs::{
    DocumentChild, ParagraphChild, RunChild, Table, TableCellContent, TableChild, TableRowChild,
};

use crate::error::LoaderError;

pub fn extract_text(path: &Path) -> Result<String, LoaderError> {
    let bytes = std::fs::read(path).map_err(|source| LoaderError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let docx = docx_rs::read_docx(&bytes).map_err(|e| LoaderError::DecodeFailure {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut out = String::new();
    for child in &docx.document.children {
        match child {
            DocumentChild::Paragraph(paragraph) => {
                out.push_str(&paragraph_text(paragraph));
                out.push('\n');
            }
            DocumentChild::Table(table) => {
                out.push_str(&table_text(table));
            }
            _ => {}
        }
    }

    Ok(out)
}

fn paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for run_child in &paragraph.children {
        if let ParagraphChild::Run(run) = run_child {
            for text_child in &run.children {
                if let RunChild::Text(t) = text_child {
                    text.push_str(&t.text);
                }
            }
        }
    }
    text
}

/// Renders every row of a table as a `cell | cell` line, one row per line.
fn table_text(table: &Table) -> String {
    let mut out = String::new();
    for row_child in &table.rows {
        let TableChild::TableRow(row) = row_child;
        let mut cells = Vec::new();
        for cell_child in &row.cells {
            let TableRowChild::TableCell(cell) = cell_child;
            let mut cell_text = Vec::new();
            for content in &cell.children {
                match content {
                    TableCellContent::Paragraph(p) => {
                        let text = paragraph_text(p);
                        if !text.is_empty() {
                            cell_text.push(text);
                        }
                    }
                    TableCellContent::Table(nested) => {
                        cell_text.push(table_text(nested).trim().to_string());
                    }
                    _ => {}
                }
            }
            cells.push(cell_text.join(" "));
        }
        out.push_str(&cells.join(" | "));
        out.push('\n');
    }
    out
}
