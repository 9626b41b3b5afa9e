use std::path::Path;

use super::artifacts::write_text;
use super::svg::SvgDocument;
use super::ReportError;

const ROW_H: f64 = 22.0;
const COL_W: f64 = 130.0;
const CHAR_W: f64 = 6.5;
const PADDING: f64 = 20.0;

/// Renders a labelled table of preformatted cells.
pub fn render_table(row_labels: &[String], col_labels: &[String], cells: &[Vec<String>]) -> String {
    let label_w = row_labels
        .iter()
        .map(|l| l.chars().count() as f64 * CHAR_W + 12.0)
        .fold(80.0, f64::max);
    let width = PADDING * 2.0 + label_w + COL_W * col_labels.len() as f64;
    let height = PADDING * 2.0 + ROW_H * (row_labels.len() + 1) as f64;

    let mut doc = SvgDocument::new(width, height);
    let x0 = PADDING + label_w;
    let y0 = PADDING;

    for (c, label) in col_labels.iter().enumerate() {
        let x = x0 + COL_W * c as f64;
        doc.rect(x, y0, COL_W, ROW_H, "#eeeeee", 1.0);
        doc.outline(x, y0, COL_W, ROW_H, "#000000");
        doc.text(x + COL_W / 2.0, y0 + ROW_H - 7.0, 11.0, "middle", "#000000", label);
    }

    for (r, label) in row_labels.iter().enumerate() {
        let y = y0 + ROW_H * (r + 1) as f64;
        doc.outline(PADDING, y, label_w, ROW_H, "#000000");
        doc.text(x0 - 6.0, y + ROW_H - 7.0, 11.0, "end", "#000000", label);
        let row = cells.get(r).map(Vec::as_slice).unwrap_or(&[]);
        for c in 0..col_labels.len() {
            let x = x0 + COL_W * c as f64;
            doc.outline(x, y, COL_W, ROW_H, "#000000");
            if let Some(value) = row.get(c) {
                doc.text(x + COL_W / 2.0, y + ROW_H - 7.0, 11.0, "middle", "#000000", value);
            }
        }
    }

    doc.render()
}

pub fn save_table(
    path: &Path,
    row_labels: &[String],
    col_labels: &[String],
    cells: &[Vec<String>],
) -> Result<(), ReportError> {
    write_text(path, &render_table(row_labels, col_labels, cells))
}
