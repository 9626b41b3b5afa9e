use std::path::Path;

use super::artifacts::write_text;
use super::svg::SvgDocument;
use super::ReportError;

/// Cell values are annotated only when both dimensions stay below this.
const ANNOTATE_LIMIT: usize = 25;
const CELL: f64 = 22.0;
const LABEL_SPACE: f64 = 150.0;
const TITLE_SPACE: f64 = 50.0;
const COLORBAR_SPACE: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMap {
    Gray,
    RdBu,
}

impl ColorMap {
    /// Color for `t` in `[0, 1]`.
    pub fn color(&self, t: f64) -> String {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let (r, g, b) = match self {
            Self::Gray => {
                let v = 255.0 * t;
                (v, v, v)
            }
            Self::RdBu => {
                // red (103,0,31) -> white -> blue (5,48,97)
                if t < 0.5 {
                    let u = t / 0.5;
                    (lerp(103.0, 247.0, u), lerp(0.0, 247.0, u), lerp(31.0, 247.0, u))
                } else {
                    let u = (t - 0.5) / 0.5;
                    (lerp(247.0, 5.0, u), lerp(247.0, 48.0, u), lerp(247.0, 97.0, u))
                }
            }
        };
        format!("#{:02x}{:02x}{:02x}", r.round() as u8, g.round() as u8, b.round() as u8)
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapGrid {
    pub row_labels: Vec<String>,
    pub col_labels: Vec<String>,
    pub cells: Vec<Vec<f64>>,
}

impl HeatmapGrid {
    pub fn row_sums(&self) -> Vec<f64> {
        self.cells.iter().map(|row| row.iter().sum()).collect()
    }

    fn max_value(&self) -> f64 {
        self.cells.iter().flatten().copied().fold(0.0, f64::max)
    }
}

pub fn render_heatmap(
    grid: &HeatmapGrid,
    title: &str,
    x_label: &str,
    y_label: &str,
    cmap: ColorMap,
) -> String {
    let rows = grid.row_labels.len();
    let cols = grid.col_labels.len();
    let plot_w = CELL * cols.max(1) as f64;
    let plot_h = CELL * rows.max(1) as f64;
    let left = LABEL_SPACE;
    let top = TITLE_SPACE + LABEL_SPACE;
    let width = left + plot_w + COLORBAR_SPACE;
    let height = top + plot_h + 40.0;
    let max = grid.max_value();
    let scale = if max > 0.0 { max } else { 1.0 };

    let mut doc = SvgDocument::new(width, height);
    doc.text(width / 2.0, 24.0, 13.0, "middle", "#000000", title);

    for (c, label) in grid.col_labels.iter().enumerate() {
        let x = left + CELL * c as f64 + CELL / 2.0 + 3.0;
        doc.vertical_text(x, top - 6.0, 9.0, "start", label);
    }
    for (r, label) in grid.row_labels.iter().enumerate() {
        let y = top + CELL * r as f64 + CELL / 2.0 + 3.0;
        doc.text(left - 6.0, y, 9.0, "end", "#000000", label);
    }

    let annotate = rows < ANNOTATE_LIMIT && cols < ANNOTATE_LIMIT;
    for (r, row) in grid.cells.iter().enumerate() {
        for (c, &value) in row.iter().enumerate() {
            let x = left + CELL * c as f64;
            let y = top + CELL * r as f64;
            doc.rect(x, y, CELL, CELL, &cmap.color(value / scale), 1.0);
            if annotate {
                doc.text(x + CELL / 2.0, y + CELL / 2.0 + 3.0, 8.0, "middle", "#ffffff", &format!("{}", value as i64));
            }
        }
    }
    doc.outline(left, top, plot_w, plot_h, "#000000");
    doc.text(left + plot_w / 2.0, top + plot_h + 24.0, 11.0, "middle", "#000000", x_label);
    doc.vertical_text(16.0, top + plot_h / 2.0, 11.0, "middle", y_label);

    let bar_x = left + plot_w + 20.0;
    let steps = 20;
    let step_h = plot_h / steps as f64;
    for i in 0..steps {
        let t = 1.0 - i as f64 / (steps - 1) as f64;
        doc.rect(bar_x, top + step_h * i as f64, 14.0, step_h, &cmap.color(t), 1.0);
    }
    doc.outline(bar_x, top, 14.0, plot_h, "#000000");
    doc.text(bar_x + 18.0, top + 8.0, 9.0, "start", "#000000", &format!("{max:.1}"));
    doc.text(bar_x + 18.0, top + plot_h, 9.0, "start", "#000000", "0");

    doc.render()
}

pub fn save_heatmap(
    path: &Path,
    grid: &HeatmapGrid,
    title: &str,
    x_label: &str,
    y_label: &str,
    cmap: ColorMap,
) -> Result<(), ReportError> {
    write_text(path, &render_heatmap(grid, title, x_label, y_label, cmap))
}
