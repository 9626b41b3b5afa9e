use std::path::Path;

use super::artifacts::write_text;
use super::svg::SvgDocument;
use super::ReportError;

pub const DEFAULT_BINS: usize = 10;

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 480.0;
const MARGIN_LEFT: f64 = 60.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_BOTTOM: f64 = 50.0;

pub struct HistogramSeries<'a> {
    pub label: &'a str,
    pub color: &'a str,
    pub opacity: f64,
    pub values: &'a [f64],
}

/// Counts of `values` in `bins` equal-width bins over `[lo, hi]`; the last
/// bin is closed on the right. Values outside the range are ignored.
pub fn bin_counts(values: &[f64], bins: usize, lo: f64, hi: f64) -> Vec<usize> {
    let mut counts = vec![0; bins];
    if bins == 0 {
        return counts;
    }
    let width = (hi - lo) / bins as f64;
    for &v in values {
        if !v.is_finite() || v < lo || v > hi {
            continue;
        }
        let idx = if width <= 0.0 {
            0
        } else {
            (((v - lo) / width) as usize).min(bins - 1)
        };
        counts[idx] += 1;
    }
    counts
}

/// Shared value range of all series, widened when degenerate.
fn value_range(series: &[HistogramSeries<'_>]) -> (f64, f64) {
    let mut values = series.iter().flat_map(|s| s.values.iter().copied()).filter(|v| v.is_finite());
    let Some(first) = values.next() else {
        return (0.0, 1.0);
    };
    let (lo, hi) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if hi > lo {
        (lo, hi)
    } else {
        (lo - 0.5, hi + 0.5)
    }
}

pub fn render_histogram(title: &str, series: &[HistogramSeries<'_>], bins: usize) -> String {
    let bins = bins.max(1);
    let (lo, hi) = value_range(series);
    let all_counts: Vec<Vec<usize>> = series.iter().map(|s| bin_counts(s.values, bins, lo, hi)).collect();
    let max_count = all_counts.iter().flatten().copied().max().unwrap_or(0).max(1);

    let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let bar_w = plot_w / bins as f64;

    let mut doc = SvgDocument::new(WIDTH, HEIGHT);
    for (i, line) in title.lines().enumerate() {
        doc.text(WIDTH / 2.0, 22.0 + 16.0 * i as f64, 13.0, "middle", "#000000", line);
    }

    for (s, counts) in series.iter().zip(&all_counts) {
        for (b, &count) in counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let h = plot_h * count as f64 / max_count as f64;
            let x = MARGIN_LEFT + bar_w * b as f64;
            doc.rect(x, MARGIN_TOP + plot_h - h, bar_w, h, s.color, s.opacity);
        }
    }

    doc.outline(MARGIN_LEFT, MARGIN_TOP, plot_w, plot_h, "#000000");
    for tick in 0..=4 {
        let frac = tick as f64 / 4.0;
        let x = MARGIN_LEFT + plot_w * frac;
        doc.line(x, MARGIN_TOP + plot_h, x, MARGIN_TOP + plot_h + 5.0, "#000000");
        doc.text(x, MARGIN_TOP + plot_h + 18.0, 10.0, "middle", "#000000", &format!("{:.2}", lo + (hi - lo) * frac));

        let y = MARGIN_TOP + plot_h * (1.0 - frac);
        doc.line(MARGIN_LEFT - 5.0, y, MARGIN_LEFT, y, "#000000");
        doc.text(MARGIN_LEFT - 8.0, y + 3.0, 10.0, "end", "#000000", &format!("{:.0}", max_count as f64 * frac));
    }

    for (i, s) in series.iter().enumerate() {
        let y = MARGIN_TOP + 12.0 + 16.0 * i as f64;
        let x = WIDTH - MARGIN_RIGHT - 150.0;
        doc.rect(x, y - 9.0, 12.0, 10.0, s.color, s.opacity.max(0.4));
        doc.text(x + 18.0, y, 11.0, "start", "#000000", s.label);
    }

    doc.render()
}

pub fn save_histogram(path: &Path, title: &str, series: &[HistogramSeries<'_>]) -> Result<(), ReportError> {
    write_text(path, &render_histogram(title, series, DEFAULT_BINS))
}
