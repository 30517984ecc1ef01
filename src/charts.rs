use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::error::Error;
use std::path::Path;

/// Accent green used for alternating chart series (#1DBF73)
pub const FIVERR_GREEN: RGBColor = RGBColor(29, 191, 115);

/// Muted slate blue used for alternating chart series (#7CA5B8)
pub const SLATE_BLUE: RGBColor = RGBColor(124, 165, 184);

const DARK_GREEN: RGBColor = RGBColor(0, 104, 55);

/// Styling options shared by all chart renderers
#[derive(Clone, Debug)]
pub struct ChartStyle {
    /// Title drawn at the top of the chart
    pub title: String,

    /// Label for the X axis
    pub x_label: String,

    /// Label for the Y axis
    pub y_label: String,

    /// Width of the image in pixels
    pub width: u32,

    /// Height of the image in pixels
    pub height: u32,

    /// Primary series color
    pub color: RGBColor,
}

impl Default for ChartStyle {
    fn default() -> Self {
        Self {
            title: "Chart".to_string(),
            x_label: String::new(),
            y_label: String::new(),
            width: 900,
            height: 600,
            color: FIVERR_GREEN,
        }
    }
}

/// Save a bar chart of labeled values
///
/// Bars are centered on integer positions so the axis tick labels line up
/// with the bars. An empty input produces a blank chart rather than an error.
pub fn save_bar_chart(
    entries: &[(String, f64)],
    style: &ChartStyle,
    path: &Path,
) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE)?;

    if entries.is_empty() {
        root.present()?;
        return Ok(());
    }

    let n = entries.len();
    let max_y = positive_ceiling(entries.iter().map(|(_, v)| *v));
    let labels: Vec<String> = entries.iter().map(|(l, _)| l.clone()).collect();

    let mut chart = ChartBuilder::on(&root)
        .caption(&style.title, ("sans-serif", 28))
        .margin(15)
        .x_label_area_size(70)
        .y_label_area_size(70)
        .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), 0f64..max_y)?;

    chart
        .configure_mesh()
        .x_desc(&style.x_label)
        .y_desc(&style.y_label)
        .x_labels(n)
        .x_label_formatter(&|x| center_label(*x, &labels))
        .draw()?;

    chart.draw_series(entries.iter().enumerate().map(|(i, (_, v))| {
        Rectangle::new(
            [(i as f64 - 0.4, 0.0), (i as f64 + 0.4, *v)],
            style.color.filled(),
        )
    }))?;

    root.present()?;
    Ok(())
}

/// Save a grouped (hue-split) bar chart
///
/// `groups` gives the outer axis labels; each entry in `series` is one hue
/// with a value per group. Series colors cycle through a small green-leaning
/// palette and a legend is drawn.
pub fn save_grouped_bar_chart(
    groups: &[String],
    series: &[(String, Vec<f64>)],
    style: &ChartStyle,
    path: &Path,
) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE)?;

    if groups.is_empty() || series.is_empty() {
        root.present()?;
        return Ok(());
    }

    let n = groups.len();
    let max_y = positive_ceiling(series.iter().flat_map(|(_, vals)| vals.iter().copied()));

    let mut chart = ChartBuilder::on(&root)
        .caption(&style.title, ("sans-serif", 28))
        .margin(15)
        .x_label_area_size(70)
        .y_label_area_size(70)
        .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), 0f64..max_y)?;

    let group_labels = groups.to_vec();
    chart
        .configure_mesh()
        .x_desc(&style.x_label)
        .y_desc(&style.y_label)
        .x_labels(n)
        .x_label_formatter(&|x| center_label(*x, &group_labels))
        .draw()?;

    let palette = [FIVERR_GREEN, SLATE_BLUE, RGBColor(106, 168, 79), RGBColor(56, 118, 29)];
    let bar_width = 0.8 / series.len() as f64;

    for (si, (name, values)) in series.iter().enumerate() {
        let color = palette[si % palette.len()];
        chart
            .draw_series(values.iter().enumerate().map(|(i, v)| {
                let x0 = i as f64 - 0.4 + si as f64 * bar_width;
                Rectangle::new([(x0, 0.0), (x0 + bar_width, *v)], color.filled())
            }))?
            .label(name)
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.85))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Save vertical box plots, one per labeled group
pub fn save_box_plot(
    groups: &[(String, Vec<f64>)],
    style: &ChartStyle,
    path: &Path,
) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let groups: Vec<&(String, Vec<f64>)> = groups.iter().filter(|(_, v)| !v.is_empty()).collect();
    if groups.is_empty() {
        root.present()?;
        return Ok(());
    }

    // The boxplot element plots f32 quartile values
    let max_y = positive_ceiling(groups.iter().flat_map(|(_, v)| v.iter().copied())) as f32;
    let labels: Vec<String> = groups.iter().map(|(l, _)| l.clone()).collect();

    let mut chart = ChartBuilder::on(&root)
        .caption(&style.title, ("sans-serif", 28))
        .margin(15)
        .x_label_area_size(70)
        .y_label_area_size(70)
        .build_cartesian_2d((0..groups.len() as i32).into_segmented(), 0f32..max_y)?;

    chart
        .configure_mesh()
        .x_desc(&style.x_label)
        .y_desc(&style.y_label)
        .x_label_formatter(&|v| segment_label(v, &labels))
        .draw()?;

    chart.draw_series(groups.iter().enumerate().map(|(i, (_, values))| {
        let quartiles = Quartiles::new(values);
        Boxplot::new_vertical(SegmentValue::CenterOf(i as i32), &quartiles)
            .width(25)
            .whisker_width(0.5)
            .style(style.color)
    }))?;

    root.present()?;
    Ok(())
}

/// Save horizontal box plots, one per labeled group
///
/// The value axis runs along X, matching the wide-distribution charts where
/// the group names sit on the left.
pub fn save_box_plot_horizontal(
    groups: &[(String, Vec<f64>)],
    style: &ChartStyle,
    path: &Path,
) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let groups: Vec<&(String, Vec<f64>)> = groups.iter().filter(|(_, v)| !v.is_empty()).collect();
    if groups.is_empty() {
        root.present()?;
        return Ok(());
    }

    let max_x = positive_ceiling(groups.iter().flat_map(|(_, v)| v.iter().copied())) as f32;
    let labels: Vec<String> = groups.iter().map(|(l, _)| l.clone()).collect();

    let mut chart = ChartBuilder::on(&root)
        .caption(&style.title, ("sans-serif", 28))
        .margin(15)
        .x_label_area_size(70)
        .y_label_area_size(90)
        .build_cartesian_2d(0f32..max_x, (0..groups.len() as i32).into_segmented())?;

    chart
        .configure_mesh()
        .x_desc(&style.x_label)
        .y_desc(&style.y_label)
        .y_label_formatter(&|v| segment_label(v, &labels))
        .draw()?;

    chart.draw_series(groups.iter().enumerate().map(|(i, (_, values))| {
        let quartiles = Quartiles::new(values);
        Boxplot::new_horizontal(SegmentValue::CenterOf(i as i32), &quartiles)
            .width(25)
            .whisker_width(0.5)
            .style(style.color)
    }))?;

    root.present()?;
    Ok(())
}

/// Save a density curve from precomputed (x, density) points
pub fn save_density_curve(
    points: &[(f64, f64)],
    style: &ChartStyle,
    path: &Path,
) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE)?;

    if points.is_empty() {
        root.present()?;
        return Ok(());
    }

    let min_x = points.iter().map(|(x, _)| *x).fold(f64::INFINITY, f64::min);
    let max_x = points.iter().map(|(x, _)| *x).fold(f64::NEG_INFINITY, f64::max);
    let max_y = positive_ceiling(points.iter().map(|(_, y)| *y));

    let mut chart = ChartBuilder::on(&root)
        .caption(&style.title, ("sans-serif", 28))
        .margin(15)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d(min_x..max_x, 0f64..max_y)?;

    chart
        .configure_mesh()
        .x_desc(&style.x_label)
        .y_desc(&style.y_label)
        .draw()?;

    chart.draw_series(LineSeries::new(
        points.iter().copied(),
        style.color.stroke_width(2),
    ))?;

    root.present()?;
    Ok(())
}

/// Save an annotated correlation heatmap
///
/// Cell shading runs from white (-1) to dark green (+1); each cell is
/// annotated with its coefficient to two decimals.
pub fn save_correlation_heatmap(
    names: &[String],
    matrix: &[Vec<f64>],
    style: &ChartStyle,
    path: &Path,
) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let n = names.len();
    if n == 0 {
        root.present()?;
        return Ok(());
    }

    let mut chart = ChartBuilder::on(&root)
        .caption(&style.title, ("sans-serif", 28))
        .margin(15)
        .x_label_area_size(110)
        .y_label_area_size(110)
        .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), -0.5f64..(n as f64 - 0.5))?;

    let x_names = names.to_vec();
    let y_names = names.to_vec();
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n)
        .y_labels(n)
        .x_label_formatter(&|x| center_label(*x, &x_names))
        // Row 0 is drawn at the top
        .y_label_formatter(&|y| {
            let flipped: f64 = (n as f64 - 1.0) - *y;
            center_label(flipped, &y_names)
        })
        .draw()?;

    let mut cells = Vec::new();
    for (i, row) in matrix.iter().enumerate() {
        for (j, &r) in row.iter().enumerate() {
            cells.push((j as f64, (n - 1 - i) as f64, r));
        }
    }

    chart.draw_series(cells.iter().map(|&(x, y, r)| {
        Rectangle::new(
            [(x - 0.5, y - 0.5), (x + 0.5, y + 0.5)],
            heat_color(r).filled(),
        )
    }))?;

    chart.draw_series(cells.iter().map(|&(x, y, r)| {
        let ink = if (r + 1.0) / 2.0 > 0.6 { WHITE } else { BLACK };
        Text::new(
            format!("{:.2}", r),
            (x, y),
            ("sans-serif", 14)
                .into_font()
                .color(&ink)
                .pos(Pos::new(HPos::Center, VPos::Center)),
        )
    }))?;

    root.present()?;
    Ok(())
}

/// Save a pairwise scatter matrix of the given numeric columns
///
/// Off-diagonal panels scatter column j against column i; diagonal panels
/// show a 20-bin histogram of the column, captioned with its name.
pub fn save_scatter_matrix(
    names: &[String],
    columns: &[Vec<f64>],
    style: &ChartStyle,
    path: &Path,
) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let n = names.len();
    if n == 0 {
        root.present()?;
        return Ok(());
    }

    let panels = root.split_evenly((n, n));

    for i in 0..n {
        for j in 0..n {
            let panel = &panels[i * n + j];
            if i == j {
                draw_histogram_panel(panel, &names[i], &columns[i], style)?;
            } else {
                draw_scatter_panel(panel, &columns[j], &columns[i], style)?;
            }
        }
    }

    root.present()?;
    Ok(())
}

fn draw_scatter_panel(
    panel: &DrawingArea<BitMapBackend, plotters::coord::Shift>,
    xs: &[f64],
    ys: &[f64],
    style: &ChartStyle,
) -> Result<(), Box<dyn Error>> {
    let (min_x, max_x) = padded_range(xs);
    let (min_y, max_y) = padded_range(ys);

    let mut chart = ChartBuilder::on(panel)
        .margin(4)
        .x_label_area_size(18)
        .y_label_area_size(28)
        .build_cartesian_2d(min_x..max_x, min_y..max_y)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(3)
        .y_labels(3)
        .label_style(("sans-serif", 9))
        .draw()?;

    chart.draw_series(
        xs.iter()
            .zip(ys.iter())
            .map(|(&x, &y)| Circle::new((x, y), 2, style.color.mix(0.6).filled())),
    )?;

    Ok(())
}

fn draw_histogram_panel(
    panel: &DrawingArea<BitMapBackend, plotters::coord::Shift>,
    name: &str,
    values: &[f64],
    style: &ChartStyle,
) -> Result<(), Box<dyn Error>> {
    let (min, max) = padded_range(values);
    let bins = 20usize;
    let width = (max - min) / bins as f64;

    let mut counts = vec![0f64; bins];
    for &v in values {
        let mut idx = ((v - min) / width) as usize;
        if idx >= bins {
            idx = bins - 1;
        }
        counts[idx] += 1.0;
    }
    let max_count = positive_ceiling(counts.iter().copied());

    let mut chart = ChartBuilder::on(panel)
        .caption(name, ("sans-serif", 12))
        .margin(4)
        .x_label_area_size(18)
        .y_label_area_size(28)
        .build_cartesian_2d(min..max, 0f64..max_count)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(3)
        .y_labels(3)
        .label_style(("sans-serif", 9))
        .draw()?;

    chart.draw_series(counts.iter().enumerate().map(|(i, &c)| {
        let x0 = min + width * i as f64;
        Rectangle::new([(x0, 0.0), (x0 + width, c)], style.color.mix(0.8).filled())
    }))?;

    Ok(())
}

// Tick labels fall on integer positions; map those back to category names
fn center_label(x: f64, labels: &[String]) -> String {
    let idx = x.round();
    if (x - idx).abs() > 1e-6 || idx < 0.0 {
        return String::new();
    }
    labels.get(idx as usize).cloned().unwrap_or_default()
}

fn segment_label(value: &SegmentValue<i32>, labels: &[String]) -> String {
    match value {
        SegmentValue::CenterOf(i) if *i >= 0 => {
            labels.get(*i as usize).cloned().unwrap_or_default()
        }
        _ => String::new(),
    }
}

fn heat_color(r: f64) -> RGBColor {
    let t = ((r + 1.0) / 2.0).clamp(0.0, 1.0);
    let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    RGBColor(
        lerp(255, DARK_GREEN.0),
        lerp(255, DARK_GREEN.1),
        lerp(255, DARK_GREEN.2),
    )
}

// Upper bound for a value axis; keeps degenerate all-zero data drawable
fn positive_ceiling(values: impl Iterator<Item = f64>) -> f64 {
    let max = values.fold(0f64, f64::max);
    if max > 0.0 { max * 1.05 } else { 1.0 }
}

fn padded_range(values: &[f64]) -> (f64, f64) {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((max - min) * 0.05).max(0.5);
    (min - pad, max + pad)
}
