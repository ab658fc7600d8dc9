//! Scalp topography rasterizer.
//!
//! Sensor values are spread over a square grid covering the unit head disk by
//! inverse-distance weighting, coloured with a diverging blue/white/red map
//! symmetric around zero, and painted with plotters onto an RGB buffer that is
//! finally encoded as PNG.

use crate::error::{Result, SignalError};
use crate::montage::SensorPosition;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::f64::consts::PI;
use std::io::Cursor;

/// Diverging map anchors from strong negative (blue) to strong positive (red).
const RDBU_R: [(u8, u8, u8); 11] = [
    (0x05, 0x30, 0x61),
    (0x21, 0x66, 0xac),
    (0x43, 0x93, 0xc3),
    (0x92, 0xc5, 0xde),
    (0xd1, 0xe5, 0xf0),
    (0xf7, 0xf7, 0xf7),
    (0xfd, 0xdb, 0xc7),
    (0xf4, 0xa5, 0x82),
    (0xd6, 0x60, 0x4d),
    (0xb2, 0x18, 0x2b),
    (0x67, 0x00, 0x1f),
];

#[derive(Clone, Debug)]
pub struct TopomapStyle {
    pub width: u32,
    pub height: u32,
    pub grid_size: usize,
    pub idw_power: f64,
    pub background: RGBColor,
    pub outline: RGBColor,
    pub sensor: RGBColor,
}

impl Default for TopomapStyle {
    fn default() -> Self {
        Self {
            width: 600,
            height: 500,
            grid_size: 64,
            idw_power: 2.0,
            background: BLACK,
            outline: WHITE,
            sensor: BLACK,
        }
    }
}

/// Interpolated field over the head disk.
#[derive(Debug, Clone)]
pub struct TopomapGrid {
    pub size: usize,
    /// Row-major, top row first; `None` outside the head.
    pub cells: Vec<Option<f64>>,
    /// Symmetric colour limit, `max |value|` over the sensors.
    pub vlim: f64,
}

impl TopomapGrid {
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.cells[row * self.size + col]
    }
}

/// Head-disk coordinates of a grid cell centre (+y towards the nose).
fn cell_center(row: usize, col: usize, size: usize) -> (f64, f64) {
    let step = 2.0 / size as f64;
    let x = -1.0 + (col as f64 + 0.5) * step;
    let y = 1.0 - (row as f64 + 0.5) * step;
    (x, y)
}

pub fn interpolate_grid(
    values: &[f64],
    positions: &[SensorPosition],
    size: usize,
    power: f64,
) -> Result<TopomapGrid> {
    if values.len() != positions.len() {
        return Err(SignalError::InvalidParameter(format!(
            "{} values for {} sensor positions",
            values.len(),
            positions.len()
        )));
    }
    if values.is_empty() {
        return Err(SignalError::RenderError(
            "no positioned channels to interpolate".to_string(),
        ));
    }
    if size == 0 {
        return Err(SignalError::InvalidParameter("grid size must be positive".to_string()));
    }

    let mut cells = Vec::with_capacity(size * size);
    for row in 0..size {
        for col in 0..size {
            let (x, y) = cell_center(row, col, size);
            if x * x + y * y > 1.0 {
                cells.push(None);
                continue;
            }
            cells.push(Some(idw(values, positions, x, y, power)));
        }
    }

    let vlim = values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    Ok(TopomapGrid {
        size,
        cells,
        vlim: if vlim > 0.0 { vlim } else { 1.0 },
    })
}

fn idw(values: &[f64], positions: &[SensorPosition], x: f64, y: f64, power: f64) -> f64 {
    let mut weighted = 0.0;
    let mut total = 0.0;
    for (value, position) in values.iter().zip(positions) {
        let distance = position.distance_to(x, y);
        if distance < 1e-9 {
            return *value;
        }
        let weight = distance.powf(-power);
        weighted += weight * value;
        total += weight;
    }
    weighted / total
}

/// Map `t` in [0, 1] onto the diverging colour map.
pub fn diverging_color(t: f64) -> RGBColor {
    let t = if t.is_nan() { 0.5 } else { t.clamp(0.0, 1.0) };
    let scaled = t * (RDBU_R.len() - 1) as f64;
    let lower = (scaled.floor() as usize).min(RDBU_R.len() - 2);
    let frac = scaled - lower as f64;
    let (r0, g0, b0) = RDBU_R[lower];
    let (r1, g1, b1) = RDBU_R[lower + 1];
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
    RGBColor(mix(r0, r1), mix(g0, g1), mix(b0, b1))
}

/// Render sensor values at their scalp positions into PNG bytes.
///
/// `actual_time` is the instant the values describe and goes into the title.
pub fn render_png(
    values: &[f64],
    positions: &[SensorPosition],
    actual_time: f64,
    style: &TopomapStyle,
) -> Result<Vec<u8>> {
    let grid = interpolate_grid(values, positions, style.grid_size, style.idw_power)?;

    let (width, height) = (style.width as i32, style.height as i32);
    let radius = (height.min(width - 120) as f64 * 0.4).max(10.0);
    let center = ((width - 120) / 2 + 20, height / 2 + 15);
    let to_pixel = |x: f64, y: f64| -> (i32, i32) {
        (
            center.0 + (x * radius).round() as i32,
            center.1 - (y * radius).round() as i32,
        )
    };

    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;

        // Interpolated field
        let step = 2.0 / grid.size as f64;
        for row in 0..grid.size {
            for col in 0..grid.size {
                let Some(value) = grid.get(row, col) else {
                    continue;
                };
                let (cx, cy) = cell_center(row, col, grid.size);
                let top_left = to_pixel(cx - step / 2.0, cy + step / 2.0);
                let bottom_right = to_pixel(cx + step / 2.0, cy - step / 2.0);
                let color = diverging_color((value + grid.vlim) / (2.0 * grid.vlim));
                root.draw(&Rectangle::new([top_left, bottom_right], color.filled()))?;
            }
        }

        let outline = style.outline.stroke_width(2);

        // Head, nose and ears
        root.draw(&Circle::new(center, radius.round() as i32, outline))?;
        root.draw(&PathElement::new(
            vec![to_pixel(-0.1, 0.995), to_pixel(0.0, 1.12), to_pixel(0.1, 0.995)],
            outline,
        ))?;
        for side in [-1.0, 1.0] {
            let ear: Vec<(i32, i32)> = (0..=16)
                .map(|i| {
                    let angle = -PI / 2.0 + PI * i as f64 / 16.0;
                    to_pixel(side * (1.0 + 0.08 * angle.cos()), 0.18 * angle.sin())
                })
                .collect();
            root.draw(&PathElement::new(ear, outline))?;
        }

        for position in positions {
            root.draw(&Circle::new(
                to_pixel(position.x, position.y),
                3,
                style.sensor.filled(),
            ))?;
        }

        // Vertical colour bar, maximum at the top
        let bar = ColorBar {
            left: width - 100,
            right: width - 75,
            top: center.1 - radius.round() as i32,
            bottom: center.1 + radius.round() as i32,
        };
        let span = (bar.bottom - bar.top).max(1);
        for y in bar.top..bar.bottom {
            let t = 1.0 - (y - bar.top) as f64 / span as f64;
            root.draw(&Rectangle::new(
                [(bar.left, y), (bar.right, y + 1)],
                diverging_color(t).filled(),
            ))?;
        }
        root.draw(&Rectangle::new(
            [(bar.left, bar.top), (bar.right, bar.bottom)],
            style.outline.stroke_width(1),
        ))?;
        for tick in bar.ticks() {
            root.draw(&PathElement::new(
                vec![(bar.right, tick), (bar.right + 6, tick)],
                style.outline.stroke_width(1),
            ))?;
        }

        // Text needs a system font; the image stays usable without it
        let title = format!("Topographic Map at {:.2}s", actual_time);
        if let Err(e) = draw_labels(&root, style, &title, center.0, &bar, grid.vlim) {
            log::warn!("Topomap rendered without text: {}", e);
        }

        root.present()?;
    }

    encode_png(&buffer, style.width, style.height)
}

struct ColorBar {
    left: i32,
    right: i32,
    top: i32,
    bottom: i32,
}

impl ColorBar {
    /// Pixel rows for +vlim, 0 and -vlim.
    fn ticks(&self) -> [i32; 3] {
        [self.top, (self.top + self.bottom) / 2, self.bottom]
    }
}

fn draw_labels(
    root: &DrawingArea<BitMapBackend<'_>, Shift>,
    style: &TopomapStyle,
    title: &str,
    title_x: i32,
    bar: &ColorBar,
    vlim: f64,
) -> Result<()> {
    let title_style = ("sans-serif", 20)
        .into_font()
        .color(&style.outline)
        .pos(Pos::new(HPos::Center, VPos::Top));
    root.draw(&Text::new(title.to_string(), (title_x, 12), title_style))?;

    let tick_style = ("sans-serif", 12)
        .into_font()
        .color(&style.outline)
        .pos(Pos::new(HPos::Left, VPos::Center));
    for (tick, value) in bar.ticks().into_iter().zip([vlim, 0.0, -vlim]) {
        root.draw(&Text::new(
            format!("{:.1}", value),
            (bar.right + 9, tick),
            tick_style.clone(),
        ))?;
    }

    let axis_style = ("sans-serif", 14)
        .into_font()
        .transform(FontTransform::Rotate270)
        .color(&style.outline)
        .pos(Pos::new(HPos::Center, VPos::Center));
    root.draw(&Text::new(
        "Amplitude (\u{b5}V)".to_string(),
        (style.width as i32 - 15, (bar.top + bar.bottom) / 2),
        axis_style,
    ))?;
    Ok(())
}

fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| SignalError::RenderError("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
