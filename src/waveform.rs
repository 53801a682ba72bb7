//! Waveform
//!
//! Renders the first few seconds of a buffer as an amplitude-vs-time PNG.
//! The title is drawn above the plot with an 8x8 bitmap font and repeated in
//! the image's `Title` text chunk.

use font8x8::{UnicodeFonts, BASIC_FONTS, LATIN_FONTS};
use thiserror::Error;

use crate::signal::AudioBuffer;

/// Longest stretch of audio drawn, in seconds.
pub const DEFAULT_MAX_DURATION_SECS: f32 = 5.0;
/// Image width in pixels.
pub const DEFAULT_WIDTH: u32 = 800;
/// Image height in pixels.
pub const DEFAULT_HEIGHT: u32 = 300;
/// Blank border around the plot and its labels in pixels.
pub const DEFAULT_PADDING: u32 = 12;

type Rgb = [u8; 3];

const BACKGROUND: Rgb = [255, 255, 255];
const GRID: Rgb = [222, 222, 222];
const AXIS: Rgb = [150, 150, 150];
const TRACE: Rgb = [31, 119, 180];
const TEXT: Rgb = [40, 40, 40];

/// Glyph cell size of the bitmap font
const GLYPH: u32 = 8;
/// Title glyphs are drawn at this multiple when they fit
const TITLE_SCALE: u32 = 2;

const X_LABEL: &str = "Time (Samples)";
const Y_LABEL: &str = "Amplitude";

const GRID_ROWS: u32 = 4;
const GRID_COLUMNS: u32 = 10;

/// Errors produced while rendering a waveform.
///
/// These never affect the textual analysis; callers report them separately.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A label is not Latin-1 text without NUL, so it can neither be drawn
    /// nor stored in a PNG text chunk.
    #[error("label {0:?} cannot be embedded in the image title")]
    InvalidLabel(String),

    /// An error occurred during the configuration of the WaveformRenderer.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The PNG encoder failed.
    #[error("png encoding failed: {0}")]
    Encoding(#[from] png::EncodingError),
}

/// Builder for a [`WaveformRenderer`].
#[derive(Debug, Clone)]
pub struct WaveformRendererBuilder {
    width: u32,
    height: u32,
    padding: u32,
    max_duration_secs: f32,
}

impl WaveformRendererBuilder {
    /// Start with default parameters:
    /// width = 800, height = 300, padding = 12, max_duration_secs = 5.0.
    pub fn new() -> Self {
        WaveformRendererBuilder {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            padding: DEFAULT_PADDING,
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
        }
    }

    /// Set the image width in pixels.
    pub fn width(mut self, px: u32) -> Self {
        self.width = px;
        self
    }

    /// Set the image height in pixels.
    pub fn height(mut self, px: u32) -> Self {
        self.height = px;
        self
    }

    /// Set the border around the plot and its labels in pixels.
    pub fn padding(mut self, px: u32) -> Self {
        self.padding = px;
        self
    }

    /// Set the longest stretch of audio drawn.
    pub fn max_duration_secs(mut self, secs: f32) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Finalize and create the WaveformRenderer.
    pub fn build(self) -> Result<WaveformRenderer, RenderError> {
        if PlotArea::new(self.width, self.height, self.padding).is_none() {
            return Err(RenderError::Configuration(format!(
                "{}x{} image leaves no room for a plot with {} px padding",
                self.width, self.height, self.padding
            )));
        }
        if !(self.max_duration_secs.is_finite() && self.max_duration_secs > 0.0) {
            return Err(RenderError::Configuration(
                "max_duration_secs must be positive".into(),
            ));
        }
        Ok(WaveformRenderer {
            width: self.width,
            height: self.height,
            padding: self.padding,
            max_duration_secs: self.max_duration_secs,
        })
    }
}

impl Default for WaveformRendererBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Waveform plot renderer.
#[derive(Debug, Clone)]
pub struct WaveformRenderer {
    width: u32,
    height: u32,
    padding: u32,
    max_duration_secs: f32,
}

impl WaveformRenderer {
    /// Start customizing with a builder.
    pub fn builder() -> WaveformRendererBuilder {
        WaveformRendererBuilder::new()
    }

    /// Plot title for a clip of this buffer's length.
    pub fn title(&self, buffer: &AudioBuffer, labels: &[&str]) -> String {
        let shown = buffer.duration_secs().min(self.max_duration_secs);
        let mut title = format!("Waveform (First {shown:.1}s)");
        let labels: Vec<&str> = labels
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect();
        if !labels.is_empty() {
            title.push_str(" - ");
            title.push_str(&labels.join(" | "));
        }
        title
    }

    /// Render the head of `buffer` to PNG bytes, titled with `labels`.
    pub fn render(&self, buffer: &AudioBuffer, labels: &[&str]) -> Result<Vec<u8>, RenderError> {
        let title = self.title(buffer, labels);
        if let Some(bad) = labels.iter().find(|l| !is_latin1_text(l)) {
            return Err(RenderError::InvalidLabel(bad.to_string()));
        }

        let window = buffer.head(self.max_duration_secs);
        let pixels = self.rasterize(window, &title);

        let mut out = Vec::new();
        let mut encoder = png::Encoder::new(&mut out, self.width, self.height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.add_text_chunk("Title".to_string(), title)?;
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&pixels)?;
        writer.finish()?;

        log::debug!(
            "rendered {} samples into a {}x{} waveform ({} bytes)",
            window.len(),
            self.width,
            self.height,
            out.len()
        );
        Ok(out)
    }

    fn rasterize(&self, samples: &[f32], title: &str) -> Vec<u8> {
        let mut canvas = Canvas::new(self.width, self.height);
        // Validated by the builder; Default uses the same geometry.
        let Some(area) = PlotArea::new(self.width, self.height, self.padding) else {
            return canvas.pixels;
        };
        let PlotArea {
            left,
            top,
            right,
            bottom,
        } = area;
        let plot_w = right - left + 1;

        self.draw_labels(&mut canvas, &area, title);

        for i in 0..=GRID_ROWS {
            canvas.hline(left, right, top + (bottom - top) * i / GRID_ROWS, GRID);
        }
        for i in 0..=GRID_COLUMNS {
            canvas.vline(left + (right - left) * i / GRID_COLUMNS, top, bottom, GRID);
        }
        let zero = amplitude_to_y(0.0, top, bottom);
        canvas.hline(left, right, zero, AXIS);

        let n = samples.len();
        if n == 0 {
            return canvas.pixels;
        }

        // Min/max per column, joined to the previous column so the trace stays
        // continuous when zoomed in.
        let mut prev: Option<u32> = None;
        for col in 0..plot_w {
            let start = (col as usize * n) / plot_w as usize;
            let end = (((col as usize + 1) * n) / plot_w as usize).max(start + 1).min(n);
            let (lo, hi) = samples[start.min(n - 1)..end]
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| {
                    (lo.min(s), hi.max(s))
                });

            let mut y_top = amplitude_to_y(hi, top, bottom);
            let mut y_bottom = amplitude_to_y(lo, top, bottom);
            if let Some(p) = prev {
                y_top = y_top.min(p);
                y_bottom = y_bottom.max(p);
            }
            canvas.vline(left + col, y_top, y_bottom, TRACE);
            prev = Some(amplitude_to_y(samples[end - 1], top, bottom));
        }

        canvas.pixels
    }

    /// Title centred above the plot, axis labels below and to the left.
    fn draw_labels(&self, canvas: &mut Canvas, area: &PlotArea, title: &str) {
        let room = self.width.saturating_sub(2 * self.padding);
        let scale = if text_width(title, TITLE_SCALE) <= room {
            TITLE_SCALE
        } else {
            1
        };
        let title_x = self.width.saturating_sub(text_width(title, scale)) / 2;
        let title_y = self.padding + (GLYPH * TITLE_SCALE - GLYPH * scale) / 2;
        canvas.text(title_x, title_y, title, scale, TEXT);

        let centre_x = (area.left + area.right) / 2;
        let x_label_x = centre_x.saturating_sub(text_width(X_LABEL, 1) / 2);
        canvas.text(x_label_x, area.bottom + 1 + self.padding / 2, X_LABEL, 1, TEXT);

        let centre_y = (area.top + area.bottom) / 2;
        let y_label_base = centre_y + text_width(Y_LABEL, 1) / 2;
        canvas.text_up(self.padding / 2, y_label_base, Y_LABEL, TEXT);
    }
}

impl Default for WaveformRenderer {
    fn default() -> Self {
        WaveformRenderer {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            padding: DEFAULT_PADDING,
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
        }
    }
}

/// Inclusive pixel bounds of the plot box
struct PlotArea {
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
}

impl PlotArea {
    /// Layout for an image, or `None` when the labels leave no plot.
    ///
    /// Rows: padding, title, padding, plot, padding/2, x label, padding/2.
    /// Columns: padding/2, y label, padding/2, plot, padding.
    fn new(width: u32, height: u32, padding: u32) -> Option<PlotArea> {
        let left = padding.checked_add(GLYPH)?;
        let top = padding.checked_mul(2)?.checked_add(GLYPH * TITLE_SCALE)?;
        let right = width.checked_sub(padding)?.checked_sub(1)?;
        let bottom = height
            .checked_sub(padding.checked_add(GLYPH)?)?
            .checked_sub(1)?;
        (right > left && bottom > top).then_some(PlotArea {
            left,
            top,
            right,
            bottom,
        })
    }
}

/// RGB8 pixel buffer
struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    fn new(width: u32, height: u32) -> Self {
        let pixels = BACKGROUND
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Canvas {
            width,
            height,
            pixels,
        }
    }

    #[inline]
    fn put(&mut self, x: u32, y: u32, color: Rgb) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        self.pixels[i..i + 3].copy_from_slice(&color);
    }

    fn fill(&mut self, x: u32, y: u32, size: u32, color: Rgb) {
        for dy in 0..size {
            for dx in 0..size {
                self.put(x.saturating_add(dx), y.saturating_add(dy), color);
            }
        }
    }

    /// Left-to-right text with its top-left corner at `(x, y)`.
    fn text(&mut self, x: u32, y: u32, text: &str, scale: u32, color: Rgb) {
        let mut pen = x;
        for c in text.chars() {
            if let Some(rows) = glyph(c) {
                for (gy, row) in (0u32..).zip(rows) {
                    for gx in (0..GLYPH).filter(|gx| row & (1 << gx) != 0) {
                        self.fill(
                            pen.saturating_add(gx * scale),
                            y.saturating_add(gy * scale),
                            scale,
                            color,
                        );
                    }
                }
            }
            pen = pen.saturating_add(GLYPH * scale);
        }
    }

    /// Text rotated a quarter turn counter-clockwise, reading upwards from
    /// `base`, with glyph tops facing `x`.
    fn text_up(&mut self, x: u32, base: u32, text: &str, color: Rgb) {
        for (i, c) in (0u32..).zip(text.chars()) {
            let Some(rows) = glyph(c) else { continue };
            for (gy, row) in (0u32..).zip(rows) {
                for gx in (0..GLYPH).filter(|gx| row & (1 << gx) != 0) {
                    if let Some(y) = base.checked_sub(i * GLYPH + gx) {
                        self.put(x + gy, y, color);
                    }
                }
            }
        }
    }

    fn hline(&mut self, x0: u32, x1: u32, y: u32, color: Rgb) {
        (x0..=x1).for_each(|x| self.put(x, y, color));
    }

    fn vline(&mut self, x: u32, y0: u32, y1: u32, color: Rgb) {
        (y0.min(y1)..=y0.max(y1)).for_each(|y| self.put(x, y, color));
    }
}

/// Map an amplitude in `[-1, 1]` onto a pixel row, +1 at `top`.
fn amplitude_to_y(v: f32, top: u32, bottom: u32) -> u32 {
    let v = if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 };
    let span = (bottom - top) as f32;
    top + ((1.0 - v) * 0.5 * span).round() as u32
}

/// Bitmap for a Latin-1 character; bit 0 of each row is the leftmost pixel.
fn glyph(c: char) -> Option<[u8; 8]> {
    BASIC_FONTS.get(c).or_else(|| LATIN_FONTS.get(c))
}

fn text_width(text: &str, scale: u32) -> u32 {
    (text.chars().count() as u32).saturating_mul(GLYPH * scale)
}

fn is_latin1_text(s: &str) -> bool {
    s.chars().all(|c| c != '\0' && (c as u32) <= 0xFF)
}
