//! Plot panels drawn with embedded-graphics onto an `RgbImage`.
//!
//! `Canvas` is the draw target; `Translucent` wraps it to alpha-blend fills.
//! The drawing functions are generic over any `DrawTarget<Color = Rgb888>`.

use std::convert::Infallible;

use embedded_graphics::mono_font::{ascii::FONT_6X10, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Line, PrimitiveStyle, PrimitiveStyleBuilder, Rectangle, StrokeAlignment};
use embedded_graphics::text::{Alignment, Text};
use image::{Rgb, RgbImage};

pub const BACKGROUND: Rgb888 = Rgb888::new(255, 255, 255);
pub const AXIS: Rgb888 = Rgb888::new(40, 40, 40);
pub const SERIES: Rgb888 = Rgb888::new(31, 119, 180);
pub const CONTEXT_SERIES: Rgb888 = Rgb888::new(0, 0, 255);
pub const SHADE: Rgb888 = Rgb888::new(0, 0, 255);

const TICK_LEN: i32 = 5;
/// FONT_6X10 glyph height.
const CHAR_HEIGHT: i32 = 10;

/// Rectangular plotting area in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Panel {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl Panel {
    fn left_x(&self) -> i32 {
        self.left as i32
    }

    fn top_y(&self) -> i32 {
        self.top as i32
    }

    fn bottom(&self) -> i32 {
        self.top_y() + self.height as i32 - 1
    }

    fn center_x(&self) -> i32 {
        self.left_x() + self.width as i32 / 2
    }

    fn bounds(&self) -> Rectangle {
        Rectangle::new(Point::new(self.left_x(), self.top_y()), Size::new(self.width, self.height))
    }

    /// x pixel of point `i` out of `n` evenly spaced points. A lone point sits
    /// in the middle.
    pub fn x_at(&self, i: usize, n: usize) -> i32 {
        if n <= 1 {
            return self.center_x();
        }
        let span = self.width.saturating_sub(1) as f64;
        self.left_x() + (i as f64 / (n - 1) as f64 * span).round() as i32
    }

    /// y pixel of `v` within `[lo, hi]`, larger values higher up. A flat range
    /// maps to the vertical middle.
    pub fn y_at(&self, v: f64, lo: f64, hi: f64) -> i32 {
        if hi <= lo {
            return self.top_y() + self.height as i32 / 2;
        }
        let span = self.height.saturating_sub(1) as f64;
        let frac = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);
        self.bottom() - (frac * span).round() as i32
    }
}

// ---------------------------------------------------------------------------
// Draw targets
// ---------------------------------------------------------------------------

pub struct Canvas {
    img: RgbImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            img: RgbImage::from_pixel(width, height, to_rgb(BACKGROUND)),
        }
    }

    pub fn into_image(self) -> RgbImage {
        self.img
    }

    /// A view that blends everything drawn through it at `alpha`.
    pub fn translucent(&mut self, alpha: f32) -> Translucent<'_> {
        Translucent {
            canvas: self,
            alpha: alpha.clamp(0.0, 1.0),
        }
    }

    fn pixel_mut(&mut self, p: Point) -> Option<&mut Rgb<u8>> {
        let (Ok(x), Ok(y)) = (u32::try_from(p.x), u32::try_from(p.y)) else {
            return None;
        };
        if x < self.img.width() && y < self.img.height() {
            Some(self.img.get_pixel_mut(x, y))
        } else {
            None
        }
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.img.width(), self.img.height())
    }
}

impl DrawTarget for Canvas {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if let Some(px) = self.pixel_mut(point) {
                *px = to_rgb(color);
            }
        }
        Ok(())
    }
}

pub struct Translucent<'a> {
    canvas: &'a mut Canvas,
    alpha: f32,
}

impl OriginDimensions for Translucent<'_> {
    fn size(&self) -> Size {
        self.canvas.size()
    }
}

impl DrawTarget for Translucent<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let alpha = self.alpha;
        for Pixel(point, color) in pixels {
            if let Some(px) = self.canvas.pixel_mut(point) {
                for (dst, src) in px.0.iter_mut().zip(to_rgb(color).0) {
                    let mixed = f32::from(*dst) * (1.0 - alpha) + f32::from(src) * alpha;
                    *dst = mixed.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
        Ok(())
    }
}

fn to_rgb(color: Rgb888) -> Rgb<u8> {
    Rgb([color.r(), color.g(), color.b()])
}

// ---------------------------------------------------------------------------
// Drawing
// ---------------------------------------------------------------------------

/// One-pixel border drawn on the panel's outermost pixels.
pub fn draw_frame<D>(panel: &Panel, display: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb888>,
{
    let style = PrimitiveStyleBuilder::new()
        .stroke_color(AXIS)
        .stroke_width(1)
        .stroke_alignment(StrokeAlignment::Inside)
        .build();
    panel.bounds().into_styled(style).draw(display)
}

/// Fills the full panel height between points `first..=last` of `n`.
pub fn draw_shade<D>(panel: &Panel, first: usize, last: usize, n: usize, display: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb888>,
{
    let (a, b) = (panel.x_at(first, n), panel.x_at(last, n));
    Rectangle::with_corners(Point::new(a.min(b), panel.top_y()), Point::new(a.max(b), panel.bottom()))
        .into_styled(PrimitiveStyle::with_fill(SHADE))
        .draw(display)
}

/// Draws `values` as a polyline scaled to the panel. Non-finite values
/// break the line.
pub fn draw_series<D>(panel: &Panel, values: &[f64], color: Rgb888, display: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb888>,
{
    let Some((lo, hi)) = finite_range(values) else {
        return Ok(());
    };
    let style = PrimitiveStyle::with_stroke(color, 1);
    let n = values.len();

    let mut prev: Option<Point> = None;
    for (i, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            prev = None;
            continue;
        }
        let point = Point::new(panel.x_at(i, n), panel.y_at(v, lo, hi));
        match prev {
            Some(p) => Line::new(p, point).into_styled(style).draw(display)?,
            None => Pixel(point, color).draw(display)?,
        }
        prev = Some(point);
    }
    Ok(())
}

/// Tick marks and labels under the panel at point indices of `n`, with the
/// axis name centered below them.
pub fn draw_x_axis<D>(
    panel: &Panel,
    n: usize,
    labels: &[(usize, String)],
    name: &str,
    display: &mut D,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb888>,
{
    let style = PrimitiveStyle::with_stroke(AXIS, 1);
    let bottom = panel.bottom();
    for (i, label) in labels {
        let x = panel.x_at(*i, n);
        Line::new(Point::new(x, bottom), Point::new(x, bottom + TICK_LEN))
            .into_styled(style)
            .draw(display)?;
        draw_text(label, Point::new(x, bottom + TICK_LEN + CHAR_HEIGHT), Alignment::Center, display)?;
    }
    let name_y = bottom + TICK_LEN + 2 * CHAR_HEIGHT + 2;
    draw_text(name, Point::new(panel.center_x(), name_y), Alignment::Center, display)
}

/// `ticks` evenly spaced value ticks left of the panel, labelled with one
/// decimal, and the axis name above them. A flat range gets a single tick.
pub fn draw_y_axis<D>(panel: &Panel, lo: f64, hi: f64, ticks: usize, name: &str, display: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb888>,
{
    let style = PrimitiveStyle::with_stroke(AXIS, 1);
    let left = panel.left_x();
    let ticks = if hi > lo { ticks } else { ticks.min(1) };
    for k in 0..ticks {
        let v = if ticks > 1 {
            lo + (hi - lo) * k as f64 / (ticks - 1) as f64
        } else {
            lo
        };
        let y = panel.y_at(v, lo, hi);
        Line::new(Point::new(left - TICK_LEN, y), Point::new(left, y))
            .into_styled(style)
            .draw(display)?;
        let at = Point::new(left - TICK_LEN - 2, y + CHAR_HEIGHT / 2 - 1);
        draw_text(&format!("{v:.1}"), at, Alignment::Right, display)?;
    }
    draw_text(name, Point::new(left - 2, panel.top_y() - 4), Alignment::Right, display)
}

/// Title centered above the panel.
pub fn draw_title<D>(panel: &Panel, title: &str, display: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb888>,
{
    draw_text(title, Point::new(panel.center_x(), panel.top_y() - 4), Alignment::Center, display)
}

fn draw_text<D>(text: &str, at: Point, alignment: Alignment, display: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb888>,
{
    let style = MonoTextStyle::new(&FONT_6X10, AXIS);
    Text::with_alignment(text, at, style, alignment).draw(display)?;
    Ok(())
}

/// Min and max over the finite values, `None` if there are none.
pub fn finite_range(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}
