//! Coordinate mapping between editor canvas space and PDF page space.
//!
//! Canvas space has a top-left origin with Y growing downward; PDF page
//! space has a bottom-left origin with Y growing upward. Everything in this
//! module is a pure, total function: degenerate sizes and singular
//! transforms fall back instead of panicking.

/// Axis-aligned rectangle in canvas space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// 6-parameter affine transform, the PDF/PostScript `[a b c d e f]` layout:
///
/// ```text
/// x' = a*x + c*y + e
/// y' = b*x + d*y + f
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Matrix {
    pub const IDENTITY: Matrix =
        Matrix { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 };

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (self.a * x + self.c * y + self.e, self.b * x + self.d * y + self.f)
    }

    /// Closed-form inverse. A singular or non-finite matrix inverts to the
    /// identity so callers always get a usable transform.
    pub fn invert(&self) -> Matrix {
        let det = self.a * self.d - self.b * self.c;
        if !det.is_finite() || det.abs() < f32::EPSILON {
            return Matrix::IDENTITY;
        }

        let a = self.d / det;
        let b = -self.b / det;
        let c = -self.c / det;
        let d = self.a / det;
        Matrix {
            a,
            b,
            c,
            d,
            e: -(a * self.e + c * self.f),
            f: -(b * self.e + d * self.f),
        }
    }
}

impl From<[f32; 6]> for Matrix {
    fn from(m: [f32; 6]) -> Self {
        Matrix { a: m[0], b: m[1], c: m[2], d: m[3], e: m[4], f: m[5] }
    }
}

/// Rotate `(x, y)` by `angle_deg` degrees about `(cx, cy)`.
pub fn rotate_about(x: f32, y: f32, cx: f32, cy: f32, angle_deg: f32) -> (f32, f32) {
    let theta = angle_deg.to_radians();
    let (sin, cos) = theta.sin_cos();
    let dx = x - cx;
    let dy = y - cy;
    (cx + dx * cos - dy * sin, cy + dx * sin + dy * cos)
}

/// An element rectangle re-projected into page space, plus the uniform
/// scale to apply to font sizes, border widths, and stroke thicknesses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MappedRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

/// Convert a canvas-space Y coordinate (top-left origin) of an element of
/// height `element_height` to page-space (bottom-left origin).
pub fn canvas_to_pdf_y(canvas_y: f32, element_height: f32, page_height: f32) -> f32 {
    page_height - canvas_y - element_height
}

/// Absolute canvas coordinates to `[0, 1]` fractions.
pub fn normalize_point(x: f32, y: f32, width: f32, height: f32) -> (f32, f32) {
    (x / width, y / height)
}

/// `[0, 1]` fractions back to absolute coordinates.
pub fn denormalize_point(nx: f32, ny: f32, width: f32, height: f32) -> (f32, f32) {
    (nx * width, ny * height)
}

fn guard_scale(scale: f32) -> f32 {
    if scale.is_finite() && scale != 0.0 {
        scale
    } else {
        1.0
    }
}

/// Map an element rectangle from canvas space into page space.
///
/// With a page transform present, the inverse transform is applied to the
/// rectangle's corners and the axis-aligned bounding box of the result is
/// returned; the scale is the average of the per-axis size ratios. Without
/// one, the rectangle is normalized against `canvas`, projected onto
/// `page`, and flipped to the PDF Y origin.
pub fn map_element_rect(
    rect: Rect,
    canvas: Size,
    page: Size,
    transform: Option<&Matrix>,
) -> MappedRect {
    if let Some(transform) = transform {
        let inverse = transform.invert();
        let (x0, y0) = inverse.apply(rect.x, rect.y);
        let (x1, y1) = inverse.apply(rect.x + rect.width, rect.y + rect.height);

        let x = x0.min(x1);
        let y = y0.min(y1);
        let width = (x1 - x0).abs();
        let height = (y1 - y0).abs();
        let scale = guard_scale((width / rect.width + height / rect.height) / 2.0);

        return MappedRect { x, y, width, height, scale };
    }

    // Degenerate canvas metrics collapse to a 1:1 projection.
    let canvas_width = if canvas.width > 0.0 { canvas.width } else { page.width };
    let canvas_height = if canvas.height > 0.0 { canvas.height } else { page.height };

    let (nx, ny) = normalize_point(rect.x, rect.y, canvas_width, canvas_height);
    let (nw, nh) = normalize_point(rect.width, rect.height, canvas_width, canvas_height);
    let (x, _) = denormalize_point(nx, ny, page.width, page.height);
    let width = nw * page.width;
    let height = nh * page.height;
    let y = canvas_to_pdf_y(ny * page.height, height, page.height);

    MappedRect { x, y, width, height, scale: guard_scale(page.height / canvas_height) }
}

/// Normalized RGB color parsed from a hex string.
///
/// Malformed input yields NaN components rather than an error; use
/// [`Rgb::is_valid`] before handing the color to a renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };
    pub const WHITE: Rgb = Rgb { r: 1.0, g: 1.0, b: 1.0 };

    pub fn is_valid(&self) -> bool {
        [self.r, self.g, self.b]
            .iter()
            .all(|channel| channel.is_finite() && (0.0..=1.0).contains(channel))
    }
}

impl From<Rgb> for (f32, f32, f32) {
    fn from(rgb: Rgb) -> Self {
        (rgb.r, rgb.g, rgb.b)
    }
}

/// Parse `#rgb` or `#rrggbb` (case-insensitive, `#` optional) into
/// normalized channels. Never panics; malformed input produces NaN.
pub fn hex_to_rgb(hex: &str) -> Rgb {
    let hex = hex.trim().trim_start_matches('#');

    let expanded: String = if hex.len() == 3 {
        hex.chars().flat_map(|ch| [ch, ch]).collect()
    } else {
        hex.to_owned()
    };

    if expanded.len() != 6 || !expanded.is_ascii() {
        return Rgb { r: f32::NAN, g: f32::NAN, b: f32::NAN };
    }

    let channel = |range: std::ops::Range<usize>| -> f32 {
        u8::from_str_radix(&expanded[range], 16)
            .map(|value| value as f32 / 255.0)
            .unwrap_or(f32::NAN)
    };

    Rgb { r: channel(0..2), g: channel(2..4), b: channel(4..6) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn canvas_to_pdf_y_is_exact() {
        assert_eq!(canvas_to_pdf_y(100.0, 40.0, 792.0), 652.0);
        assert_eq!(canvas_to_pdf_y(0.0, 0.0, 300.0), 300.0);
        assert_eq!(canvas_to_pdf_y(-10.0, 5.0, 100.0), 105.0);
    }

    #[test]
    fn normalize_denormalize_round_trip() {
        for (x, y, w, h) in [
            (10.0, 20.0, 612.0, 792.0),
            (0.0, 0.0, 200.0, 300.0),
            (611.9, 791.9, 612.0, 792.0),
            (37.5, 12.25, 841.0, 595.0),
        ] {
            let (nx, ny) = normalize_point(x, y, w, h);
            let (rx, ry) = denormalize_point(nx, ny, w, h);
            assert!(approx(rx, x), "x round trip failed for {x}");
            assert!(approx(ry, y), "y round trip failed for {y}");
        }
    }

    #[test]
    fn inverse_of_inverse_is_identity() {
        let m = Matrix { a: 2.0, b: 0.5, c: -0.25, d: 1.5, e: 30.0, f: -12.0 };
        let round_trip = m.invert().invert();
        for (got, want) in [
            (round_trip.a, m.a),
            (round_trip.b, m.b),
            (round_trip.c, m.c),
            (round_trip.d, m.d),
            (round_trip.e, m.e),
            (round_trip.f, m.f),
        ] {
            assert!(approx(got, want));
        }
    }

    #[test]
    fn singular_matrix_inverts_to_identity() {
        let singular = Matrix { a: 1.0, b: 2.0, c: 2.0, d: 4.0, e: 5.0, f: 6.0 };
        assert_eq!(singular.invert(), Matrix::IDENTITY);
    }

    #[test]
    fn inverse_undoes_apply() {
        let m = Matrix { a: 1.5, b: 0.0, c: 0.0, d: -1.5, e: 10.0, f: 792.0 };
        let (tx, ty) = m.apply(100.0, 200.0);
        let (x, y) = m.invert().apply(tx, ty);
        assert!(approx(x, 100.0));
        assert!(approx(y, 200.0));
    }

    #[test]
    fn mapping_without_transform_projects_and_flips() {
        let mapped = map_element_rect(
            Rect::new(61.2, 79.2, 122.4, 79.2),
            Size::new(612.0, 792.0),
            Size::new(306.0, 396.0),
            None,
        );
        assert!(approx(mapped.x, 30.6));
        assert!(approx(mapped.width, 61.2));
        assert!(approx(mapped.height, 39.6));
        // canvas y 79.2 of 792 => page y 39.6 of 396, flipped: 396 - 39.6 - 39.6
        assert!(approx(mapped.y, 316.8));
        assert!(approx(mapped.scale, 0.5));
    }

    #[test]
    fn mapping_with_transform_uses_inverse_bounding_box() {
        // Scale-by-2 viewport: inverse halves coordinates.
        let transform = Matrix { a: 2.0, b: 0.0, c: 0.0, d: 2.0, e: 0.0, f: 0.0 };
        let mapped = map_element_rect(
            Rect::new(100.0, 100.0, 200.0, 50.0),
            Size::new(612.0, 792.0),
            Size::new(612.0, 792.0),
            Some(&transform),
        );
        assert!(approx(mapped.x, 50.0));
        assert!(approx(mapped.y, 50.0));
        assert!(approx(mapped.width, 100.0));
        assert!(approx(mapped.height, 25.0));
        assert!(approx(mapped.scale, 0.5));
    }

    #[test]
    fn degenerate_element_does_not_panic_and_scale_defaults() {
        let transform = Matrix::IDENTITY;
        let mapped = map_element_rect(
            Rect::new(10.0, 10.0, 0.0, 0.0),
            Size::new(612.0, 792.0),
            Size::new(612.0, 792.0),
            Some(&transform),
        );
        assert_eq!(mapped.scale, 1.0);

        let mapped = map_element_rect(
            Rect::new(10.0, 10.0, 50.0, 20.0),
            Size::new(0.0, 0.0),
            Size::new(612.0, 792.0),
            None,
        );
        assert!(mapped.x.is_finite());
        assert_eq!(mapped.scale, 1.0);
    }

    #[test]
    fn rotation_about_center_moves_endpoint() {
        let (x, y) = rotate_about(10.0, 0.0, 0.0, 0.0, 90.0);
        assert!(approx(x, 0.0));
        assert!(approx(y, 10.0));

        let (x, y) = rotate_about(5.0, 5.0, 5.0, 5.0, 270.0);
        assert!(approx(x, 5.0));
        assert!(approx(y, 5.0));
    }

    #[test]
    fn hex_shorthand_and_full_form_agree() {
        let short = hex_to_rgb("#f00");
        let long = hex_to_rgb("#ff0000");
        assert_eq!(short, long);
        assert!(approx(short.r, 1.0));
        assert!(approx(short.g, 0.0));
        assert!(approx(short.b, 0.0));
    }

    #[test]
    fn hex_is_case_insensitive_and_hash_optional() {
        let upper = hex_to_rgb("#FFAA00");
        let lower = hex_to_rgb("ffaa00");
        assert_eq!(upper, lower);
        assert!(upper.is_valid());
    }

    #[test]
    fn malformed_hex_yields_invalid_color() {
        for input in ["", "#12", "#xyzxyz", "#12345", "not-a-color"] {
            let rgb = hex_to_rgb(input);
            assert!(!rgb.is_valid(), "{input:?} should not parse as a color");
        }
    }
}
