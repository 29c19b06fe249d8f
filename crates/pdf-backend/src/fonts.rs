//! Metrics for the standard fonts used by the overlay renderer.
//!
//! Width tables are the AFM advance widths for the printable ASCII range,
//! in 1/1000 em units. They exist so text can be right/center-aligned
//! without embedding font programs.

use crate::StandardFont;

/// Advance widths for Helvetica, character codes 32..=126.
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, //
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, //
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, //
    222, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, //
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

/// Advance widths for Helvetica-Bold, character codes 32..=126.
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, //
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, //
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, //
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, //
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

/// Fallback advance for characters outside the table (non-ASCII is
/// approximated by the most common Helvetica glyph width).
const DEFAULT_WIDTH: u16 = 556;

fn glyph_width(font: StandardFont, ch: char) -> u16 {
    let table = match font {
        StandardFont::Helvetica => &HELVETICA,
        StandardFont::HelveticaBold => &HELVETICA_BOLD,
    };

    let code = ch as u32;
    if (32..=126).contains(&code) {
        table[(code - 32) as usize]
    } else {
        DEFAULT_WIDTH
    }
}

/// Width of `text` drawn in `font` at `size` points, single line.
pub fn text_width(font: StandardFont, text: &str, size: f32) -> f32 {
    let units: u32 = text.chars().map(|ch| u32::from(glyph_width(font, ch))).sum();
    units as f32 / 1000.0 * size
}
