// ============================================================================
// MERGER - occlusion rules for channels and cells
// ============================================================================
//
// `merge(which, onto)` keeps an opaque `which`, shows `onto` through a
// transparent `which`, and clears the channel when `which` is force-transparent.

use crate::cell::{BlockCell, SciiCell, SciiChar, SciiColor, SciiLight};

#[inline]
fn merge_value(which: i32, onto: i32) -> i32 {
    const TRANSPARENT: i32 = -1;
    const FORCE_TRANSPARENT: i32 = -2;

    match which {
        FORCE_TRANSPARENT => TRANSPARENT,
        TRANSPARENT => onto,
        _ => which,
    }
}

#[inline]
fn normalize_value(value: i32) -> i32 {
    if value < 0 { -1 } else { value }
}

pub fn merge_color(which: SciiColor, onto: SciiColor) -> SciiColor {
    SciiColor(merge_value(which.0, onto.0))
}

pub fn merge_light(which: SciiLight, onto: SciiLight) -> SciiLight {
    SciiLight(merge_value(which.0, onto.0))
}

pub fn merge_char(which: SciiChar, onto: SciiChar) -> SciiChar {
    SciiChar(merge_value(which.0, onto.0))
}

/// Rewrite every force-transparent channel to plain transparent.
pub fn normalize_scii_cell(cell: &SciiCell) -> SciiCell {
    SciiCell {
        character: SciiChar(normalize_value(cell.character.0)),
        ink: SciiColor(normalize_value(cell.ink.0)),
        paper: SciiColor(normalize_value(cell.paper.0)),
        bright: SciiLight(normalize_value(cell.bright.0)),
        flash: SciiLight(normalize_value(cell.flash.0)),
    }
}

pub fn normalize_block_cell(cell: &BlockCell) -> BlockCell {
    BlockCell { color: SciiColor(normalize_value(cell.color.0)), bright: SciiLight(normalize_value(cell.bright.0)) }
}

/// Bright is merged against `fallback_bright` instead of `onto.bright`, so a
/// canvas can merge against the bright shared by a pair or quad of sub-cells.
pub fn merge_block_cell(which: &BlockCell, onto: &BlockCell, fallback_bright: SciiLight) -> BlockCell {
    BlockCell { color: merge_color(which.color, onto.color), bright: merge_light(which.bright, fallback_bright) }
}

/// Quadrant order used both for reading glyph bits and for picking the ink
/// color when two colors remain: TR, TL, BR, BL.
const QUADRANT_BITS: [i32; 4] = [SciiChar::BLOCK_BIT_TR, SciiChar::BLOCK_BIT_TL, SciiChar::BLOCK_BIT_BR, SciiChar::BLOCK_BIT_BL];

fn quadrant_colors(cell: &SciiCell) -> [SciiColor; 4] {
    let bits = cell.character.block_bits();
    QUADRANT_BITS.map(|bit| if bits & bit != 0 { cell.ink } else { cell.paper })
}

fn merge_components(which: &SciiCell, onto: &SciiCell) -> SciiCell {
    SciiCell {
        character: merge_char(which.character, onto.character),
        ink: merge_color(which.ink, onto.ink),
        paper: merge_color(which.paper, onto.paper),
        bright: merge_light(which.bright, onto.bright),
        flash: merge_light(which.flash, onto.flash),
    }
}

/// Place `which` over `onto`.
///
/// When both cells hold block glyphs, each is expanded into four quadrant
/// colors, the quadrants are merged one by one and the result is reduced back
/// to a glyph: one distinct color gives a block space (or the transparent cell
/// when that color is transparent), two distinct colors give a glyph whose set
/// bits mark the quadrants of the first color met in TR, TL, BR, BL order.
/// Anything else falls back to a channel-wise merge. Bright and flash are
/// always merged channel-wise.
pub fn merge_scii_cell(which: &SciiCell, onto: &SciiCell) -> SciiCell {
    if which.character == SciiChar::FORCE_TRANSPARENT {
        return SciiCell::TRANSPARENT;
    }

    if which.character.is_transparent() && onto.character.is_transparent() {
        return SciiCell::TRANSPARENT;
    }

    if !which.character.is_block() || !onto.character.is_block() {
        return merge_components(which, onto);
    }

    let which_quadrants = quadrant_colors(which);
    let onto_quadrants = quadrant_colors(onto);

    let mut merged = [SciiColor::TRANSPARENT; 4];
    for i in 0..4 {
        merged[i] = merge_color(which_quadrants[i], onto_quadrants[i]);
    }

    let mut distinct: Vec<SciiColor> = Vec::with_capacity(4);
    for color in merged {
        if !distinct.contains(&color) {
            distinct.push(color);
        }
    }

    let bright = merge_light(which.bright, onto.bright);
    let flash = merge_light(which.flash, onto.flash);

    match distinct.as_slice() {
        [color] if color.is_transparent() => SciiCell::TRANSPARENT,
        [color] => SciiCell { character: SciiChar::BLOCK_SPACE, ink: *color, paper: *color, bright, flash },
        [ink, paper] => {
            let bits = QUADRANT_BITS
                .iter()
                .zip(merged.iter())
                .filter(|(_, color)| *color == ink)
                .fold(0, |acc, (bit, _)| acc | bit);

            SciiCell {
                character: SciiChar(SciiChar::BLOCK_VALUE_FIRST | bits),
                ink: *ink,
                paper: *paper,
                bright,
                flash,
            }
        }
        _ => merge_components(which, onto),
    }
}
