// ============================================================================
// RENDERER - composite the layer stack into one SCII canvas
// ============================================================================
//
// Visible, unlocked layers are walked bottom to top in runs of the same merge kind.
// SCII and QBlock layers merge as finished SCII cells. Consecutive HBlock (or
// VBlock) layers are first merged half by half and only then reduced to one
// SCII cell, so two half-block layers can share a glyph.

use crate::canvas::{Canvas, CanvasType};
use crate::cell::{HBlockMergeCell, SciiCell, VBlockMergeCell};
use crate::components::layers::{BackgroundLayer, CanvasLayer};
use crate::ops::region::CellBox;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MergeKind {
    Scii,
    HBlock,
    VBlock,
}

impl MergeKind {
    fn of(canvas_type: CanvasType) -> Self {
        match canvas_type {
            CanvasType::Scii | CanvasType::QBlock => MergeKind::Scii,
            CanvasType::HBlock => MergeKind::HBlock,
            CanvasType::VBlock => MergeKind::VBlock,
        }
    }
}

struct MergeGroup<'a> {
    kind: MergeKind,
    canvases: Vec<&'a Canvas>,
}

fn group_layers(layers: &[CanvasLayer]) -> Vec<MergeGroup<'_>> {
    let mut groups: Vec<MergeGroup<'_>> = Vec::new();

    for layer in layers.iter().filter(|layer| layer.is_visible && !layer.is_locked) {
        let kind = MergeKind::of(layer.canvas_type());

        match groups.last_mut() {
            Some(group) if group.kind == kind => group.canvases.push(&layer.canvas),
            _ => groups.push(MergeGroup { kind, canvases: vec![&layer.canvas] }),
        }
    }

    groups
}

fn merge_cell(background: SciiCell, groups: &[MergeGroup<'_>], x: i32, y: i32) -> SciiCell {
    let mut result = background;

    for group in groups {
        result = match group.kind {
            MergeKind::Scii => group.canvases.iter().fold(result, |acc, canvas| canvas.get_scii_cell(x, y).merge(&acc)),
            MergeKind::HBlock => group
                .canvases
                .iter()
                .filter_map(|canvas| canvas.get_hblock_merge_cell(x, y))
                .fold(HBlockMergeCell::TRANSPARENT, |acc, cell| cell.merge(&acc))
                .to_scii_cell()
                .merge(&result),
            MergeKind::VBlock => group
                .canvases
                .iter()
                .filter_map(|canvas| canvas.get_vblock_merge_cell(x, y))
                .fold(VBlockMergeCell::TRANSPARENT, |acc, cell| cell.merge(&acc))
                .to_scii_cell()
                .merge(&result),
        };
    }

    result
}

/// The displayed cell of the whole document at one SCII position.
pub fn compose_cell(background: &BackgroundLayer, layers: &[CanvasLayer], x: i32, y: i32) -> SciiCell {
    let background_cell = if background.is_visible { background.scii_cell() } else { SciiCell::TRANSPARENT };
    merge_cell(background_cell, &group_layers(layers), x, y)
}

/// Re-render `area` of `destination` from the background and `layers` (bottom first).
/// Hidden and locked layers take no part.
pub fn render(destination: &mut Canvas, background: &BackgroundLayer, layers: &[CanvasLayer], area: CellBox) {
    if area.is_empty() {
        return;
    }

    let background_cell = if background.is_visible { background.scii_cell() } else { SciiCell::TRANSPARENT };
    let groups = group_layers(layers);

    destination.mutate(|mutator| {
        for y in area.ly..=area.ry() {
            for x in area.lx..=area.rx() {
                mutator.replace_scii_cell(x, y, &merge_cell(background_cell, &groups, x, y));
            }
        }
    });
}
