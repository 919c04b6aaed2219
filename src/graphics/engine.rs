// ============================================================================
// GRAPHICS ENGINE - applies actions to the layer stack
// ============================================================================
//
// `execute` validates an action, captures the action that reverts it, applies
// the edit and re-renders the touched part of the preview. An action whose
// preconditions fail changes nothing and yields `None`.

use std::sync::Arc;

use crate::bag::{
    BagResult, BagStuffPacker, BagStuffUnpacker, PackableBag, UnpackableBag, require_supported_stuff_version,
};
use crate::canvas::{Canvas, CanvasType, CanvasView};
use crate::cell::{Cell, HBlockMergeCell, SciiCell, SciiColor, VBlockMergeCell};
use crate::components::layers::{BackgroundLayer, CanvasLayer, LayerUid};
use crate::error::IllegalArgument;
use crate::graphics::action::GraphicsAction;
use crate::graphics::renderer;
use crate::logger::Logger;
use crate::ops::region::{CellBox, Crate};
use crate::ops::shapes::{Painter, Shape};

pub const SCREEN_SCII_WIDTH: i32 = 32;
pub const SCREEN_SCII_HEIGHT: i32 = 24;

const SCREEN_BOX: CellBox = CellBox { lx: 0, ly: 0, width: SCREEN_SCII_WIDTH, height: SCREEN_SCII_HEIGHT };

// ============================================================================
// STATE
// ============================================================================

/// The persisted part of the engine: background plus canvas layers, bottom first.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct GraphicsState {
    pub background_layer: BackgroundLayer,
    pub canvas_layers: Vec<CanvasLayer>,
}

impl BagStuffPacker for GraphicsState {
    const PUT_IN_THE_BAG_VERSION: i32 = 1;

    fn put_in_the_bag(&self, bag: &mut PackableBag) {
        bag.put_stuff(&self.background_layer);
        bag.put_list(&self.canvas_layers, |bag, layer| bag.put_stuff(layer));
    }
}

impl BagStuffUnpacker for GraphicsState {
    fn get_out_of_the_bag(version: i32, bag: &mut UnpackableBag) -> BagResult<Self> {
        require_supported_stuff_version("GraphicsEngine", 1, version)?;

        let background_layer = bag.get_stuff()?;
        let canvas_layers = bag.get_list(|bag| bag.get_stuff())?;

        let mut seen = std::collections::HashSet::new();
        if let Some(duplicate) = canvas_layers.iter().find(|layer: &&CanvasLayer| !seen.insert(layer.uid.clone())) {
            return Err(IllegalArgument(format!("Duplicate layer uid={}", duplicate.uid)).into());
        }

        Ok(GraphicsState { background_layer, canvas_layers })
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct GraphicsEngine {
    logger: Arc<dyn Logger>,
    state: GraphicsState,
    preview: Canvas,
}

impl GraphicsEngine {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        let mut engine = Self {
            logger,
            state: GraphicsState::default(),
            preview: Canvas::new(CanvasType::Scii, SCREEN_SCII_WIDTH, SCREEN_SCII_HEIGHT),
        };
        engine.update_preview(SCREEN_BOX);
        engine
    }

    pub fn state(&self) -> &GraphicsState {
        &self.state
    }

    pub fn background_layer(&self) -> &BackgroundLayer {
        &self.state.background_layer
    }

    pub fn canvas_layers(&self) -> &[CanvasLayer] {
        &self.state.canvas_layers
    }

    pub fn canvas_layer(&self, uid: &LayerUid) -> Option<&CanvasLayer> {
        self.layer_index(uid).map(|index| &self.state.canvas_layers[index])
    }

    /// Uid of the layer right below `uid`; the background for the bottom layer.
    pub fn layer_uid_below(&self, uid: &LayerUid) -> Option<LayerUid> {
        self.layer_index(uid).map(|index| self.uid_below(index))
    }

    /// Uid of the layer right above `uid`, if any.
    pub fn layer_uid_above(&self, uid: &LayerUid) -> Option<LayerUid> {
        let index = if uid.is_background() { Some(0) } else { self.layer_index(uid).map(|i| i + 1) }?;
        self.state.canvas_layers.get(index).map(|layer| layer.uid.clone())
    }

    /// The composed screen.
    pub fn preview(&self) -> &Canvas {
        &self.preview
    }

    /// Shared snapshot of the composed screen.
    pub fn preview_view(&mut self) -> CanvasView {
        self.preview.view()
    }

    /// Border color, if the background is visible.
    pub fn border_color(&self) -> SciiColor {
        let background = &self.state.background_layer;
        if background.is_visible { background.border } else { SciiColor::TRANSPARENT }
    }

    /// Swap in a whole document state and redraw the preview.
    pub fn replace_state(&mut self, state: GraphicsState) {
        self.state = state;
        self.update_preview(SCREEN_BOX);
    }

    pub fn can_execute(&self, action: &GraphicsAction) -> bool {
        let background = &self.state.background_layer;

        match action {
            GraphicsAction::SetBackgroundBorder { color } => !background.is_locked && background.border != *color,
            GraphicsAction::SetBackgroundColor { color } => !background.is_locked && background.color != *color,
            GraphicsAction::SetBackgroundBright { light } => !background.is_locked && background.bright != *light,
            GraphicsAction::SetBackgroundVisible { is_visible } => background.is_visible != *is_visible,
            GraphicsAction::SetBackgroundLocked { is_locked } => background.is_locked != *is_locked,
            GraphicsAction::CreateLayer { .. } | GraphicsAction::InsertLayer { .. } => true,
            GraphicsAction::ReplaceLayer { layer } => self.layer_index(&layer.uid).is_some(),
            GraphicsAction::DeleteLayer { layer_uid } => self.unlocked_layer_index(layer_uid).is_some(),
            GraphicsAction::SetLayerVisible { layer_uid, is_visible } => {
                self.canvas_layer(layer_uid).is_some_and(|layer| layer.is_visible != *is_visible)
            }
            GraphicsAction::SetLayerLocked { layer_uid, is_locked } => {
                self.canvas_layer(layer_uid).is_some_and(|layer| layer.is_locked != *is_locked)
            }
            GraphicsAction::SetLayerMasked { layer_uid, is_masked } => {
                self.canvas_layer(layer_uid).is_some_and(|layer| layer.is_masked != *is_masked)
            }
            GraphicsAction::MoveLayer { layer_uid, on_top_of_layer_uid } => {
                self.move_source(layer_uid, on_top_of_layer_uid).is_some()
            }
            GraphicsAction::MergeShape { layer_uid, shape } | GraphicsAction::ReplaceShape { layer_uid, shape } => {
                self.shape_target(layer_uid, shape).is_some()
            }
            GraphicsAction::ReplaceCells { layer_uid, .. } => self.unlocked_layer_index(layer_uid).is_some(),
            GraphicsAction::MergeLayers { layer_uid, onto_layer_uid } => {
                self.merge_sources(layer_uid, onto_layer_uid).is_some()
            }
            GraphicsAction::UndoMergeLayers { replace_layer, .. } => self.layer_index(&replace_layer.uid).is_some(),
            GraphicsAction::ConvertLayer { layer_uid, canvas_type } => {
                self.canvas_layer(layer_uid).is_some_and(|layer| layer.canvas_type() != *canvas_type)
            }
        }
    }

    /// Apply `action`. Returns the action that reverts it, or `None` when the
    /// action is not applicable to the current state.
    pub fn execute(&mut self, action: &GraphicsAction) -> Option<GraphicsAction> {
        self.logger.note("GraphicsEngine.execute:begin", &|| vec![("action", format!("{:?}", action))]);

        let undo_action = if self.can_execute(action) { self.apply(action) } else { None };

        self.logger.note("GraphicsEngine.execute:end", &|| {
            vec![
                ("layers", self.state.canvas_layers.len().to_string()),
                ("undo_action", format!("{:?}", undo_action)),
            ]
        });

        undo_action
    }

    // Preconditions are already checked.
    fn apply(&mut self, action: &GraphicsAction) -> Option<GraphicsAction> {
        match action {
            GraphicsAction::SetBackgroundBorder { color } => {
                let undo = GraphicsAction::SetBackgroundBorder { color: self.state.background_layer.border };
                self.state.background_layer.border = *color;
                Some(undo)
            }
            GraphicsAction::SetBackgroundColor { color } => {
                let undo = GraphicsAction::SetBackgroundColor { color: self.state.background_layer.color };
                self.state.background_layer.color = *color;
                self.update_preview(SCREEN_BOX);
                Some(undo)
            }
            GraphicsAction::SetBackgroundBright { light } => {
                let undo = GraphicsAction::SetBackgroundBright { light: self.state.background_layer.bright };
                self.state.background_layer.bright = *light;
                self.update_preview(SCREEN_BOX);
                Some(undo)
            }
            GraphicsAction::SetBackgroundVisible { is_visible } => {
                let undo = GraphicsAction::SetBackgroundVisible { is_visible: self.state.background_layer.is_visible };
                self.state.background_layer.is_visible = *is_visible;
                self.update_preview(SCREEN_BOX);
                Some(undo)
            }
            GraphicsAction::SetBackgroundLocked { is_locked } => {
                let undo = GraphicsAction::SetBackgroundLocked { is_locked: self.state.background_layer.is_locked };
                self.state.background_layer.is_locked = *is_locked;
                Some(undo)
            }
            GraphicsAction::CreateLayer { canvas_type, layer_uid, on_top_of_layer_uid } => {
                let layer = CanvasLayer::new(
                    layer_uid.clone(),
                    Canvas::new(*canvas_type, SCREEN_SCII_WIDTH, SCREEN_SCII_HEIGHT),
                );
                let index = self.insert_index(on_top_of_layer_uid);
                self.state.canvas_layers.insert(index, layer);
                Some(GraphicsAction::DeleteLayer { layer_uid: layer_uid.clone() })
            }
            GraphicsAction::ReplaceLayer { layer } => {
                let index = self.layer_index(&layer.uid)?;
                let previous = std::mem::replace(&mut self.state.canvas_layers[index], layer.copy_mutable());
                self.update_preview(SCREEN_BOX);
                Some(GraphicsAction::ReplaceLayer { layer: previous })
            }
            GraphicsAction::InsertLayer { layer, on_top_of_layer_uid } => {
                let index = self.insert_index(on_top_of_layer_uid);
                self.state.canvas_layers.insert(index, layer.copy_mutable());
                self.update_preview(SCREEN_BOX);
                Some(GraphicsAction::DeleteLayer { layer_uid: layer.uid.clone() })
            }
            GraphicsAction::DeleteLayer { layer_uid } => {
                let index = self.unlocked_layer_index(layer_uid)?;
                let on_top_of_layer_uid = self.uid_below(index);
                let layer = self.state.canvas_layers.remove(index);
                self.update_preview(SCREEN_BOX);
                Some(GraphicsAction::InsertLayer { layer, on_top_of_layer_uid })
            }
            GraphicsAction::SetLayerVisible { layer_uid, is_visible } => {
                let index = self.layer_index(layer_uid)?;
                let layer = &mut self.state.canvas_layers[index];
                let undo = GraphicsAction::SetLayerVisible { layer_uid: layer.uid.clone(), is_visible: layer.is_visible };
                layer.is_visible = *is_visible;
                self.update_preview(SCREEN_BOX);
                Some(undo)
            }
            GraphicsAction::SetLayerLocked { layer_uid, is_locked } => {
                let index = self.layer_index(layer_uid)?;
                let layer = &mut self.state.canvas_layers[index];
                let undo = GraphicsAction::SetLayerLocked { layer_uid: layer.uid.clone(), is_locked: layer.is_locked };
                layer.is_locked = *is_locked;
                self.update_preview(SCREEN_BOX);
                Some(undo)
            }
            GraphicsAction::SetLayerMasked { layer_uid, is_masked } => {
                let index = self.layer_index(layer_uid)?;
                let layer = &mut self.state.canvas_layers[index];
                let undo = GraphicsAction::SetLayerMasked { layer_uid: layer.uid.clone(), is_masked: layer.is_masked };
                layer.is_masked = *is_masked;
                Some(undo)
            }
            GraphicsAction::MoveLayer { layer_uid, on_top_of_layer_uid } => {
                let (index, undo_on_top_of) = self.move_source(layer_uid, on_top_of_layer_uid)?;
                let layer = self.state.canvas_layers.remove(index);
                let insert_at = self.insert_index(on_top_of_layer_uid);
                self.state.canvas_layers.insert(insert_at, layer);
                self.update_preview(SCREEN_BOX);
                Some(GraphicsAction::MoveLayer { layer_uid: layer_uid.clone(), on_top_of_layer_uid: undo_on_top_of })
            }
            GraphicsAction::MergeShape { layer_uid, shape } => self.paint_shape(layer_uid, shape, false),
            GraphicsAction::ReplaceShape { layer_uid, shape } => self.paint_shape(layer_uid, shape, true),
            GraphicsAction::ReplaceCells { layer_uid, x, y, crate_ } => self.replace_cells(layer_uid, *x, *y, crate_),
            GraphicsAction::MergeLayers { layer_uid, onto_layer_uid } => self.merge_layers(layer_uid, onto_layer_uid),
            GraphicsAction::UndoMergeLayers { insert_layer, insert_on_top_of_layer_uid, replace_layer } => {
                let replace_index = self.layer_index(&replace_layer.uid)?;
                self.state.canvas_layers[replace_index] = replace_layer.copy_mutable();

                let insert_at = self.insert_index(insert_on_top_of_layer_uid);
                self.state.canvas_layers.insert(insert_at, insert_layer.copy_mutable());

                self.update_preview(SCREEN_BOX);
                Some(GraphicsAction::MergeLayers {
                    layer_uid: insert_layer.uid.clone(),
                    onto_layer_uid: replace_layer.uid.clone(),
                })
            }
            GraphicsAction::ConvertLayer { layer_uid, canvas_type } => self.convert_layer(layer_uid, *canvas_type),
        }
    }

    fn paint_shape(&mut self, layer_uid: &LayerUid, shape: &Shape, replace: bool) -> Option<GraphicsAction> {
        let index = self.shape_target(layer_uid, shape)?;
        let layer = &self.state.canvas_layers[index];

        let drawing_box = Painter::bbox(shape);
        let (sx, sy) = layer.canvas.to_scii_position(drawing_box.lx, drawing_box.ly);
        let (ex, ey) = layer.canvas.to_scii_position(drawing_box.rx(), drawing_box.ry());
        let scii_box = CellBox::of_size(sx, sy, ex - sx + 1, ey - sy + 1);

        let undo = GraphicsAction::ReplaceCells {
            layer_uid: layer.uid.clone(),
            x: sx,
            y: sy,
            crate_: Crate::from_canvas_scii(&layer.canvas, scii_box),
        };

        // A masked layer keeps its transparent cells as they were before painting.
        let mut writes: Vec<(i32, i32, Cell)> = Vec::new();
        Painter::paint(shape, |x, y, cell| {
            if layer.is_opaque(x, y) {
                writes.push((x, y, *cell));
            }
        });

        self.state.canvas_layers[index].canvas.mutate(|mutator| {
            for (x, y, cell) in &writes {
                if replace {
                    mutator.replace_drawing_cell(*x, *y, cell);
                } else {
                    mutator.merge_drawing_cell(*x, *y, cell);
                }
            }
        });

        self.update_preview(scii_box);
        Some(undo)
    }

    fn replace_cells(&mut self, layer_uid: &LayerUid, x: i32, y: i32, crate_: &Crate<SciiCell>) -> Option<GraphicsAction> {
        let index = self.unlocked_layer_index(layer_uid)?;
        let area = CellBox::of_size(x, y, crate_.width, crate_.height);
        let layer = &mut self.state.canvas_layers[index];

        let undo = GraphicsAction::ReplaceCells {
            layer_uid: layer.uid.clone(),
            x,
            y,
            crate_: Crate::from_canvas_scii(&layer.canvas, area),
        };

        layer.canvas.mutate(|mutator| {
            for (cy, row) in crate_.cells.iter().enumerate() {
                for (cx, cell) in row.iter().enumerate() {
                    mutator.replace_scii_cell(x + cx as i32, y + cy as i32, cell);
                }
            }
        });

        self.update_preview(area);
        Some(undo)
    }

    fn merge_layers(&mut self, layer_uid: &LayerUid, onto_layer_uid: &LayerUid) -> Option<GraphicsAction> {
        let (index, onto_index) = self.merge_sources(layer_uid, onto_layer_uid)?;
        let layer = &self.state.canvas_layers[index];
        let onto = &self.state.canvas_layers[onto_index];

        let undo = GraphicsAction::UndoMergeLayers {
            insert_layer: layer.clone(),
            insert_on_top_of_layer_uid: self.uid_below(index),
            replace_layer: onto.clone(),
        };

        let width = layer.canvas.scii_width().min(onto.canvas.scii_width());
        let height = layer.canvas.scii_height().min(onto.canvas.scii_height());
        let positions = || (0..height).flat_map(move |y| (0..width).map(move |x| (x, y)));

        let mut merged = onto.copy_mutable();
        let (source, target) = (&layer.canvas, &onto.canvas);

        match source.canvas_type() {
            CanvasType::HBlock => {
                let cells: Vec<(i32, i32, HBlockMergeCell)> = positions()
                    .filter_map(|(x, y)| {
                        let (which, below) = (source.get_hblock_merge_cell(x, y)?, target.get_hblock_merge_cell(x, y)?);
                        Some((x, y, which.merge(&below)))
                    })
                    .collect();
                merged.canvas.mutate(|m| cells.iter().for_each(|(x, y, cell)| m.replace_hblock_merge_cell(*x, *y, cell)));
            }
            CanvasType::VBlock => {
                let cells: Vec<(i32, i32, VBlockMergeCell)> = positions()
                    .filter_map(|(x, y)| {
                        let (which, below) = (source.get_vblock_merge_cell(x, y)?, target.get_vblock_merge_cell(x, y)?);
                        Some((x, y, which.merge(&below)))
                    })
                    .collect();
                merged.canvas.mutate(|m| cells.iter().for_each(|(x, y, cell)| m.replace_vblock_merge_cell(*x, *y, cell)));
            }
            CanvasType::Scii | CanvasType::QBlock => {
                let cells: Vec<(i32, i32, SciiCell)> = positions()
                    .map(|(x, y)| (x, y, source.get_scii_cell(x, y).merge(&target.get_scii_cell(x, y))))
                    .collect();
                merged.canvas.mutate(|m| cells.iter().for_each(|(x, y, cell)| m.replace_scii_cell(*x, *y, cell)));
            }
        }

        self.state.canvas_layers[onto_index] = merged;
        self.state.canvas_layers.remove(index);

        self.update_preview(SCREEN_BOX);
        Some(undo)
    }

    fn convert_layer(&mut self, layer_uid: &LayerUid, canvas_type: CanvasType) -> Option<GraphicsAction> {
        let index = self.layer_index(layer_uid)?;
        let layer = &self.state.canvas_layers[index];
        let source = &layer.canvas;

        let mut canvas =
            Canvas::create(canvas_type, source.scii_width(), source.scii_height(), Some(source.mutations()));
        canvas.mutate(|mutator| {
            for y in 0..source.scii_height() {
                for x in 0..source.scii_width() {
                    mutator.replace_scii_cell(x, y, &source.get_scii_cell(x, y));
                }
            }
        });

        let converted = CanvasLayer { canvas, ..layer.clone() };
        let previous = std::mem::replace(&mut self.state.canvas_layers[index], converted);

        self.update_preview(SCREEN_BOX);
        Some(GraphicsAction::ReplaceLayer { layer: previous })
    }

    fn update_preview(&mut self, area: CellBox) {
        renderer::render(&mut self.preview, &self.state.background_layer, &self.state.canvas_layers, area);
    }

    fn layer_index(&self, uid: &LayerUid) -> Option<usize> {
        self.state.canvas_layers.iter().position(|layer| layer.uid == *uid)
    }

    fn unlocked_layer_index(&self, uid: &LayerUid) -> Option<usize> {
        self.layer_index(uid).filter(|&index| !self.state.canvas_layers[index].is_locked)
    }

    /// Insert position for a layer going right above `on_top_of` (the bottom for the background).
    fn insert_index(&self, on_top_of: &LayerUid) -> usize {
        if on_top_of.is_background() {
            0
        } else {
            self.layer_index(on_top_of).map_or(0, |index| index + 1)
        }
    }

    fn uid_below(&self, index: usize) -> LayerUid {
        if index > 0 { self.state.canvas_layers[index - 1].uid.clone() } else { LayerUid::background() }
    }

    fn move_source(&self, layer_uid: &LayerUid, on_top_of: &LayerUid) -> Option<(usize, LayerUid)> {
        let index = self.layer_index(layer_uid)?;
        if layer_uid == on_top_of {
            return None;
        }

        let below = self.uid_below(index);
        if below == *on_top_of { None } else { Some((index, below)) }
    }

    fn shape_target(&self, layer_uid: &LayerUid, shape: &Shape) -> Option<usize> {
        self.unlocked_layer_index(layer_uid)
            .filter(|&index| self.state.canvas_layers[index].canvas.cell_type() == shape.cell_type())
    }

    fn merge_sources(&self, layer_uid: &LayerUid, onto_layer_uid: &LayerUid) -> Option<(usize, usize)> {
        let index = self.unlocked_layer_index(layer_uid)?;
        let onto_index = self.unlocked_layer_index(onto_layer_uid)?;

        let same_type = self.state.canvas_layers[index].canvas_type() == self.state.canvas_layers[onto_index].canvas_type();
        if index != onto_index && same_type { Some((index, onto_index)) } else { None }
    }
}

impl BagStuffPacker for GraphicsEngine {
    const PUT_IN_THE_BAG_VERSION: i32 = GraphicsState::PUT_IN_THE_BAG_VERSION;

    fn put_in_the_bag(&self, bag: &mut PackableBag) {
        self.state.put_in_the_bag(bag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::{BagFormat, pack_stuff, unpack_stuff};
    use crate::cell::{BlockCell, SciiChar, SciiLight};
    use crate::logger::{MemoryLogger, NoopLogger};

    fn engine() -> GraphicsEngine {
        GraphicsEngine::new(Arc::new(NoopLogger))
    }

    fn uid(value: &str) -> LayerUid {
        LayerUid::new(value)
    }

    fn create(engine: &mut GraphicsEngine, value: &str, canvas_type: CanvasType, on_top_of: LayerUid) {
        let action = GraphicsAction::CreateLayer { canvas_type, layer_uid: uid(value), on_top_of_layer_uid: on_top_of };
        assert!(engine.execute(&action).is_some());
    }

    fn order(engine: &GraphicsEngine) -> Vec<&str> {
        engine.canvas_layers().iter().map(|layer| layer.uid.as_str()).collect()
    }

    fn block(color: SciiColor) -> Cell {
        Cell::Block(BlockCell::new(color, SciiLight::OFF))
    }

    fn letter(code: i32) -> SciiCell {
        SciiCell::new(SciiChar(code), SciiColor::WHITE, SciiColor::BLACK, SciiLight::OFF, SciiLight::OFF)
    }

    /// Execute, then revert, and check the state is back where it started.
    fn assert_reverts(engine: &mut GraphicsEngine, action: GraphicsAction) -> GraphicsAction {
        let before = engine.state().clone();
        let undo = engine.execute(&action).expect("action should apply");
        assert_ne!(engine.state(), &before, "{:?} changed nothing", action);
        assert!(engine.execute(&undo).is_some());
        assert_eq!(engine.state(), &before, "{:?} was not reverted by {:?}", action, undo);
        undo
    }

    #[test]
    fn new_layers_go_above_their_anchor() {
        let mut engine = engine();
        create(&mut engine, "a", CanvasType::Scii, LayerUid::background());
        create(&mut engine, "b", CanvasType::Scii, uid("a"));
        create(&mut engine, "c", CanvasType::Scii, LayerUid::background());
        create(&mut engine, "d", CanvasType::Scii, uid("missing"));

        assert_eq!(order(&engine), vec!["d", "c", "a", "b"]);
        assert_eq!(engine.canvas_layer(&uid("a")).map(|l| l.canvas.scii_width()), Some(SCREEN_SCII_WIDTH));
    }

    #[test]
    fn background_setters_respect_lock_and_change() {
        let mut engine = engine();
        let set_color = GraphicsAction::SetBackgroundColor { color: SciiColor::RED };

        assert_eq!(engine.execute(&set_color), Some(GraphicsAction::SetBackgroundColor { color: SciiColor::TRANSPARENT }));
        assert_eq!(engine.execute(&set_color), None);
        assert_eq!(engine.preview().get_scii_cell(5, 5).paper, SciiColor::RED);

        engine.execute(&GraphicsAction::SetBackgroundLocked { is_locked: true });
        assert!(!engine.can_execute(&GraphicsAction::SetBackgroundBorder { color: SciiColor::BLUE }));
        assert!(engine.can_execute(&GraphicsAction::SetBackgroundVisible { is_visible: false }));
    }

    #[test]
    fn border_does_not_touch_the_preview() {
        let mut engine = engine();
        let before = engine.preview_view();
        engine.execute(&GraphicsAction::SetBackgroundBorder { color: SciiColor::BLUE });
        assert!(engine.preview_view().ptr_eq(&before));
        assert_eq!(engine.border_color(), SciiColor::BLUE);
    }

    #[test]
    fn delete_reverts_to_the_same_position() {
        let mut engine = engine();
        create(&mut engine, "a", CanvasType::Scii, LayerUid::background());
        create(&mut engine, "b", CanvasType::HBlock, uid("a"));
        create(&mut engine, "c", CanvasType::Scii, uid("b"));

        let undo = assert_reverts(&mut engine, GraphicsAction::DeleteLayer { layer_uid: uid("b") });
        assert!(matches!(undo, GraphicsAction::InsertLayer { ref on_top_of_layer_uid, .. } if on_top_of_layer_uid == &uid("a")));
        assert_eq!(order(&engine), vec!["a", "b", "c"]);
    }

    #[test]
    fn locked_layers_reject_edits() {
        let mut engine = engine();
        create(&mut engine, "a", CanvasType::Scii, LayerUid::background());
        engine.execute(&GraphicsAction::SetLayerLocked { layer_uid: uid("a"), is_locked: true });

        let shape = Shape::FillBox { sx: 0, sy: 0, ex: 1, ey: 1, cell: Cell::Scii(letter(65)) };
        assert_eq!(engine.execute(&GraphicsAction::DeleteLayer { layer_uid: uid("a") }), None);
        assert_eq!(engine.execute(&GraphicsAction::MergeShape { layer_uid: uid("a"), shape }), None);
        assert!(engine.can_execute(&GraphicsAction::SetLayerVisible { layer_uid: uid("a"), is_visible: false }));
    }

    #[test]
    fn move_rejects_noops() {
        let mut engine = engine();
        create(&mut engine, "a", CanvasType::Scii, LayerUid::background());
        create(&mut engine, "b", CanvasType::Scii, uid("a"));

        assert!(!engine.can_execute(&GraphicsAction::MoveLayer { layer_uid: uid("b"), on_top_of_layer_uid: uid("b") }));
        assert!(!engine.can_execute(&GraphicsAction::MoveLayer { layer_uid: uid("b"), on_top_of_layer_uid: uid("a") }));

        let undo = assert_reverts(
            &mut engine,
            GraphicsAction::MoveLayer { layer_uid: uid("b"), on_top_of_layer_uid: LayerUid::background() },
        );
        assert_eq!(undo, GraphicsAction::MoveLayer { layer_uid: uid("b"), on_top_of_layer_uid: uid("a") });
    }

    #[test]
    fn shape_undo_restores_the_painted_area() {
        let mut engine = engine();
        create(&mut engine, "a", CanvasType::QBlock, LayerUid::background());

        let shape = Shape::Line { sx: 0, sy: 0, ex: 5, ey: 3, cell: block(SciiColor::YELLOW) };
        let undo = assert_reverts(&mut engine, GraphicsAction::MergeShape { layer_uid: uid("a"), shape: shape.clone() });

        // Drawing box 6x4 covers 3x2 SCII cells on a QBlock canvas.
        let GraphicsAction::ReplaceCells { x, y, crate_, .. } = undo else {
            panic!("unexpected undo action");
        };
        assert_eq!((x, y, crate_.width, crate_.height), (0, 0, 3, 2));

        let wrong_type = Shape::Line { sx: 0, sy: 0, ex: 1, ey: 1, cell: Cell::Scii(letter(65)) };
        assert!(!engine.can_execute(&GraphicsAction::ReplaceShape { layer_uid: uid("a"), shape: wrong_type }));
    }

    #[test]
    fn painting_updates_the_preview() {
        let mut engine = engine();
        create(&mut engine, "a", CanvasType::Scii, LayerUid::background());

        let shape = Shape::FillBox { sx: 2, sy: 3, ex: 2, ey: 3, cell: Cell::Scii(letter(72)) };
        engine.execute(&GraphicsAction::ReplaceShape { layer_uid: uid("a"), shape });
        assert_eq!(engine.preview().get_scii_cell(2, 3).character, SciiChar(72));

        engine.execute(&GraphicsAction::SetLayerVisible { layer_uid: uid("a"), is_visible: false });
        assert!(engine.preview().get_scii_cell(2, 3).is_transparent());
    }

    #[test]
    fn locking_a_layer_takes_it_out_of_the_preview() {
        let mut engine = engine();
        create(&mut engine, "a", CanvasType::Scii, LayerUid::background());
        let shape = Shape::FillBox { sx: 2, sy: 3, ex: 2, ey: 3, cell: Cell::Scii(letter(72)) };
        engine.execute(&GraphicsAction::ReplaceShape { layer_uid: uid("a"), shape });

        let undo = engine.execute(&GraphicsAction::SetLayerLocked { layer_uid: uid("a"), is_locked: true }).unwrap();
        assert!(engine.preview().get_scii_cell(2, 3).is_transparent());

        engine.execute(&undo);
        assert_eq!(engine.preview().get_scii_cell(2, 3).character, SciiChar(72));
    }

    #[test]
    fn masked_layers_only_repaint_opaque_cells() {
        let mut engine = engine();
        create(&mut engine, "a", CanvasType::HBlock, LayerUid::background());
        let dot = Shape::FillBox { sx: 1, sy: 1, ex: 1, ey: 1, cell: block(SciiColor::RED) };
        engine.execute(&GraphicsAction::ReplaceShape { layer_uid: uid("a"), shape: dot });
        engine.execute(&GraphicsAction::SetLayerMasked { layer_uid: uid("a"), is_masked: true });

        let fill = Shape::FillBox { sx: 0, sy: 0, ex: 3, ey: 3, cell: block(SciiColor::GREEN) };
        engine.execute(&GraphicsAction::ReplaceShape { layer_uid: uid("a"), shape: fill });

        let canvas = &engine.canvas_layer(&uid("a")).expect("layer").canvas;
        assert_eq!(canvas.get_drawing_cell(1, 1), block(SciiColor::GREEN));
        assert!(canvas.get_drawing_cell(0, 0).is_transparent());
    }

    #[test]
    fn replace_cells_reverts() {
        let mut engine = engine();
        create(&mut engine, "a", CanvasType::Scii, LayerUid::background());

        let crate_ = Crate { canvas_type: CanvasType::Scii, width: 2, height: 1, cells: vec![vec![letter(65), letter(66)]] };
        let undo = assert_reverts(&mut engine, GraphicsAction::ReplaceCells { layer_uid: uid("a"), x: 30, y: 23, crate_ });

        let GraphicsAction::ReplaceCells { crate_, .. } = undo else {
            panic!("unexpected undo action");
        };
        assert_eq!(crate_.cells, vec![vec![SciiCell::TRANSPARENT, SciiCell::TRANSPARENT]]);
    }

    #[test]
    fn merging_hblock_layers_combines_halves_and_reverts() {
        let mut engine = engine();
        create(&mut engine, "lower", CanvasType::HBlock, LayerUid::background());
        create(&mut engine, "upper", CanvasType::HBlock, uid("lower"));

        let top = Shape::FillBox { sx: 0, sy: 0, ex: 0, ey: 0, cell: block(SciiColor::RED) };
        let bottom = Shape::FillBox { sx: 0, sy: 1, ex: 0, ey: 1, cell: block(SciiColor::BLUE) };
        engine.execute(&GraphicsAction::ReplaceShape { layer_uid: uid("upper"), shape: top });
        engine.execute(&GraphicsAction::ReplaceShape { layer_uid: uid("lower"), shape: bottom });
        let preview_before = engine.preview().get_scii_cell(0, 0);

        let merge = GraphicsAction::MergeLayers { layer_uid: uid("upper"), onto_layer_uid: uid("lower") };
        let state_before = engine.state().clone();
        let undo = engine.execute(&merge).expect("merge applies");

        assert_eq!(order(&engine), vec!["lower"]);
        let merged = &engine.canvas_layer(&uid("lower")).expect("layer").canvas;
        assert_eq!(merged.get_drawing_cell(0, 0), block(SciiColor::RED));
        assert_eq!(merged.get_drawing_cell(0, 1), block(SciiColor::BLUE));
        assert_eq!(engine.preview().get_scii_cell(0, 0), preview_before);

        assert_eq!(engine.execute(&undo), Some(merge));
        assert_eq!(engine.state(), &state_before);
    }

    #[test]
    fn merge_needs_equal_types() {
        let mut engine = engine();
        create(&mut engine, "a", CanvasType::HBlock, LayerUid::background());
        create(&mut engine, "b", CanvasType::VBlock, uid("a"));
        assert!(!engine.can_execute(&GraphicsAction::MergeLayers { layer_uid: uid("b"), onto_layer_uid: uid("a") }));
        assert!(!engine.can_execute(&GraphicsAction::MergeLayers { layer_uid: uid("a"), onto_layer_uid: uid("a") }));
    }

    #[test]
    fn convert_keeps_the_look_and_flags() {
        let mut engine = engine();
        create(&mut engine, "a", CanvasType::Scii, LayerUid::background());
        let cell = SciiCell::new(SciiChar(0x83), SciiColor::RED, SciiColor::BLUE, SciiLight::ON, SciiLight::TRANSPARENT);
        let crate_ = Crate { canvas_type: CanvasType::Scii, width: 1, height: 1, cells: vec![vec![cell]] };
        engine.execute(&GraphicsAction::ReplaceCells { layer_uid: uid("a"), x: 0, y: 0, crate_ });
        engine.execute(&GraphicsAction::SetLayerMasked { layer_uid: uid("a"), is_masked: true });

        let convert = GraphicsAction::ConvertLayer { layer_uid: uid("a"), canvas_type: CanvasType::HBlock };
        let undo = assert_reverts(&mut engine, convert.clone());
        assert!(matches!(undo, GraphicsAction::ReplaceLayer { .. }));

        engine.execute(&convert);
        let layer = engine.canvas_layer(&uid("a")).expect("layer");
        assert_eq!(layer.canvas_type(), CanvasType::HBlock);
        assert!(layer.is_masked);
        assert_eq!(layer.canvas.get_scii_cell(0, 0), cell);
        assert!(!engine.can_execute(&convert));
    }

    #[test]
    fn execute_logs_begin_and_end() {
        let logger = Arc::new(MemoryLogger::default());
        let mut engine = GraphicsEngine::new(logger.clone());
        engine.execute(&GraphicsAction::SetBackgroundBright { light: SciiLight::ON });

        let messages: Vec<String> = logger.entries().into_iter().map(|(_, message, _)| message).collect();
        assert_eq!(messages, vec!["GraphicsEngine.execute:begin", "GraphicsEngine.execute:end"]);
    }

    #[test]
    fn state_survives_the_bag() {
        let mut engine = engine();
        create(&mut engine, "a", CanvasType::VBlock, LayerUid::background());
        engine.execute(&GraphicsAction::SetBackgroundColor { color: SciiColor::MAGENTA });

        for format in [BagFormat::Legacy, BagFormat::Bitstream] {
            let restored: GraphicsState = unpack_stuff(&pack_stuff(&engine, format)).unwrap();
            assert_eq!(&restored, engine.state());
        }
    }

    #[test]
    fn duplicate_uids_are_rejected() {
        let layer = CanvasLayer::new(uid("a"), Canvas::new(CanvasType::Scii, 1, 1));
        let state = GraphicsState { background_layer: BackgroundLayer::default(), canvas_layers: vec![layer.clone(), layer] };
        assert!(unpack_stuff::<GraphicsState>(&pack_stuff(&state, BagFormat::Bitstream)).is_err());
    }
}
