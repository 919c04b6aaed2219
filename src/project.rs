use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crate::bag::{
    BagFormat, BagResult, BagStuffPacker, PackableBag, UnpackableBag, require_supported_stuff_version,
};
use crate::canvas::CanvasType;
use crate::cell::{Cell, SciiCell, SciiColor, SciiLight};
use crate::components::history::{DEFAULT_MAX_STEPS, History, HistoryAction, HistoryStep};
use crate::components::layers::{CanvasLayer, LayerUid, UidFactory, UuidFactory};
use crate::components::palette::Palette;
use crate::graphics::action::{GraphicsAction, GraphicsActionPair};
use crate::graphics::engine::{GraphicsEngine, GraphicsState};
use crate::logger::Logger;
use crate::ops::region::{CellBox, Crate, TransformType};
use crate::ops::shapes::Shape;

const PROJECT_VERSION: i32 = 1;

/// Single open document.
pub struct Project {
    pub id: Uuid,
    /// `None` for unsaved/untitled files.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,

    /// Display name (derived from path or "Untitled-X")
    pub name: String,

    pub palette: Palette,
    current_layer_uid: LayerUid,
    history: History,
    engine: GraphicsEngine,
    uid_factory: Box<dyn UidFactory>,
}

impl Project {
    pub fn new_untitled(untitled_counter: usize, logger: Arc<dyn Logger>) -> Self {
        Self::with_uid_factory(format!("Untitled-{}", untitled_counter), logger, Box::new(UuidFactory))
    }

    pub fn with_uid_factory(name: String, logger: Arc<dyn Logger>, uid_factory: Box<dyn UidFactory>) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: None,
            is_dirty: false,
            name,
            palette: Palette::default(),
            current_layer_uid: LayerUid::background(),
            history: History::new(DEFAULT_MAX_STEPS),
            engine: GraphicsEngine::new(logger),
            uid_factory,
        }
    }

    pub fn set_history_max_steps(&mut self, max_steps: usize) {
        let steps = self.history.steps().cloned().collect();
        self.history = History::from_steps(steps, self.history.position(), max_steps);
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    pub fn update_name_from_path(&mut self) {
        if let Some(ref path) = self.path {
            self.name = path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Unknown".to_string());
        }
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty { format!("{}*", self.name) } else { self.name.clone() }
    }

    pub fn engine(&self) -> &GraphicsEngine {
        &self.engine
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn current_layer_uid(&self) -> &LayerUid {
        &self.current_layer_uid
    }

    /// The selected canvas layer, or `None` while the background is selected.
    pub fn current_canvas_layer(&self) -> Option<&CanvasLayer> {
        self.engine.canvas_layer(&self.current_layer_uid)
    }

    /// Select a layer. Unknown uids select the background. Not recorded in history.
    pub fn select_layer(&mut self, uid: &LayerUid) -> bool {
        let uid = self.resolve_layer(uid);
        if uid == self.current_layer_uid {
            return false;
        }

        self.current_layer_uid = uid;
        true
    }

    // ========================================================================
    // BACKGROUND
    // ========================================================================

    pub fn set_background_border(&mut self, color: SciiColor) -> bool {
        self.execute_recorded(GraphicsAction::SetBackgroundBorder { color })
    }

    pub fn set_background_color(&mut self, color: SciiColor) -> bool {
        self.execute_recorded(GraphicsAction::SetBackgroundColor { color })
    }

    pub fn set_background_bright(&mut self, light: SciiLight) -> bool {
        self.execute_recorded(GraphicsAction::SetBackgroundBright { light })
    }

    // ========================================================================
    // LAYERS
    // ========================================================================

    /// Show or hide a layer; the background uid targets the background.
    pub fn set_layer_visible(&mut self, uid: &LayerUid, is_visible: bool) -> bool {
        let action = if uid.is_background() {
            GraphicsAction::SetBackgroundVisible { is_visible }
        } else {
            GraphicsAction::SetLayerVisible { layer_uid: uid.clone(), is_visible }
        };
        self.execute_recorded(action)
    }

    pub fn set_layer_locked(&mut self, uid: &LayerUid, is_locked: bool) -> bool {
        let action = if uid.is_background() {
            GraphicsAction::SetBackgroundLocked { is_locked }
        } else {
            GraphicsAction::SetLayerLocked { layer_uid: uid.clone(), is_locked }
        };
        self.execute_recorded(action)
    }

    pub fn set_layer_masked(&mut self, uid: &LayerUid, is_masked: bool) -> bool {
        self.execute_recorded(GraphicsAction::SetLayerMasked { layer_uid: uid.clone(), is_masked })
    }

    /// Create a layer right above the current one and select it.
    pub fn create_layer(&mut self, canvas_type: CanvasType) -> Option<LayerUid> {
        let layer_uid = LayerUid(self.uid_factory.create_uid());
        let action = GraphicsAction::CreateLayer {
            canvas_type,
            layer_uid: layer_uid.clone(),
            on_top_of_layer_uid: self.current_layer_uid.clone(),
        };

        self.execute_selecting(action, layer_uid.clone())?;
        Some(layer_uid)
    }

    /// Delete the current layer and select the one below it.
    pub fn delete_current_layer(&mut self) -> bool {
        let Some(below) = self.engine.layer_uid_below(&self.current_layer_uid) else {
            return false;
        };

        let action = GraphicsAction::DeleteLayer { layer_uid: self.current_layer_uid.clone() };
        self.execute_selecting(action, below).is_some()
    }

    pub fn move_current_layer_up(&mut self) -> bool {
        let Some(above) = self.engine.layer_uid_above(&self.current_layer_uid) else {
            return false;
        };
        if self.current_layer_uid.is_background() {
            return false;
        }

        self.execute_recorded(GraphicsAction::MoveLayer { layer_uid: self.current_layer_uid.clone(), on_top_of_layer_uid: above })
    }

    pub fn move_current_layer_down(&mut self) -> bool {
        let Some(below) = self.engine.layer_uid_below(&self.current_layer_uid) else {
            return false;
        };
        let Some(below_below) = self.engine.layer_uid_below(&below) else {
            return false;
        };

        self.execute_recorded(GraphicsAction::MoveLayer {
            layer_uid: self.current_layer_uid.clone(),
            on_top_of_layer_uid: below_below,
        })
    }

    /// Merge the current layer onto the canvas layer below it and select the result.
    pub fn merge_current_layer_down(&mut self) -> bool {
        let Some(below) = self.engine.layer_uid_below(&self.current_layer_uid) else {
            return false;
        };
        if below.is_background() {
            return false;
        }

        let action = GraphicsAction::MergeLayers { layer_uid: self.current_layer_uid.clone(), onto_layer_uid: below.clone() };
        self.execute_selecting(action, below).is_some()
    }

    pub fn convert_current_layer(&mut self, canvas_type: CanvasType) -> bool {
        self.execute_recorded(GraphicsAction::ConvertLayer { layer_uid: self.current_layer_uid.clone(), canvas_type })
    }

    // ========================================================================
    // PAINTING
    // ========================================================================

    /// Cell the paint tool writes on the current layer.
    pub fn paint_cell(&self) -> Option<Cell> {
        self.current_canvas_layer().map(|layer| self.palette.make_paint_cell(layer.canvas_type()))
    }

    /// Cell the eraser writes on the current layer.
    pub fn erase_cell(&self) -> Option<Cell> {
        self.current_canvas_layer().map(|layer| self.palette.make_erase_cell(layer.canvas_type()))
    }

    /// Merge `shape` onto the current layer.
    pub fn paint_shape(&mut self, shape: Shape) -> bool {
        self.execute_recorded(GraphicsAction::MergeShape { layer_uid: self.current_layer_uid.clone(), shape })
    }

    /// Overwrite the current layer with `shape`.
    pub fn replace_shape(&mut self, shape: Shape) -> bool {
        self.execute_recorded(GraphicsAction::ReplaceShape { layer_uid: self.current_layer_uid.clone(), shape })
    }

    /// Clear the palette's erase channels along the outline of `shape`.
    pub fn erase_shape(&mut self, shape: Shape) -> bool {
        match self.erase_cell() {
            Some(cell) => self.paint_shape(shape.with_cell(cell)),
            None => false,
        }
    }

    pub fn replace_cells(&mut self, x: i32, y: i32, crate_: Crate<SciiCell>) -> bool {
        self.execute_recorded(GraphicsAction::ReplaceCells { layer_uid: self.current_layer_uid.clone(), x, y, crate_ })
    }

    /// Flip or rotate the drawing cells of `area` in place on the current layer.
    ///
    /// The area is cleared and the transformed cells are merged back with
    /// their top-left corner kept, as one history step.
    pub fn transform_area(&mut self, area: CellBox, transform: TransformType) -> bool {
        let Some(layer) = self.current_canvas_layer() else {
            return false;
        };
        let bounds = CellBox::of_size(0, 0, layer.canvas.drawing_width(), layer.canvas.drawing_height());
        let Some(area) = area.intersect(&bounds) else {
            return false;
        };

        let crate_ = Crate::from_canvas_drawing(&layer.canvas, area).copy_transformed(transform);
        let clear = GraphicsAction::ReplaceShape {
            layer_uid: self.current_layer_uid.clone(),
            shape: Shape::fill_box(area, layer.canvas.cell_type().transparent_cell()),
        };
        let paste = GraphicsAction::MergeShape {
            layer_uid: self.current_layer_uid.clone(),
            shape: Shape::Cells { x: area.lx, y: area.ly, crate_ },
        };

        let Some(clear_undo) = self.engine.execute(&clear) else {
            return false;
        };
        let Some(paste_undo) = self.engine.execute(&paste) else {
            self.engine.execute(&clear_undo);
            return false;
        };

        self.record(
            HistoryStep::from_pair(GraphicsActionPair::new(clear, clear_undo))
                .merge(HistoryStep::from_pair(GraphicsActionPair::new(paste, paste_undo))),
        );
        true
    }

    // ========================================================================
    // HISTORY
    // ========================================================================

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        let Self { history, engine, current_layer_uid, .. } = self;
        let undone = history.undo(|action| apply_history_action(engine, current_layer_uid, action));

        self.is_dirty |= undone;
        undone
    }

    pub fn redo(&mut self) -> bool {
        let Self { history, engine, current_layer_uid, .. } = self;
        let redone = history.redo(|action| apply_history_action(engine, current_layer_uid, action));

        self.is_dirty |= redone;
        redone
    }

    // ========================================================================
    // PERSISTENCE
    // ========================================================================

    /// Pack the whole document. `history_limit` keeps only the newest steps (negative keeps all).
    pub fn pack(&self, format: BagFormat, history_limit: i32) -> String {
        let mut bag = PackableBag::with_format(format);
        bag.put_stuff_with(PROJECT_VERSION, |bag| self.put_payload(bag, history_limit));
        bag.into_string()
    }

    /// Replace the document with a packed one. On error nothing changes.
    pub fn unpack(&mut self, input: &str) -> BagResult<()> {
        let mut bag = UnpackableBag::new(input)?;
        let max_steps = self.history.max_steps();

        let (palette, current_layer_uid, history, state) = bag.get_stuff_with(|version, bag| {
            require_supported_stuff_version("Project", PROJECT_VERSION, version)?;

            let palette: Palette = bag.get_stuff()?;
            let current_layer_uid = LayerUid(bag.get_string()?);
            let history = History::unpack(bag, max_steps)?;
            let state: GraphicsState = bag.get_stuff()?;
            Ok((palette, current_layer_uid, history, state))
        })?;

        self.palette = palette;
        self.history = history;
        self.engine.replace_state(state);
        self.current_layer_uid = self.resolve_layer(&current_layer_uid);

        tracing::debug!(
            layers = self.engine.canvas_layers().len(),
            steps = self.history.len(),
            position = self.history.position(),
            "project unpacked"
        );
        Ok(())
    }

    fn put_payload(&self, bag: &mut PackableBag, history_limit: i32) {
        bag.put_stuff(&self.palette);
        bag.put_string(self.current_layer_uid.as_str());
        self.history.pack_limited(bag, history_limit);
        bag.put_stuff(&self.engine);
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn resolve_layer(&self, uid: &LayerUid) -> LayerUid {
        if self.engine.canvas_layer(uid).is_some() { uid.clone() } else { LayerUid::background() }
    }

    fn execute_recorded(&mut self, action: GraphicsAction) -> bool {
        let Some(undo_action) = self.engine.execute(&action) else {
            return false;
        };

        self.record(HistoryStep::from_pair(GraphicsActionPair::new(action, undo_action)));
        true
    }

    /// Execute and then select `select`; undo restores the previous selection.
    fn execute_selecting(&mut self, action: GraphicsAction, select: LayerUid) -> Option<()> {
        let undo_action = self.engine.execute(&action)?;
        let previous = std::mem::replace(&mut self.current_layer_uid, LayerUid::background());
        self.current_layer_uid = self.resolve_layer(&select);

        // The selection follows the graphics action both ways.
        self.record(HistoryStep::new(
            vec![HistoryAction::Graphics(action), HistoryAction::CurrentLayer(select)],
            vec![HistoryAction::Graphics(undo_action), HistoryAction::CurrentLayer(previous)],
        ));
        Some(())
    }

    fn record(&mut self, step: HistoryStep) {
        if self.history.record(step) {
            self.is_dirty = true;
        }
    }
}

impl BagStuffPacker for Project {
    const PUT_IN_THE_BAG_VERSION: i32 = PROJECT_VERSION;

    fn put_in_the_bag(&self, bag: &mut PackableBag) {
        self.put_payload(bag, -1);
    }
}

fn apply_history_action(engine: &mut GraphicsEngine, current_layer_uid: &mut LayerUid, action: &HistoryAction) {
    match action {
        HistoryAction::CurrentLayer(uid) => {
            *current_layer_uid = if engine.canvas_layer(uid).is_some() { uid.clone() } else { LayerUid::background() };
        }
        HistoryAction::Graphics(action) => {
            if engine.execute(action).is_none() {
                tracing::warn!(action = ?action, "history action did not apply");
            }
        }
    }
}
