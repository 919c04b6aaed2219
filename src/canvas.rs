use std::ops::Deref;
use std::sync::Arc;

use crate::bag::{
    BagResult, BagStuffPacker, BagStuffUnpacker, BagUnpackError, PackableBag, UnpackableBag,
    require_supported_stuff_version,
};
use crate::cell::{BlockCell, Cell, CellType, HBlockMergeCell, SciiCell, SciiChar, SciiColor, SciiLight, VBlockMergeCell};
use crate::error::IllegalArgument;
use crate::merger::{merge_block_cell, merge_light, merge_scii_cell, normalize_block_cell, normalize_scii_cell};

// ============================================================================
// CANVAS TYPE
// ============================================================================

/// Largest width or height, in SCII cells, of a canvas or crate.
pub const MAX_SCII_SIZE: i32 = 4096;

/// Reject stored sizes outside `0..=MAX_SCII_SIZE` before anything is allocated.
pub(crate) fn check_stored_size(kind: &str, width: i32, height: i32, bag: &UnpackableBag) -> BagResult<()> {
    if (0..=MAX_SCII_SIZE).contains(&width) && (0..=MAX_SCII_SIZE).contains(&height) {
        return Ok(());
    }
    Err(BagUnpackError::Malformed { what: format!("{} size={}x{}", kind, width, height), index: bag.index() })
}

/// Drawing grid granularity relative to the SCII attribute grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CanvasType {
    /// One SCII cell per drawing cell.
    Scii,
    /// Two block cells stacked vertically per SCII cell.
    HBlock,
    /// Two block cells side by side per SCII cell.
    VBlock,
    /// Four pixels per SCII cell sharing one block attribute.
    QBlock,
}

impl CanvasType {
    pub const ALL: [CanvasType; 4] = [CanvasType::Scii, CanvasType::HBlock, CanvasType::VBlock, CanvasType::QBlock];

    pub fn value(self) -> i32 {
        match self {
            CanvasType::Scii => 1,
            CanvasType::HBlock => 2,
            CanvasType::VBlock => 3,
            CanvasType::QBlock => 4,
        }
    }

    pub fn of(value: i32) -> Result<Self, IllegalArgument> {
        CanvasType::ALL
            .into_iter()
            .find(|t| t.value() == value)
            .ok_or_else(|| IllegalArgument::unknown_enum_value("CanvasType", value))
    }

    pub fn name(self) -> &'static str {
        match self {
            CanvasType::Scii => "Scii",
            CanvasType::HBlock => "HBlock",
            CanvasType::VBlock => "VBlock",
            CanvasType::QBlock => "QBlock",
        }
    }

    pub fn cell_type(self) -> CellType {
        match self {
            CanvasType::Scii => CellType::Scii,
            _ => CellType::Block,
        }
    }

    /// Drawing cells per SCII cell along x and y.
    pub fn scale(self) -> (i32, i32) {
        match self {
            CanvasType::Scii => (1, 1),
            CanvasType::HBlock => (1, 2),
            CanvasType::VBlock => (2, 1),
            CanvasType::QBlock => (2, 2),
        }
    }

    pub fn to_scii_position(self, drawing_x: i32, drawing_y: i32) -> (i32, i32) {
        let (sx, sy) = self.scale();
        (drawing_x.div_euclid(sx), drawing_y.div_euclid(sy))
    }
}

// ============================================================================
// CANVAS
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
enum CanvasData {
    Scii(Vec<SciiCell>),
    HBlock(Vec<BlockCell>),
    VBlock(Vec<BlockCell>),
    QBlock { pixels: Vec<bool>, attrs: Vec<BlockCell> },
}

/// A grid of cells at drawing resolution, projected onto a grid of SCII cells.
///
/// Every [`Canvas::mutate`] call bumps `mutations`, which keys the cached
/// [`CanvasView`] snapshot. The counter is not part of equality and is not
/// persisted.
#[derive(Clone, Debug)]
pub struct Canvas {
    scii_width: i32,
    scii_height: i32,
    data: CanvasData,
    mutations: u64,
    view_cache: Option<CanvasView>,
}

impl PartialEq for Canvas {
    fn eq(&self, other: &Self) -> bool {
        self.scii_width == other.scii_width && self.scii_height == other.scii_height && self.data == other.data
    }
}

impl Eq for Canvas {}

impl Canvas {
    pub fn new(canvas_type: CanvasType, scii_width: i32, scii_height: i32) -> Self {
        Self::create(canvas_type, scii_width, scii_height, None)
    }

    /// New transparent canvas, optionally continuing the mutation counter of the canvas it replaces.
    pub fn create(canvas_type: CanvasType, scii_width: i32, scii_height: i32, source_mutations: Option<u64>) -> Self {
        let scii_width = scii_width.clamp(0, MAX_SCII_SIZE);
        let scii_height = scii_height.clamp(0, MAX_SCII_SIZE);
        let (sx, sy) = canvas_type.scale();
        let drawing_len = (scii_width * sx * scii_height * sy) as usize;
        let scii_len = (scii_width * scii_height) as usize;

        let data = match canvas_type {
            CanvasType::Scii => CanvasData::Scii(vec![SciiCell::TRANSPARENT; drawing_len]),
            CanvasType::HBlock => CanvasData::HBlock(vec![BlockCell::TRANSPARENT; drawing_len]),
            CanvasType::VBlock => CanvasData::VBlock(vec![BlockCell::TRANSPARENT; drawing_len]),
            CanvasType::QBlock => CanvasData::QBlock {
                pixels: vec![false; drawing_len],
                attrs: vec![BlockCell::TRANSPARENT; scii_len],
            },
        };

        Self { scii_width, scii_height, data, mutations: source_mutations.unwrap_or(0), view_cache: None }
    }

    /// Independent copy that keeps the mutation counter.
    pub fn copy_mutable(&self) -> Self {
        Self { view_cache: None, ..self.clone() }
    }

    pub fn canvas_type(&self) -> CanvasType {
        match self.data {
            CanvasData::Scii(_) => CanvasType::Scii,
            CanvasData::HBlock(_) => CanvasType::HBlock,
            CanvasData::VBlock(_) => CanvasType::VBlock,
            CanvasData::QBlock { .. } => CanvasType::QBlock,
        }
    }

    pub fn cell_type(&self) -> CellType {
        self.canvas_type().cell_type()
    }

    pub fn scii_width(&self) -> i32 {
        self.scii_width
    }

    pub fn scii_height(&self) -> i32 {
        self.scii_height
    }

    pub fn drawing_width(&self) -> i32 {
        self.scii_width * self.canvas_type().scale().0
    }

    pub fn drawing_height(&self) -> i32 {
        self.scii_height * self.canvas_type().scale().1
    }

    pub fn mutations(&self) -> u64 {
        self.mutations
    }

    pub fn to_scii_position(&self, drawing_x: i32, drawing_y: i32) -> (i32, i32) {
        self.canvas_type().to_scii_position(drawing_x, drawing_y)
    }

    fn drawing_index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.drawing_width() || y >= self.drawing_height() {
            None
        } else {
            Some((y * self.drawing_width() + x) as usize)
        }
    }

    fn scii_index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.scii_width || y >= self.scii_height {
            None
        } else {
            Some((y * self.scii_width + x) as usize)
        }
    }

    /// Cell at drawing resolution; transparent outside the canvas.
    pub fn get_drawing_cell(&self, drawing_x: i32, drawing_y: i32) -> Cell {
        let index = self.drawing_index(drawing_x, drawing_y);

        match (&self.data, index) {
            (CanvasData::Scii(cells), Some(i)) => Cell::Scii(cells[i]),
            (CanvasData::Scii(_), None) => Cell::Scii(SciiCell::TRANSPARENT),
            (CanvasData::HBlock(cells) | CanvasData::VBlock(cells), Some(i)) => Cell::Block(cells[i]),
            (CanvasData::QBlock { pixels, attrs }, Some(i)) if pixels[i] => {
                let (sx, sy) = self.to_scii_position(drawing_x, drawing_y);
                Cell::Block(attrs[(sy * self.scii_width + sx) as usize])
            }
            _ => Cell::Block(BlockCell::TRANSPARENT),
        }
    }

    /// The displayed SCII cell reduced from the drawing cells covering it.
    pub fn get_scii_cell(&self, scii_x: i32, scii_y: i32) -> SciiCell {
        let Some(scii_index) = self.scii_index(scii_x, scii_y) else {
            return SciiCell::TRANSPARENT;
        };

        match &self.data {
            CanvasData::Scii(cells) => cells[scii_index],
            CanvasData::HBlock(_) => self
                .get_hblock_merge_cell(scii_x, scii_y)
                .map_or(SciiCell::TRANSPARENT, |cell| cell.to_scii_cell()),
            CanvasData::VBlock(_) => self
                .get_vblock_merge_cell(scii_x, scii_y)
                .map_or(SciiCell::TRANSPARENT, |cell| cell.to_scii_cell()),
            CanvasData::QBlock { attrs, .. } => {
                let bits = self.qblock_bits(scii_x, scii_y);
                let attr = attrs[scii_index];

                match bits {
                    0 => SciiCell::TRANSPARENT,
                    SciiChar::BLOCK_MASK => SciiCell {
                        character: SciiChar::BLOCK_SPACE,
                        ink: SciiColor::TRANSPARENT,
                        paper: attr.color,
                        bright: attr.bright,
                        flash: SciiLight::TRANSPARENT,
                    },
                    _ => SciiCell {
                        character: SciiChar(SciiChar::BLOCK_VALUE_FIRST | bits),
                        ink: attr.color,
                        paper: SciiColor::TRANSPARENT,
                        bright: attr.bright,
                        flash: SciiLight::TRANSPARENT,
                    },
                }
            }
        }
    }

    /// Top and bottom halves of an SCII cell. `None` unless this is an HBlock canvas.
    pub fn get_hblock_merge_cell(&self, scii_x: i32, scii_y: i32) -> Option<HBlockMergeCell> {
        let CanvasData::HBlock(cells) = &self.data else {
            return None;
        };

        Some(match self.scii_index(scii_x, scii_y) {
            None => HBlockMergeCell::TRANSPARENT,
            Some(_) => {
                let top = cells[(scii_y * 2 * self.scii_width + scii_x) as usize];
                let bottom = cells[((scii_y * 2 + 1) * self.scii_width + scii_x) as usize];
                HBlockMergeCell {
                    top_color: top.color,
                    bottom_color: bottom.color,
                    bright: merge_light(top.bright, bottom.bright),
                }
            }
        })
    }

    /// Left and right halves of an SCII cell. `None` unless this is a VBlock canvas.
    pub fn get_vblock_merge_cell(&self, scii_x: i32, scii_y: i32) -> Option<VBlockMergeCell> {
        let CanvasData::VBlock(cells) = &self.data else {
            return None;
        };

        Some(match self.scii_index(scii_x, scii_y) {
            None => VBlockMergeCell::TRANSPARENT,
            Some(_) => {
                let row = (scii_y * self.scii_width * 2) as usize;
                let left = cells[row + (scii_x * 2) as usize];
                let right = cells[row + (scii_x * 2 + 1) as usize];
                VBlockMergeCell {
                    left_color: left.color,
                    right_color: right.color,
                    bright: merge_light(left.bright, right.bright),
                }
            }
        })
    }

    fn qblock_bits(&self, scii_x: i32, scii_y: i32) -> i32 {
        let CanvasData::QBlock { pixels, .. } = &self.data else {
            return 0;
        };

        let width = self.drawing_width();
        let at = |x: i32, y: i32| pixels[(y * width + x) as usize];
        let (x, y) = (scii_x * 2, scii_y * 2);

        let mut bits = 0;
        if at(x + 1, y) {
            bits |= SciiChar::BLOCK_BIT_TR;
        }
        if at(x, y) {
            bits |= SciiChar::BLOCK_BIT_TL;
        }
        if at(x + 1, y + 1) {
            bits |= SciiChar::BLOCK_BIT_BR;
        }
        if at(x, y + 1) {
            bits |= SciiChar::BLOCK_BIT_BL;
        }
        bits
    }

    /// Run a batch of writes. Counts as one mutation.
    pub fn mutate<R>(&mut self, block: impl FnOnce(&mut CanvasMutator<'_>) -> R) -> R {
        self.mutations += 1;
        let mut mutator = CanvasMutator { canvas: self };
        block(&mut mutator)
    }

    /// Immutable snapshot, rebuilt only when the canvas changed since the last call.
    pub fn view(&mut self) -> CanvasView {
        if let Some(cached) = &self.view_cache {
            if cached.mutations == self.mutations {
                return cached.clone();
            }
        }

        let view = CanvasView { snapshot: Arc::new(self.copy_mutable()), mutations: self.mutations };
        self.view_cache = Some(view.clone());
        view
    }
}

// ============================================================================
// MUTATOR
// ============================================================================

/// Write access handed out by [`Canvas::mutate`]. Writes outside the canvas
/// and drawing cells of the wrong cell type are ignored.
pub struct CanvasMutator<'a> {
    canvas: &'a mut Canvas,
}

impl CanvasMutator<'_> {
    pub fn clear(&mut self) {
        match &mut self.canvas.data {
            CanvasData::Scii(cells) => cells.fill(SciiCell::TRANSPARENT),
            CanvasData::HBlock(cells) | CanvasData::VBlock(cells) => cells.fill(BlockCell::TRANSPARENT),
            CanvasData::QBlock { pixels, attrs } => {
                pixels.fill(false);
                attrs.fill(BlockCell::TRANSPARENT);
            }
        }
    }

    pub fn merge_drawing_cell(&mut self, drawing_x: i32, drawing_y: i32, cell: &Cell) {
        self.modify_drawing_cell(drawing_x, drawing_y, cell, true);
    }

    pub fn replace_drawing_cell(&mut self, drawing_x: i32, drawing_y: i32, cell: &Cell) {
        self.modify_drawing_cell(drawing_x, drawing_y, cell, false);
    }

    fn modify_drawing_cell(&mut self, x: i32, y: i32, cell: &Cell, merge: bool) {
        let Some(index) = self.canvas.drawing_index(x, y) else {
            return;
        };
        let width = self.canvas.drawing_width() as usize;
        let scii_width = self.canvas.scii_width;

        match (&mut self.canvas.data, cell) {
            (CanvasData::Scii(cells), Cell::Scii(cell)) => {
                cells[index] = if merge {
                    normalize_scii_cell(&merge_scii_cell(cell, &cells[index]))
                } else {
                    normalize_scii_cell(cell)
                };
            }
            (CanvasData::HBlock(cells), Cell::Block(cell)) => {
                let other = if y % 2 == 0 { index + width } else { index - width };
                write_block_pair(cells, index, other, cell, merge);
            }
            (CanvasData::VBlock(cells), Cell::Block(cell)) => {
                let other = if x % 2 == 0 { index + 1 } else { index - 1 };
                write_block_pair(cells, index, other, cell, merge);
            }
            (CanvasData::QBlock { pixels, attrs }, Cell::Block(cell)) => {
                let opaque = !cell.color.is_transparent();
                pixels[index] = if merge { pixels[index] || opaque } else { opaque };

                let (base_x, base_y) = ((x / 2 * 2) as usize, (y / 2 * 2) as usize);
                let any_pixel = pixels[base_y * width + base_x]
                    || pixels[base_y * width + base_x + 1]
                    || pixels[(base_y + 1) * width + base_x]
                    || pixels[(base_y + 1) * width + base_x + 1];

                let attr_index = ((y / 2) * scii_width + x / 2) as usize;
                let attr = attrs[attr_index];
                attrs[attr_index] = if any_pixel {
                    merge_block_cell(cell, &attr, attr.bright)
                } else {
                    BlockCell::TRANSPARENT
                };
            }
            _ => {}
        }
    }

    /// Write one SCII cell. Block canvases decode block glyphs into their
    /// sub-cells; other characters are treated as the empty block.
    pub fn replace_scii_cell(&mut self, scii_x: i32, scii_y: i32, cell: &SciiCell) {
        let Some(scii_index) = self.canvas.scii_index(scii_x, scii_y) else {
            return;
        };
        let cell = normalize_scii_cell(cell);
        let scii_width = self.canvas.scii_width as usize;
        let (x, y) = (scii_x as usize, scii_y as usize);

        match &mut self.canvas.data {
            CanvasData::Scii(cells) => cells[scii_index] = cell,
            CanvasData::HBlock(cells) => {
                let (bits, ink, paper) = decode_block_glyph(&cell);
                let top = pick(bits, SciiChar::BLOCK_BIT_TR | SciiChar::BLOCK_BIT_TL, ink, paper);
                let bottom = pick(bits, SciiChar::BLOCK_BIT_BR | SciiChar::BLOCK_BIT_BL, ink, paper);
                let (top_index, bottom_index) = (y * 2 * scii_width + x, (y * 2 + 1) * scii_width + x);
                write_replaced_pair(cells, top_index, bottom_index, top, bottom, cell.bright);
            }
            CanvasData::VBlock(cells) => {
                let (bits, ink, paper) = decode_block_glyph(&cell);
                let left = pick(bits, SciiChar::BLOCK_BIT_TL | SciiChar::BLOCK_BIT_BL, ink, paper);
                let right = pick(bits, SciiChar::BLOCK_BIT_TR | SciiChar::BLOCK_BIT_BR, ink, paper);
                let left_index = y * scii_width * 2 + x * 2;
                write_replaced_pair(cells, left_index, left_index + 1, left, right, cell.bright);
            }
            CanvasData::QBlock { pixels, attrs } => {
                let mut bits = if cell.character.is_block() { cell.character.block_bits() } else { 0 };

                let color = match (cell.ink.is_transparent(), cell.paper.is_transparent()) {
                    (true, true) => {
                        bits = 0;
                        SciiColor::TRANSPARENT
                    }
                    (true, false) => {
                        bits ^= SciiChar::BLOCK_MASK;
                        cell.paper
                    }
                    (false, true) => cell.ink,
                    (false, false) => {
                        bits = SciiChar::BLOCK_MASK;
                        cell.ink
                    }
                };

                let width = scii_width * 2;
                let (dx, dy) = (x * 2, y * 2);
                pixels[dy * width + dx + 1] = bits & SciiChar::BLOCK_BIT_TR != 0;
                pixels[dy * width + dx] = bits & SciiChar::BLOCK_BIT_TL != 0;
                pixels[(dy + 1) * width + dx + 1] = bits & SciiChar::BLOCK_BIT_BR != 0;
                pixels[(dy + 1) * width + dx] = bits & SciiChar::BLOCK_BIT_BL != 0;

                attrs[scii_index] = if bits == 0 { BlockCell::TRANSPARENT } else { BlockCell::new(color, cell.bright) };
            }
        }
    }

    /// Write both halves of an HBlock SCII cell. Ignored on other canvas types.
    pub fn replace_hblock_merge_cell(&mut self, scii_x: i32, scii_y: i32, cell: &HBlockMergeCell) {
        if self.canvas.scii_index(scii_x, scii_y).is_none() {
            return;
        }
        let scii_width = self.canvas.scii_width as usize;
        let (x, y) = (scii_x as usize, scii_y as usize);

        if let CanvasData::HBlock(cells) = &mut self.canvas.data {
            let (top_index, bottom_index) = (y * 2 * scii_width + x, (y * 2 + 1) * scii_width + x);
            write_replaced_pair(cells, top_index, bottom_index, cell.top_color, cell.bottom_color, cell.bright);
        }
    }

    /// Write both halves of a VBlock SCII cell. Ignored on other canvas types.
    pub fn replace_vblock_merge_cell(&mut self, scii_x: i32, scii_y: i32, cell: &VBlockMergeCell) {
        if self.canvas.scii_index(scii_x, scii_y).is_none() {
            return;
        }
        let scii_width = self.canvas.scii_width as usize;
        let (x, y) = (scii_x as usize, scii_y as usize);

        if let CanvasData::VBlock(cells) = &mut self.canvas.data {
            let left_index = y * scii_width * 2 + x * 2;
            write_replaced_pair(cells, left_index, left_index + 1, cell.left_color, cell.right_color, cell.bright);
        }
    }
}

/// Write one half of an H/V block pair. The pair is cleared when both colors
/// end up transparent; otherwise the other half takes the written bright.
fn write_block_pair(cells: &mut [BlockCell], index: usize, other_index: usize, cell: &BlockCell, merge: bool) {
    let current = cells[index];
    let other = cells[other_index];

    let cell = if merge {
        merge_block_cell(cell, &current, merge_light(current.bright, other.bright))
    } else {
        normalize_block_cell(cell)
    };

    if cell.color.is_transparent() && other.color.is_transparent() {
        cells[index] = BlockCell::TRANSPARENT;
        cells[other_index] = BlockCell::TRANSPARENT;
    } else {
        cells[index] = cell;
        cells[other_index] = BlockCell { bright: cell.bright, ..other };
    }
}

fn write_replaced_pair(
    cells: &mut [BlockCell],
    first: usize,
    second: usize,
    first_color: SciiColor,
    second_color: SciiColor,
    bright: SciiLight,
) {
    if first_color.is_transparent() && second_color.is_transparent() {
        cells[first] = BlockCell::TRANSPARENT;
        cells[second] = BlockCell::TRANSPARENT;
    } else {
        cells[first] = BlockCell::new(first_color, bright);
        cells[second] = BlockCell::new(second_color, bright);
    }
}

/// Quadrant bits, ink and paper of a glyph, with ink and paper swapped (and
/// the bits inverted) when only the paper is opaque.
fn decode_block_glyph(cell: &SciiCell) -> (i32, SciiColor, SciiColor) {
    let mut bits = if cell.character.is_block() { cell.character.block_bits() } else { 0 };
    let (mut ink, mut paper) = (cell.ink, cell.paper);

    if ink.is_transparent() && !paper.is_transparent() {
        ink = paper;
        paper = SciiColor::TRANSPARENT;
        bits ^= SciiChar::BLOCK_MASK;
    }

    (bits, ink, paper)
}

fn pick(bits: i32, mask: i32, ink: SciiColor, paper: SciiColor) -> SciiColor {
    if bits & mask != 0 { ink } else { paper }
}

// ============================================================================
// VIEW - cached immutable snapshot
// ============================================================================

/// Shared read-only snapshot of a canvas. Two views are equal when they were
/// taken from canvases of the same type and size at the same mutation count.
#[derive(Clone, Debug)]
pub struct CanvasView {
    snapshot: Arc<Canvas>,
    mutations: u64,
}

impl CanvasView {
    pub fn mutations(&self) -> u64 {
        self.mutations
    }

    pub fn ptr_eq(&self, other: &CanvasView) -> bool {
        Arc::ptr_eq(&self.snapshot, &other.snapshot)
    }
}

impl Deref for CanvasView {
    type Target = Canvas;

    fn deref(&self) -> &Canvas {
        &self.snapshot
    }
}

impl PartialEq for CanvasView {
    fn eq(&self, other: &Self) -> bool {
        self.snapshot.canvas_type() == other.snapshot.canvas_type()
            && self.snapshot.scii_width == other.snapshot.scii_width
            && self.snapshot.scii_height == other.snapshot.scii_height
            && self.mutations == other.mutations
    }
}

impl Eq for CanvasView {}

// ============================================================================
// BAG FORMAT
// ============================================================================

const CANVAS_VERSION: i32 = 1;
const CANVAS_PAYLOAD_VERSION: i32 = 1;

impl BagStuffPacker for Canvas {
    const PUT_IN_THE_BAG_VERSION: i32 = CANVAS_VERSION;

    fn put_in_the_bag(&self, bag: &mut PackableBag) {
        bag.put_int(self.canvas_type().value());
        bag.put_int(self.scii_width);
        bag.put_int(self.scii_height);

        bag.put_stuff_with(CANVAS_PAYLOAD_VERSION, |bag| match &self.data {
            CanvasData::Scii(cells) => cells.iter().for_each(|cell| bag.put_stuff(cell)),
            CanvasData::HBlock(cells) | CanvasData::VBlock(cells) => {
                cells.iter().for_each(|cell| bag.put_stuff(cell))
            }
            CanvasData::QBlock { pixels, attrs } => {
                pixels.iter().for_each(|&pixel| bag.put_bool(pixel));
                attrs.iter().for_each(|attr| bag.put_stuff(attr));
            }
        });
    }
}

impl BagStuffUnpacker for Canvas {
    fn get_out_of_the_bag(version: i32, bag: &mut UnpackableBag) -> BagResult<Self> {
        require_supported_stuff_version("Canvas", CANVAS_VERSION, version)?;

        let ty = bag.get_int()?;
        let scii_width = bag.get_int()?;
        let scii_height = bag.get_int()?;

        let canvas_type = CanvasType::of(ty)
            .map_err(|_| BagUnpackError::UnknownPolymorphicType { kind: "Canvas", ty })?;

        check_stored_size("canvas", scii_width, scii_height, bag)?;

        let (sx, sy) = canvas_type.scale();
        let drawing_len = scii_width as usize * sx as usize * scii_height as usize * sy as usize;
        let scii_len = scii_width as usize * scii_height as usize;

        bag.get_stuff_with(|version, bag| {
            require_supported_stuff_version(canvas_kind(canvas_type), CANVAS_PAYLOAD_VERSION, version)?;

            let data = match canvas_type {
                CanvasType::Scii => CanvasData::Scii(read_cells(bag, drawing_len)?),
                CanvasType::HBlock => CanvasData::HBlock(read_cells(bag, drawing_len)?),
                CanvasType::VBlock => CanvasData::VBlock(read_cells(bag, drawing_len)?),
                CanvasType::QBlock => {
                    let mut pixels = Vec::new();
                    for _ in 0..drawing_len {
                        pixels.push(bag.get_bool()?);
                    }
                    CanvasData::QBlock { pixels, attrs: read_cells(bag, scii_len)? }
                }
            };

            Ok(Canvas { scii_width, scii_height, data, mutations: 0, view_cache: None })
        })
    }
}

fn canvas_kind(canvas_type: CanvasType) -> &'static str {
    match canvas_type {
        CanvasType::Scii => "SciiCanvas",
        CanvasType::HBlock => "HBlockCanvas",
        CanvasType::VBlock => "VBlockCanvas",
        CanvasType::QBlock => "QBlockCanvas",
    }
}

// Grows as it reads so a corrupt size cannot force a huge allocation.
fn read_cells<T: BagStuffUnpacker>(bag: &mut UnpackableBag, len: usize) -> BagResult<Vec<T>> {
    let mut cells = Vec::new();
    for _ in 0..len {
        cells.push(bag.get_stuff()?);
    }
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::{BagFormat, pack_stuff, unpack_stuff};

    fn block(color: SciiColor, bright: SciiLight) -> Cell {
        Cell::Block(BlockCell::new(color, bright))
    }

    #[test]
    fn drawing_sizes_follow_the_type() {
        let sizes: Vec<(i32, i32)> = CanvasType::ALL
            .iter()
            .map(|&t| {
                let canvas = Canvas::new(t, 4, 3);
                (canvas.drawing_width(), canvas.drawing_height())
            })
            .collect();
        assert_eq!(sizes, vec![(4, 3), (4, 6), (8, 3), (8, 6)]);
    }

    #[test]
    fn scii_position_floors_negative_coordinates() {
        assert_eq!(CanvasType::QBlock.to_scii_position(-1, 3), (-1, 1));
        assert_eq!(CanvasType::HBlock.to_scii_position(5, -3), (5, -2));
    }

    #[test]
    fn canvas_type_rejects_unknown_values() {
        assert_eq!(CanvasType::of(3).unwrap(), CanvasType::VBlock);
        assert_eq!(
            CanvasType::of(0).unwrap_err().to_string(),
            "Unknown enum value=0 for CanvasType"
        );
    }

    #[test]
    fn out_of_range_access_is_transparent_and_ignored() {
        let mut canvas = Canvas::new(CanvasType::Scii, 2, 2);
        let red = SciiCell::new(SciiChar(65), SciiColor::RED, SciiColor::BLACK, SciiLight::OFF, SciiLight::OFF);
        canvas.mutate(|m| {
            m.replace_drawing_cell(-1, 0, &Cell::Scii(red));
            m.replace_scii_cell(2, 0, &red);
        });
        assert_eq!(canvas, Canvas::new(CanvasType::Scii, 2, 2));
        assert_eq!(canvas.get_scii_cell(5, 5), SciiCell::TRANSPARENT);
        assert_eq!(canvas.get_drawing_cell(-1, -1), Cell::Scii(SciiCell::TRANSPARENT));
    }

    #[test]
    fn every_mutate_call_counts() {
        let mut canvas = Canvas::new(CanvasType::HBlock, 2, 2);
        canvas.mutate(|_| {});
        canvas.mutate(|m| m.clear());
        assert_eq!(canvas.mutations(), 2);
        assert_eq!(canvas.copy_mutable().mutations(), 2);
        assert_eq!(Canvas::create(CanvasType::Scii, 1, 1, Some(7)).mutations(), 7);
    }

    #[test]
    fn replace_stores_normalized_cells() {
        let mut canvas = Canvas::new(CanvasType::Scii, 1, 1);
        let forced = SciiCell { ink: SciiColor::FORCE_TRANSPARENT, ..SciiCell::new(SciiChar(65), SciiColor::RED, SciiColor::BLUE, SciiLight::ON, SciiLight::OFF) };
        canvas.mutate(|m| m.replace_drawing_cell(0, 0, &Cell::Scii(forced)));
        assert_eq!(canvas.get_scii_cell(0, 0).ink, SciiColor::TRANSPARENT);
    }

    #[test]
    fn hblock_pair_shares_bright_and_clears_together() {
        let mut canvas = Canvas::new(CanvasType::HBlock, 1, 1);
        canvas.mutate(|m| m.merge_drawing_cell(0, 0, &block(SciiColor::RED, SciiLight::ON)));

        assert_eq!(canvas.get_drawing_cell(0, 0), block(SciiColor::RED, SciiLight::ON));
        assert_eq!(canvas.get_drawing_cell(0, 1), block(SciiColor::TRANSPARENT, SciiLight::ON));

        let scii = canvas.get_scii_cell(0, 0);
        assert_eq!(scii.character, SciiChar::BLOCK_HORIZONTAL_TOP);
        assert_eq!(scii.ink, SciiColor::RED);
        assert_eq!(scii.paper, SciiColor::TRANSPARENT);
        assert_eq!(scii.bright, SciiLight::ON);

        canvas.mutate(|m| m.replace_drawing_cell(0, 0, &block(SciiColor::FORCE_TRANSPARENT, SciiLight::OFF)));
        assert_eq!(canvas, Canvas::new(CanvasType::HBlock, 1, 1));
    }

    #[test]
    fn vblock_decodes_paper_only_glyphs() {
        let mut canvas = Canvas::new(CanvasType::VBlock, 1, 1);
        // Left half set as ink, but only the paper is opaque: the right half gets the color.
        let cell = SciiCell::new(SciiChar::BLOCK_VERTICAL_LEFT, SciiColor::TRANSPARENT, SciiColor::GREEN, SciiLight::OFF, SciiLight::OFF);
        canvas.mutate(|m| m.replace_scii_cell(0, 0, &cell));

        assert_eq!(canvas.get_drawing_cell(0, 0), block(SciiColor::TRANSPARENT, SciiLight::OFF));
        assert_eq!(canvas.get_drawing_cell(1, 0), block(SciiColor::GREEN, SciiLight::OFF));
    }

    #[test]
    fn hblock_treats_text_characters_as_paper() {
        let mut canvas = Canvas::new(CanvasType::HBlock, 1, 1);
        let cell = SciiCell::new(SciiChar(65), SciiColor::RED, SciiColor::BLUE, SciiLight::ON, SciiLight::OFF);
        canvas.mutate(|m| m.replace_scii_cell(0, 0, &cell));
        assert_eq!(canvas.get_drawing_cell(0, 0), block(SciiColor::BLUE, SciiLight::ON));
        assert_eq!(canvas.get_drawing_cell(0, 1), block(SciiColor::BLUE, SciiLight::ON));
    }

    #[test]
    fn qblock_pixels_share_one_attribute() {
        let mut canvas = Canvas::new(CanvasType::QBlock, 1, 1);
        canvas.mutate(|m| {
            m.merge_drawing_cell(1, 0, &block(SciiColor::YELLOW, SciiLight::TRANSPARENT));
            m.merge_drawing_cell(0, 1, &block(SciiColor::TRANSPARENT, SciiLight::ON));
        });

        let scii = canvas.get_scii_cell(0, 0);
        assert_eq!(scii.character, SciiChar(0x80 | SciiChar::BLOCK_BIT_TR));
        assert_eq!(scii.ink, SciiColor::YELLOW);
        assert_eq!(scii.bright, SciiLight::ON);
        assert_eq!(canvas.get_drawing_cell(0, 0), block(SciiColor::TRANSPARENT, SciiLight::TRANSPARENT));

        canvas.mutate(|m| m.replace_drawing_cell(1, 0, &block(SciiColor::TRANSPARENT, SciiLight::TRANSPARENT)));
        assert_eq!(canvas.get_scii_cell(0, 0), SciiCell::TRANSPARENT);
    }

    #[test]
    fn qblock_full_glyph_reads_back_as_paper_space() {
        let mut canvas = Canvas::new(CanvasType::QBlock, 1, 1);
        let cell = SciiCell::new(SciiChar(0x81), SciiColor::RED, SciiColor::WHITE, SciiLight::ON, SciiLight::OFF);
        canvas.mutate(|m| m.replace_scii_cell(0, 0, &cell));

        let scii = canvas.get_scii_cell(0, 0);
        assert_eq!(scii.character, SciiChar::BLOCK_SPACE);
        assert_eq!(scii.ink, SciiColor::TRANSPARENT);
        assert_eq!(scii.paper, SciiColor::RED);
        assert_eq!(scii.bright, SciiLight::ON);
    }

    #[test]
    fn view_is_cached_until_the_next_mutation() {
        let mut canvas = Canvas::new(CanvasType::VBlock, 2, 2);
        let first = canvas.view();
        let second = canvas.view();
        assert!(first.ptr_eq(&second));

        canvas.mutate(|m| m.merge_drawing_cell(0, 0, &block(SciiColor::RED, SciiLight::OFF)));
        let third = canvas.view();
        assert!(!first.ptr_eq(&third));
        assert_ne!(first, third);
        assert_eq!(third.get_drawing_cell(0, 0), block(SciiColor::RED, SciiLight::OFF));
        assert_eq!(first.get_drawing_cell(0, 0), block(SciiColor::TRANSPARENT, SciiLight::TRANSPARENT));
    }

    #[test]
    fn canvases_survive_both_bag_formats() {
        for canvas_type in CanvasType::ALL {
            let mut canvas = Canvas::new(canvas_type, 3, 2);
            canvas.mutate(|m| {
                m.replace_scii_cell(1, 1, &SciiCell::new(SciiChar(0x86), SciiColor::RED, SciiColor::BLUE, SciiLight::ON, SciiLight::OFF));
                m.replace_scii_cell(2, 0, &SciiCell::new(SciiChar(0x80), SciiColor::TRANSPARENT, SciiColor::GREEN, SciiLight::OFF, SciiLight::ON));
            });

            for format in [BagFormat::Legacy, BagFormat::Bitstream] {
                let unpacked: Canvas = unpack_stuff(&pack_stuff(&canvas, format)).unwrap();
                assert_eq!(unpacked, canvas);
                assert_eq!(unpacked.canvas_type(), canvas_type);
            }
        }
    }

    #[test]
    fn unknown_canvas_type_is_polymorphic_error() {
        let mut bag = PackableBag::new();
        bag.put_stuff_with(1, |bag| {
            bag.put_int(5);
            bag.put_int(1);
            bag.put_int(1);
        });
        assert_eq!(
            unpack_stuff::<Canvas>(&bag.into_string()).unwrap_err(),
            BagUnpackError::UnknownPolymorphicType { kind: "Canvas", ty: 5 }
        );
    }

    #[test]
    fn stored_sizes_out_of_range_are_malformed() {
        for (ty, width, height) in [(2, i32::MAX, 0), (4, 0, MAX_SCII_SIZE + 1), (1, -1, 3)] {
            let mut bag = PackableBag::new();
            bag.put_stuff_with(1, |bag| {
                bag.put_int(ty);
                bag.put_int(width);
                bag.put_int(height);
            });
            assert!(
                matches!(unpack_stuff::<Canvas>(&bag.into_string()), Err(BagUnpackError::Malformed { .. })),
                "{width}x{height}"
            );
        }
    }

    #[test]
    fn create_clamps_the_size() {
        let canvas = Canvas::new(CanvasType::VBlock, i32::MAX, -4);
        assert_eq!((canvas.scii_width(), canvas.scii_height()), (MAX_SCII_SIZE, 0));
    }
}
