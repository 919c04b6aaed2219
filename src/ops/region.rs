// ============================================================================
// REGIONS - boxes, crates of copied cells, crate transforms
// ============================================================================

use std::fmt;

use crate::bag::{BagResult, BagStuffPacker, BagStuffUnpacker, PackableBag, UnpackableBag, require_supported_stuff_version};
use crate::canvas::{Canvas, CanvasType, check_stored_size};
use crate::cell::{BlockCell, Cell, CellType, SciiCell};

/// Inclusive rectangle of cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct CellBox {
    pub lx: i32,
    pub ly: i32,
    pub width: i32,
    pub height: i32,
}

impl CellBox {
    pub fn of_size(lx: i32, ly: i32, width: i32, height: i32) -> Self {
        Self { lx, ly, width, height }
    }

    /// Box spanning two corners given in any order.
    pub fn of_coords(sx: i32, sy: i32, ex: i32, ey: i32) -> Self {
        let (lx, rx) = (sx.min(ex), sx.max(ex));
        let (ly, ry) = (sy.min(ey), sy.max(ey));
        Self { lx, ly, width: rx - lx + 1, height: ry - ly + 1 }
    }

    pub fn rx(&self) -> i32 {
        self.lx + self.width - 1
    }

    pub fn ry(&self) -> i32 {
        self.ly + self.height - 1
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Overlap with another box, `None` when they do not touch.
    pub fn intersect(&self, other: &CellBox) -> Option<CellBox> {
        let lx = self.lx.max(other.lx);
        let ly = self.ly.max(other.ly);
        let rx = self.rx().min(other.rx());
        let ry = self.ry().min(other.ry());

        if lx > rx || ly > ry { None } else { Some(CellBox::of_coords(lx, ly, rx, ry)) }
    }
}

/// Flip or quarter-turn applied to a [`Crate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransformType {
    FlipHorizontal,
    FlipVertical,
    RotateCw,
    RotateCcw,
}

// ============================================================================
// CRATE
// ============================================================================

/// A cell type that can live in a [`Crate`].
pub trait CrateCell: Copy + PartialEq + fmt::Debug + BagStuffPacker + BagStuffUnpacker {
    fn cell_type(&self) -> CellType;
}

impl CrateCell for SciiCell {
    fn cell_type(&self) -> CellType {
        CellType::Scii
    }
}

impl CrateCell for BlockCell {
    fn cell_type(&self) -> CellType {
        CellType::Block
    }
}

impl CrateCell for Cell {
    fn cell_type(&self) -> CellType {
        Cell::cell_type(self)
    }
}

/// A rectangular copy of cells, tagged with the canvas type it came from.
#[derive(Clone, PartialEq, Eq)]
pub struct Crate<T> {
    pub canvas_type: CanvasType,
    pub width: i32,
    pub height: i32,
    pub cells: Vec<Vec<T>>,
}

impl<T> fmt::Debug for Crate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Crate(canvas_type={:?}, width={}, height={})", self.canvas_type, self.width, self.height)
    }
}

impl Crate<SciiCell> {
    /// SCII cells of `area`, as displayed by `canvas`.
    pub fn from_canvas_scii(canvas: &Canvas, area: CellBox) -> Self {
        let cells = (0..area.height.max(0))
            .map(|y| (0..area.width.max(0)).map(|x| canvas.get_scii_cell(area.lx + x, area.ly + y)).collect())
            .collect();

        Crate { canvas_type: CanvasType::Scii, width: area.width.max(0), height: area.height.max(0), cells }
    }
}

impl Crate<Cell> {
    /// Drawing cells of `area`, keeping the canvas type.
    pub fn from_canvas_drawing(canvas: &Canvas, area: CellBox) -> Self {
        let cells = (0..area.height.max(0))
            .map(|y| (0..area.width.max(0)).map(|x| canvas.get_drawing_cell(area.lx + x, area.ly + y)).collect())
            .collect();

        Crate { canvas_type: canvas.canvas_type(), width: area.width.max(0), height: area.height.max(0), cells }
    }
}

impl<T: Copy> Crate<T> {
    pub fn copy_transformed(&self, transform: TransformType) -> Self {
        let (w, h) = (self.width as usize, self.height as usize);

        let cells = match transform {
            TransformType::FlipHorizontal => {
                self.cells.iter().map(|row| row.iter().rev().copied().collect()).collect()
            }
            TransformType::FlipVertical => self.cells.iter().rev().cloned().collect(),
            TransformType::RotateCw => {
                (0..w).map(|y| (0..h).map(|x| self.cells[h - 1 - x][y]).collect()).collect()
            }
            TransformType::RotateCcw => {
                (0..w).map(|y| (0..h).map(|x| self.cells[x][w - 1 - y]).collect()).collect()
            }
        };

        let (width, height) = match transform {
            TransformType::FlipHorizontal | TransformType::FlipVertical => (self.width, self.height),
            TransformType::RotateCw | TransformType::RotateCcw => (self.height, self.width),
        };

        Crate { canvas_type: self.canvas_type, width, height, cells }
    }
}

impl<T: CrateCell> BagStuffPacker for Crate<T> {
    const PUT_IN_THE_BAG_VERSION: i32 = 1;

    fn put_in_the_bag(&self, bag: &mut PackableBag) {
        bag.put_int(self.canvas_type.value());
        bag.put_int(self.width);
        bag.put_int(self.height);
        for row in &self.cells {
            for cell in row {
                bag.put_stuff(cell);
            }
        }
    }
}

impl<T: CrateCell> BagStuffUnpacker for Crate<T> {
    fn get_out_of_the_bag(version: i32, bag: &mut UnpackableBag) -> BagResult<Self> {
        require_supported_stuff_version("Crate", 1, version)?;

        let mut canvas_type = CanvasType::of(bag.get_int()?)?;
        let width = bag.get_int()?;
        let height = bag.get_int()?;

        check_stored_size("crate", width, height, bag)?;

        let mut cells = Vec::new();
        for _ in 0..height {
            let mut row = Vec::new();
            for _ in 0..width {
                row.push(bag.get_stuff::<T>()?);
            }
            cells.push(row);
        }

        // Early documents tagged block crates copied from QBlock layers as Scii.
        if canvas_type == CanvasType::Scii
            && cells.first().and_then(|row| row.first()).is_some_and(|cell| cell.cell_type() == CellType::Block)
        {
            canvas_type = CanvasType::QBlock;
        }

        Ok(Crate { canvas_type, width, height, cells })
    }
}
