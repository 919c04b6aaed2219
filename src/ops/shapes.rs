// ============================================================================
// SHAPES - paintable primitives and their rasterizer
// ============================================================================

use std::collections::HashSet;

use crate::bag::{
    BagResult, BagStuffPacker, BagStuffUnpacker, BagUnpackError, PackableBag, UnpackableBag,
    require_supported_stuff_version,
};
use crate::cell::{Cell, CellType};
use crate::ops::region::{CellBox, Crate};

/// Stable shape ids used in the bag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    LinkedPoints,
    Line,
    FillBox,
    StrokeBox,
    Cells,
    FillEllipse,
    StrokeEllipse,
}

impl ShapeKind {
    pub fn value(self) -> i32 {
        match self {
            ShapeKind::LinkedPoints => 1,
            ShapeKind::Line => 2,
            ShapeKind::FillBox => 3,
            ShapeKind::StrokeBox => 4,
            ShapeKind::Cells => 5,
            ShapeKind::FillEllipse => 6,
            ShapeKind::StrokeEllipse => 7,
        }
    }

    pub fn of(value: i32) -> Option<Self> {
        match value {
            1 => Some(ShapeKind::LinkedPoints),
            2 => Some(ShapeKind::Line),
            3 => Some(ShapeKind::FillBox),
            4 => Some(ShapeKind::StrokeBox),
            5 => Some(ShapeKind::Cells),
            6 => Some(ShapeKind::FillEllipse),
            7 => Some(ShapeKind::StrokeEllipse),
            _ => None,
        }
    }

    fn is_box_like(self) -> bool {
        matches!(
            self,
            ShapeKind::Line
                | ShapeKind::FillBox
                | ShapeKind::StrokeBox
                | ShapeKind::FillEllipse
                | ShapeKind::StrokeEllipse
        )
    }
}

/// Something painted onto a layer in drawing coordinates.
///
/// Box-like shapes are given by two corners in any order; `Cells` pastes a
/// crate with its top-left corner at `(x, y)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Shape {
    LinkedPoints { points: Vec<(i32, i32)>, cell: Cell },
    Line { sx: i32, sy: i32, ex: i32, ey: i32, cell: Cell },
    FillBox { sx: i32, sy: i32, ex: i32, ey: i32, cell: Cell },
    StrokeBox { sx: i32, sy: i32, ex: i32, ey: i32, cell: Cell },
    Cells { x: i32, y: i32, crate_: Crate<Cell> },
    FillEllipse { sx: i32, sy: i32, ex: i32, ey: i32, cell: Cell },
    StrokeEllipse { sx: i32, sy: i32, ex: i32, ey: i32, cell: Cell },
}

impl Shape {
    /// Filled box covering `area`.
    pub fn fill_box(area: CellBox, cell: Cell) -> Self {
        Shape::FillBox { sx: area.lx, sy: area.ly, ex: area.rx(), ey: area.ry(), cell }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::LinkedPoints { .. } => ShapeKind::LinkedPoints,
            Shape::Line { .. } => ShapeKind::Line,
            Shape::FillBox { .. } => ShapeKind::FillBox,
            Shape::StrokeBox { .. } => ShapeKind::StrokeBox,
            Shape::Cells { .. } => ShapeKind::Cells,
            Shape::FillEllipse { .. } => ShapeKind::FillEllipse,
            Shape::StrokeEllipse { .. } => ShapeKind::StrokeEllipse,
        }
    }

    pub fn cell_type(&self) -> CellType {
        match self {
            Shape::Cells { crate_, .. } => crate_.canvas_type.cell_type(),
            Shape::LinkedPoints { cell, .. }
            | Shape::Line { cell, .. }
            | Shape::FillBox { cell, .. }
            | Shape::StrokeBox { cell, .. }
            | Shape::FillEllipse { cell, .. }
            | Shape::StrokeEllipse { cell, .. } => cell.cell_type(),
        }
    }

    /// Same outline painted with another cell. Pasted cells keep their own content.
    pub fn with_cell(self, cell: Cell) -> Shape {
        match self {
            Shape::LinkedPoints { points, .. } => Shape::LinkedPoints { points, cell },
            Shape::Cells { .. } => self,
            _ => match self.box_like() {
                Some((sx, sy, ex, ey, _)) => Shape::box_like_from(self.kind(), sx, sy, ex, ey, cell),
                None => self,
            },
        }
    }

    fn box_like(&self) -> Option<(i32, i32, i32, i32, &Cell)> {
        match self {
            Shape::Line { sx, sy, ex, ey, cell }
            | Shape::FillBox { sx, sy, ex, ey, cell }
            | Shape::StrokeBox { sx, sy, ex, ey, cell }
            | Shape::FillEllipse { sx, sy, ex, ey, cell }
            | Shape::StrokeEllipse { sx, sy, ex, ey, cell } => Some((*sx, *sy, *ex, *ey, cell)),
            Shape::LinkedPoints { .. } | Shape::Cells { .. } => None,
        }
    }

    fn box_like_from(kind: ShapeKind, sx: i32, sy: i32, ex: i32, ey: i32, cell: Cell) -> Self {
        match kind {
            ShapeKind::Line => Shape::Line { sx, sy, ex, ey, cell },
            ShapeKind::StrokeBox => Shape::StrokeBox { sx, sy, ex, ey, cell },
            ShapeKind::FillEllipse => Shape::FillEllipse { sx, sy, ex, ey, cell },
            ShapeKind::StrokeEllipse => Shape::StrokeEllipse { sx, sy, ex, ey, cell },
            _ => Shape::FillBox { sx, sy, ex, ey, cell },
        }
    }
}

impl BagStuffPacker for Shape {
    const PUT_IN_THE_BAG_VERSION: i32 = 1;

    fn put_in_the_bag(&self, bag: &mut PackableBag) {
        bag.put_int(self.kind().value());

        bag.put_stuff_with(1, |bag| match self {
            Shape::LinkedPoints { points, cell } => {
                bag.put_list(points, |bag, &(x, y)| {
                    bag.put_int(x);
                    bag.put_int(y);
                });
                bag.put_stuff(cell);
            }
            Shape::Cells { x, y, crate_ } => {
                bag.put_int(*x);
                bag.put_int(*y);
                bag.put_stuff(crate_);
            }
            _ => {
                if let Some((sx, sy, ex, ey, cell)) = self.box_like() {
                    bag.put_int(sx);
                    bag.put_int(sy);
                    bag.put_int(ex);
                    bag.put_int(ey);
                    bag.put_stuff(cell);
                }
            }
        });
    }
}

impl BagStuffUnpacker for Shape {
    fn get_out_of_the_bag(version: i32, bag: &mut UnpackableBag) -> BagResult<Self> {
        require_supported_stuff_version("Shape", 1, version)?;

        let ty = bag.get_int()?;
        let kind = ShapeKind::of(ty).ok_or(BagUnpackError::UnknownPolymorphicType { kind: "Shape", ty })?;

        bag.get_stuff_with(|version, bag| {
            require_supported_stuff_version("Shape", 1, version)?;

            match kind {
                ShapeKind::LinkedPoints => {
                    let points = bag.get_list(|bag| Ok((bag.get_int()?, bag.get_int()?)))?;
                    Ok(Shape::LinkedPoints { points, cell: bag.get_stuff()? })
                }
                ShapeKind::Cells => Ok(Shape::Cells { x: bag.get_int()?, y: bag.get_int()?, crate_: bag.get_stuff()? }),
                _ => {
                    debug_assert!(kind.is_box_like());
                    let (sx, sy, ex, ey) = (bag.get_int()?, bag.get_int()?, bag.get_int()?, bag.get_int()?);
                    Ok(Shape::box_like_from(kind, sx, sy, ex, ey, bag.get_stuff()?))
                }
            }
        })
    }
}

// ============================================================================
// PAINTER
// ============================================================================

/// Rasterizes shapes into individual cell writes.
pub struct Painter;

impl Painter {
    /// Drawing-space box touched by `shape`.
    pub fn bbox(shape: &Shape) -> CellBox {
        match shape {
            Shape::LinkedPoints { points, .. } => {
                let Some(&(fx, fy)) = points.first() else {
                    return CellBox::of_size(0, 0, 0, 0);
                };
                let (mut sx, mut sy, mut ex, mut ey) = (fx, fy, fx, fy);
                for &(x, y) in &points[1..] {
                    sx = sx.min(x);
                    sy = sy.min(y);
                    ex = ex.max(x);
                    ey = ey.max(y);
                }
                CellBox::of_coords(sx, sy, ex, ey)
            }
            Shape::Cells { x, y, crate_ } => CellBox::of_size(*x, *y, crate_.width, crate_.height),
            _ => match shape.box_like() {
                Some((sx, sy, ex, ey, _)) => CellBox::of_coords(sx, sy, ex, ey),
                None => CellBox::of_size(0, 0, 0, 0),
            },
        }
    }

    /// Call `pencil` for every cell of `shape`. A position may be visited more
    /// than once only by `LinkedPoints` crossing itself.
    pub fn paint(shape: &Shape, mut pencil: impl FnMut(i32, i32, &Cell)) {
        match shape {
            Shape::LinkedPoints { points, cell } => paint_linked_points(points, cell, &mut pencil),
            Shape::Line { sx, sy, ex, ey, cell } => paint_line(*sx, *sy, *ex, *ey, cell, 0, &mut pencil),
            Shape::FillBox { sx, sy, ex, ey, cell } => paint_fill_box(*sx, *sy, *ex, *ey, cell, &mut pencil),
            Shape::StrokeBox { sx, sy, ex, ey, cell } => paint_stroke_box(*sx, *sy, *ex, *ey, cell, &mut pencil),
            Shape::FillEllipse { sx, sy, ex, ey, cell } => {
                paint_fill_ellipse(*sx, *sy, *ex, *ey, cell, &mut pencil)
            }
            Shape::StrokeEllipse { sx, sy, ex, ey, cell } => {
                paint_stroke_ellipse(*sx, *sy, *ex, *ey, cell, &mut pencil)
            }
            Shape::Cells { x, y, crate_ } => {
                for (cy, row) in crate_.cells.iter().enumerate() {
                    for (cx, cell) in row.iter().enumerate() {
                        pencil(x + cx as i32, y + cy as i32, cell);
                    }
                }
            }
        }
    }
}

#[inline]
fn round_half_up(value: f64) -> i32 {
    (value + 0.5).floor() as i32
}

fn paint_linked_points(points: &[(i32, i32)], cell: &Cell, pencil: &mut impl FnMut(i32, i32, &Cell)) {
    let mut last: Option<(i32, i32)> = None;

    for &(x, y) in points {
        match last {
            Some((lx, ly)) if (x - lx).abs() > 1 || (y - ly).abs() > 1 => {
                // The previous point is already drawn.
                paint_line(lx, ly, x, y, cell, 1, pencil);
            }
            _ => pencil(x, y, cell),
        }
        last = Some((x, y));
    }
}

/// DDA along the major axis, starting at step `start`.
fn paint_line(sx: i32, sy: i32, ex: i32, ey: i32, cell: &Cell, start: i32, pencil: &mut impl FnMut(i32, i32, &Cell)) {
    let dx = ex - sx;
    let dy = ey - sy;

    if dx.abs() > dy.abs() {
        let mx = dx.signum();
        let my = dy as f64 / dx.abs() as f64;

        for i in start..=dx.abs() {
            pencil(sx + i * mx, sy + round_half_up(i as f64 * my), cell);
        }
    } else {
        let mx = if dy == 0 { 0.0 } else { dx as f64 / dy.abs() as f64 };
        let my = if dy < 0 { -1 } else { 1 };

        for i in start..=dy.abs() {
            pencil(sx + round_half_up(i as f64 * mx), sy + i * my, cell);
        }
    }
}

fn paint_fill_box(sx: i32, sy: i32, ex: i32, ey: i32, cell: &Cell, pencil: &mut impl FnMut(i32, i32, &Cell)) {
    let area = CellBox::of_coords(sx, sy, ex, ey);

    for y in area.ly..=area.ry() {
        for x in area.lx..=area.rx() {
            pencil(x, y, cell);
        }
    }
}

fn paint_stroke_box(sx: i32, sy: i32, ex: i32, ey: i32, cell: &Cell, pencil: &mut impl FnMut(i32, i32, &Cell)) {
    let area = CellBox::of_coords(sx, sy, ex, ey);
    let (lx, rx, ly, ry) = (area.lx, area.rx(), area.ly, area.ry());

    for x in lx..=rx {
        pencil(x, ly, cell);
    }

    if ly != ry {
        for x in lx..=rx {
            pencil(x, ry, cell);
        }
    }

    for y in (ly + 1)..ry {
        pencil(lx, y, cell);
        if lx != rx {
            pencil(rx, y, cell);
        }
    }
}

struct EllipseFrame {
    area: CellBox,
    mid_x: f64,
    mid_y: f64,
    sq_rad_x: f64,
    sq_rad_y: f64,
}

impl EllipseFrame {
    fn new(sx: i32, sy: i32, ex: i32, ey: i32) -> Self {
        let area = CellBox::of_coords(sx, sy, ex, ey);
        let rad_x = area.width as f64 * 0.5 - 0.125;
        let rad_y = area.height as f64 * 0.5 - 0.125;

        Self {
            area,
            mid_x: (area.lx + area.rx()) as f64 * 0.5,
            mid_y: (area.ly + area.ry()) as f64 * 0.5,
            sq_rad_x: rad_x * rad_x,
            sq_rad_y: rad_y * rad_y,
        }
    }

    fn compare(&self) -> f64 {
        self.sq_rad_x * self.sq_rad_y
    }
}

fn paint_fill_ellipse(sx: i32, sy: i32, ex: i32, ey: i32, cell: &Cell, pencil: &mut impl FnMut(i32, i32, &Cell)) {
    let frame = EllipseFrame::new(sx, sy, ex, ey);
    let compare = frame.compare();

    for y in frame.area.ly..=frame.area.ry() {
        let oy = y as f64 - frame.mid_y;
        let part = oy * oy * frame.sq_rad_x;

        for x in frame.area.lx..=frame.area.rx() {
            let ox = x as f64 - frame.mid_x;
            if ox * ox * frame.sq_rad_y + part <= compare {
                pencil(x, y, cell);
            }
        }
    }
}

fn paint_stroke_ellipse(sx: i32, sy: i32, ex: i32, ey: i32, cell: &Cell, pencil: &mut impl FnMut(i32, i32, &Cell)) {
    let frame = EllipseFrame::new(sx, sy, ex, ey);
    let compare = frame.compare();
    let (lx, rx, ly, ry) = (frame.area.lx, frame.area.rx(), frame.area.ly, frame.area.ry());

    let mut drawn = HashSet::new();

    // Rows first: one point on each side per row.
    for y in ly..=ry {
        let oy = y as f64 - frame.mid_y;
        let ox = ((compare - oy * oy * frame.sq_rad_x) / frame.sq_rad_y).sqrt();

        // NaN casts to 0, matching the truncation of an out-of-range row.
        let x1 = (frame.mid_x + ox) as i32;
        let x2 = rx - x1 + lx;

        pencil(x1, y, cell);
        drawn.insert((x1, y));

        if x1 != x2 {
            pencil(x2, y, cell);
            drawn.insert((x2, y));
        }
    }

    // Then columns, filling the gaps left on the flat parts.
    for x in lx..=rx {
        let ox = x as f64 - frame.mid_x;
        let oy = ((compare - ox * ox * frame.sq_rad_y) / frame.sq_rad_x).sqrt();

        let y1 = (frame.mid_y + oy) as i32;
        let y2 = ry - y1 + ly;

        if !drawn.contains(&(x, y1)) {
            pencil(x, y1, cell);

            if y1 != y2 && !drawn.contains(&(x, y2)) {
                pencil(x, y2, cell);
            }
        }
    }
}
