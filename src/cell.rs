// ============================================================================
// CELL MODEL - SCII attribute cells and block sub-cells
// ============================================================================
//
// Every channel (character, color, light) is a small integer with two
// sentinels: `TRANSPARENT` (-1, show what is below) and `FORCE_TRANSPARENT`
// (-2, clear to transparent whatever is below). The second one is only a merge
// operand and is normalized away before anything is stored.

use std::fmt;

use crate::bag::{
    BagResult, BagStuffPacker, BagStuffUnpacker, BagUnpackError, PackableBag, UnpackableBag,
    require_supported_stuff_version,
};
use crate::error::IllegalArgument;
use crate::merger;

const VALUE_TRANSPARENT: i32 = -1;
const VALUE_FORCE_TRANSPARENT: i32 = -2;

macro_rules! channel {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub i32);

        impl $name {
            pub const TRANSPARENT: Self = Self(VALUE_TRANSPARENT);
            pub const FORCE_TRANSPARENT: Self = Self(VALUE_FORCE_TRANSPARENT);

            pub fn value(self) -> i32 {
                self.0
            }

            /// Both sentinels count as transparent.
            pub fn is_transparent(self) -> bool {
                self.0 < 0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

channel!(
    /// ZX Spectrum color index, 0..=7.
    SciiColor
);

channel!(
    /// Bright / flash bit.
    SciiLight
);

channel!(
    /// ZX Spectrum character code.
    SciiChar
);

impl SciiColor {
    pub const BLACK: Self = Self(0);
    pub const NAVY: Self = Self(1);
    pub const RED: Self = Self(2);
    pub const MAGENTA: Self = Self(3);
    pub const GREEN: Self = Self(4);
    pub const BLUE: Self = Self(5);
    pub const YELLOW: Self = Self(6);
    pub const WHITE: Self = Self(7);
}

impl SciiLight {
    pub const OFF: Self = Self(0);
    pub const ON: Self = Self(1);
}

impl SciiChar {
    pub const SPACE: Self = Self(32);

    pub const BLOCK_BIT_TR: i32 = 0x01;
    pub const BLOCK_BIT_TL: i32 = 0x02;
    pub const BLOCK_BIT_BR: i32 = 0x04;
    pub const BLOCK_BIT_BL: i32 = 0x08;
    pub const BLOCK_MASK: i32 = 0x0F;

    pub const BLOCK_VALUE_FIRST: i32 = 0x80;
    pub const BLOCK_VALUE_LAST: i32 = 0x8F;

    pub const BLOCK_SPACE: Self = Self(Self::BLOCK_VALUE_FIRST);
    pub const BLOCK_HORIZONTAL_TOP: Self = Self(Self::BLOCK_VALUE_FIRST | Self::BLOCK_BIT_TR | Self::BLOCK_BIT_TL);
    pub const BLOCK_VERTICAL_LEFT: Self = Self(Self::BLOCK_VALUE_FIRST | Self::BLOCK_BIT_TL | Self::BLOCK_BIT_BL);
    pub const BLOCK_FULL: Self = Self(Self::BLOCK_VALUE_LAST);

    /// True for the 16 quadrant glyphs 0x80..=0x8F.
    pub fn is_block(self) -> bool {
        (Self::BLOCK_VALUE_FIRST..=Self::BLOCK_VALUE_LAST).contains(&self.0)
    }

    /// Quadrant bits of a block glyph.
    pub fn block_bits(self) -> i32 {
        self.0 & Self::BLOCK_MASK
    }
}

// ============================================================================
// CELLS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CellType {
    Scii,
    Block,
}

impl CellType {
    pub fn value(self) -> i32 {
        match self {
            CellType::Scii => 1,
            CellType::Block => 2,
        }
    }

    pub fn of(value: i32) -> Result<Self, IllegalArgument> {
        match value {
            1 => Ok(CellType::Scii),
            2 => Ok(CellType::Block),
            _ => Err(IllegalArgument::unknown_enum_value("CellType", value)),
        }
    }

    pub fn transparent_cell(self) -> Cell {
        match self {
            CellType::Scii => Cell::Scii(SciiCell::TRANSPARENT),
            CellType::Block => Cell::Block(BlockCell::TRANSPARENT),
        }
    }

    fn name(self) -> &'static str {
        match self {
            CellType::Scii => "SciiCell",
            CellType::Block => "BlockCell",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SciiCell {
    pub character: SciiChar,
    pub ink: SciiColor,
    pub paper: SciiColor,
    pub bright: SciiLight,
    pub flash: SciiLight,
}

impl SciiCell {
    pub const TRANSPARENT: Self = Self {
        character: SciiChar::TRANSPARENT,
        ink: SciiColor::TRANSPARENT,
        paper: SciiColor::TRANSPARENT,
        bright: SciiLight::TRANSPARENT,
        flash: SciiLight::TRANSPARENT,
    };

    pub fn new(character: SciiChar, ink: SciiColor, paper: SciiColor, bright: SciiLight, flash: SciiLight) -> Self {
        Self { character, ink, paper, bright, flash }
    }

    pub fn is_transparent(&self) -> bool {
        *self == Self::TRANSPARENT
    }

    /// Place `self` over `onto`.
    pub fn merge(&self, onto: &SciiCell) -> SciiCell {
        merger::merge_scii_cell(self, onto)
    }
}

/// One sub-cell pixel of a block canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockCell {
    pub color: SciiColor,
    pub bright: SciiLight,
}

impl BlockCell {
    pub const TRANSPARENT: Self = Self { color: SciiColor::TRANSPARENT, bright: SciiLight::TRANSPARENT };

    pub fn new(color: SciiColor, bright: SciiLight) -> Self {
        Self { color, bright }
    }

    pub fn is_transparent(&self) -> bool {
        *self == Self::TRANSPARENT
    }

    pub fn merge(&self, onto: &BlockCell) -> BlockCell {
        merger::merge_block_cell(self, onto, onto.bright)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cell {
    Scii(SciiCell),
    Block(BlockCell),
}

impl Cell {
    pub fn cell_type(&self) -> CellType {
        match self {
            Cell::Scii(_) => CellType::Scii,
            Cell::Block(_) => CellType::Block,
        }
    }

    pub fn is_transparent(&self) -> bool {
        match self {
            Cell::Scii(cell) => cell.is_transparent(),
            Cell::Block(cell) => cell.is_transparent(),
        }
    }

    pub fn as_scii(&self) -> Option<&SciiCell> {
        match self {
            Cell::Scii(cell) => Some(cell),
            Cell::Block(_) => None,
        }
    }

    pub fn as_block(&self) -> Option<&BlockCell> {
        match self {
            Cell::Block(cell) => Some(cell),
            Cell::Scii(_) => None,
        }
    }
}

impl From<SciiCell> for Cell {
    fn from(cell: SciiCell) -> Self {
        Cell::Scii(cell)
    }
}

impl From<BlockCell> for Cell {
    fn from(cell: BlockCell) -> Self {
        Cell::Block(cell)
    }
}

// ============================================================================
// MERGE CELLS - two block sub-cells sharing one SCII cell
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HBlockMergeCell {
    pub top_color: SciiColor,
    pub bottom_color: SciiColor,
    pub bright: SciiLight,
}

impl HBlockMergeCell {
    pub const TRANSPARENT: Self = Self {
        top_color: SciiColor::TRANSPARENT,
        bottom_color: SciiColor::TRANSPARENT,
        bright: SciiLight::TRANSPARENT,
    };

    pub fn merge(&self, onto: &HBlockMergeCell) -> HBlockMergeCell {
        HBlockMergeCell {
            top_color: merger::merge_color(self.top_color, onto.top_color),
            bottom_color: merger::merge_color(self.bottom_color, onto.bottom_color),
            bright: merger::merge_light(self.bright, onto.bright),
        }
    }

    pub fn to_scii_cell(&self) -> SciiCell {
        block_pair_scii_cell(SciiChar::BLOCK_HORIZONTAL_TOP, self.top_color, self.bottom_color, self.bright)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VBlockMergeCell {
    pub left_color: SciiColor,
    pub right_color: SciiColor,
    pub bright: SciiLight,
}

impl VBlockMergeCell {
    pub const TRANSPARENT: Self = Self {
        left_color: SciiColor::TRANSPARENT,
        right_color: SciiColor::TRANSPARENT,
        bright: SciiLight::TRANSPARENT,
    };

    pub fn merge(&self, onto: &VBlockMergeCell) -> VBlockMergeCell {
        VBlockMergeCell {
            left_color: merger::merge_color(self.left_color, onto.left_color),
            right_color: merger::merge_color(self.right_color, onto.right_color),
            bright: merger::merge_light(self.bright, onto.bright),
        }
    }

    pub fn to_scii_cell(&self) -> SciiCell {
        block_pair_scii_cell(SciiChar::BLOCK_VERTICAL_LEFT, self.left_color, self.right_color, self.bright)
    }
}

fn block_pair_scii_cell(glyph: SciiChar, ink: SciiColor, paper: SciiColor, bright: SciiLight) -> SciiCell {
    if ink.is_transparent() && paper.is_transparent() {
        SciiCell::TRANSPARENT
    } else {
        SciiCell { character: glyph, ink, paper, bright, flash: SciiLight::TRANSPARENT }
    }
}

// ============================================================================
// BAG FORMAT
// ============================================================================

const CELL_VERSION: i32 = 1;
const CELL_PAYLOAD_VERSION: i32 = 1;

fn put_scii_payload(bag: &mut PackableBag, cell: &SciiCell) {
    bag.put_stuff_with(CELL_PAYLOAD_VERSION, |bag| {
        bag.put_int(cell.character.0);
        bag.put_int(cell.ink.0);
        bag.put_int(cell.paper.0);
        bag.put_int(cell.bright.0);
        bag.put_int(cell.flash.0);
    });
}

fn put_block_payload(bag: &mut PackableBag, cell: &BlockCell) {
    bag.put_stuff_with(CELL_PAYLOAD_VERSION, |bag| {
        bag.put_int(cell.color.0);
        bag.put_int(cell.bright.0);
    });
}

impl BagStuffPacker for Cell {
    const PUT_IN_THE_BAG_VERSION: i32 = CELL_VERSION;

    fn put_in_the_bag(&self, bag: &mut PackableBag) {
        bag.put_int(self.cell_type().value());
        match self {
            Cell::Scii(cell) => put_scii_payload(bag, cell),
            Cell::Block(cell) => put_block_payload(bag, cell),
        }
    }
}

impl BagStuffUnpacker for Cell {
    fn get_out_of_the_bag(version: i32, bag: &mut UnpackableBag) -> BagResult<Self> {
        require_supported_stuff_version("Cell", CELL_VERSION, version)?;

        match bag.get_int()? {
            1 => bag.get_stuff_with(|version, bag| {
                require_supported_stuff_version("SciiCell", CELL_PAYLOAD_VERSION, version)?;
                Ok(Cell::Scii(SciiCell {
                    character: SciiChar(bag.get_int()?),
                    ink: SciiColor(bag.get_int()?),
                    paper: SciiColor(bag.get_int()?),
                    bright: SciiLight(bag.get_int()?),
                    flash: SciiLight(bag.get_int()?),
                }))
            }),
            2 => bag.get_stuff_with(|version, bag| {
                require_supported_stuff_version("BlockCell", CELL_PAYLOAD_VERSION, version)?;
                Ok(Cell::Block(BlockCell { color: SciiColor(bag.get_int()?), bright: SciiLight(bag.get_int()?) }))
            }),
            ty => Err(BagUnpackError::UnknownPolymorphicType { kind: "Cell", ty }),
        }
    }
}

// SciiCell and BlockCell are stored in their polymorphic `Cell` form.

impl BagStuffPacker for SciiCell {
    const PUT_IN_THE_BAG_VERSION: i32 = CELL_VERSION;

    fn put_in_the_bag(&self, bag: &mut PackableBag) {
        Cell::Scii(*self).put_in_the_bag(bag);
    }
}

impl BagStuffUnpacker for SciiCell {
    fn get_out_of_the_bag(version: i32, bag: &mut UnpackableBag) -> BagResult<Self> {
        match Cell::get_out_of_the_bag(version, bag)? {
            Cell::Scii(cell) => Ok(cell),
            other => Err(BagUnpackError::MismatchedType {
                expected: CellType::Scii.name(),
                found: other.cell_type().name(),
            }),
        }
    }
}

impl BagStuffPacker for BlockCell {
    const PUT_IN_THE_BAG_VERSION: i32 = CELL_VERSION;

    fn put_in_the_bag(&self, bag: &mut PackableBag) {
        Cell::Block(*self).put_in_the_bag(bag);
    }
}

impl BagStuffUnpacker for BlockCell {
    fn get_out_of_the_bag(version: i32, bag: &mut UnpackableBag) -> BagResult<Self> {
        match Cell::get_out_of_the_bag(version, bag)? {
            Cell::Block(cell) => Ok(cell),
            other => Err(BagUnpackError::MismatchedType {
                expected: CellType::Block.name(),
                found: other.cell_type().name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::{BagFormat, pack_stuff, unpack_stuff};

    #[test]
    fn cell_type_rejects_unknown_values() {
        assert_eq!(CellType::of(1).unwrap(), CellType::Scii);
        assert_eq!(CellType::of(2).unwrap(), CellType::Block);
        assert!(CellType::of(99).is_err());
    }

    #[test]
    fn both_sentinels_are_transparent() {
        assert!(SciiColor::TRANSPARENT.is_transparent());
        assert!(SciiColor::FORCE_TRANSPARENT.is_transparent());
        assert!(!SciiColor::BLACK.is_transparent());
    }

    #[test]
    fn block_glyph_constants() {
        assert_eq!(SciiChar::BLOCK_HORIZONTAL_TOP.0, 0x83);
        assert_eq!(SciiChar::BLOCK_VERTICAL_LEFT.0, 0x8A);
        assert!(SciiChar::BLOCK_FULL.is_block());
        assert!(!SciiChar::SPACE.is_block());
    }

    #[test]
    fn hblock_merge_cell_reduces_to_top_glyph() {
        let cell = HBlockMergeCell {
            top_color: SciiColor::RED,
            bottom_color: SciiColor::TRANSPARENT,
            bright: SciiLight::ON,
        };
        let scii = cell.to_scii_cell();
        assert_eq!(scii.character, SciiChar::BLOCK_HORIZONTAL_TOP);
        assert_eq!(scii.ink, SciiColor::RED);
        assert_eq!(scii.paper, SciiColor::TRANSPARENT);
        assert_eq!(scii.flash, SciiLight::TRANSPARENT);
        assert_eq!(HBlockMergeCell::TRANSPARENT.to_scii_cell(), SciiCell::TRANSPARENT);
    }

    #[test]
    fn vblock_merge_cell_merges_channel_wise() {
        let top = VBlockMergeCell {
            left_color: SciiColor::TRANSPARENT,
            right_color: SciiColor::GREEN,
            bright: SciiLight::TRANSPARENT,
        };
        let below = VBlockMergeCell { left_color: SciiColor::BLUE, right_color: SciiColor::RED, bright: SciiLight::ON };
        assert_eq!(
            top.merge(&below),
            VBlockMergeCell { left_color: SciiColor::BLUE, right_color: SciiColor::GREEN, bright: SciiLight::ON }
        );
    }

    #[test]
    fn cells_survive_both_bag_formats() {
        let scii = SciiCell::new(SciiChar(65), SciiColor::WHITE, SciiColor::NAVY, SciiLight::ON, SciiLight::OFF);
        let block = BlockCell::new(SciiColor::YELLOW, SciiLight::TRANSPARENT);

        for format in [BagFormat::Legacy, BagFormat::Bitstream] {
            assert_eq!(unpack_stuff::<SciiCell>(&pack_stuff(&scii, format)).unwrap(), scii);
            assert_eq!(unpack_stuff::<Cell>(&pack_stuff(&Cell::Block(block), format)).unwrap(), Cell::Block(block));
        }
    }

    #[test]
    fn unpacking_the_wrong_cell_kind_fails() {
        let packed = pack_stuff(&BlockCell::TRANSPARENT, BagFormat::Bitstream);
        assert_eq!(
            unpack_stuff::<SciiCell>(&packed).unwrap_err(),
            BagUnpackError::MismatchedType { expected: "SciiCell", found: "BlockCell" }
        );
    }

    #[test]
    fn unknown_cell_type_is_polymorphic_error() {
        let mut bag = PackableBag::new();
        bag.put_stuff_with(1, |bag| {
            bag.put_int(9);
            bag.put_stuff_with(1, |_| {});
        });
        assert_eq!(
            unpack_stuff::<Cell>(&bag.into_string()).unwrap_err(),
            BagUnpackError::UnknownPolymorphicType { kind: "Cell", ty: 9 }
        );
    }
}
