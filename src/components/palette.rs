// ============================================================================
// PALETTE - current paint and erase settings
// ============================================================================

use crate::bag::{BagResult, BagStuffPacker, BagStuffUnpacker, PackableBag, UnpackableBag, require_supported_stuff_version};
use crate::canvas::CanvasType;
use crate::cell::{BlockCell, Cell, SciiCell, SciiChar, SciiColor, SciiLight};

/// Which channels the eraser clears. A cleared channel is written as
/// force-transparent, the others as transparent so they survive the merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EraseFlags {
    pub scii_ink: bool,
    pub scii_paper: bool,
    pub scii_bright: bool,
    pub scii_flash: bool,
    pub scii_character: bool,
    pub block_color: bool,
    pub block_bright: bool,
}

impl Default for EraseFlags {
    fn default() -> Self {
        Self {
            scii_ink: true,
            scii_paper: true,
            scii_bright: true,
            scii_flash: true,
            scii_character: true,
            block_color: true,
            block_bright: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Palette {
    pub scii_ink: SciiColor,
    pub scii_paper: SciiColor,
    pub scii_bright: SciiLight,
    pub scii_flash: SciiLight,
    pub scii_character: SciiChar,
    pub block_color: SciiColor,
    pub block_bright: SciiLight,
    pub erase: EraseFlags,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            scii_ink: SciiColor::TRANSPARENT,
            scii_paper: SciiColor::TRANSPARENT,
            scii_bright: SciiLight::TRANSPARENT,
            scii_flash: SciiLight::TRANSPARENT,
            scii_character: SciiChar::TRANSPARENT,
            block_color: SciiColor::TRANSPARENT,
            block_bright: SciiLight::TRANSPARENT,
            erase: EraseFlags::default(),
        }
    }
}

fn erased<T>(flag: bool, force: T, keep: T) -> T {
    if flag { force } else { keep }
}

impl Palette {
    pub fn make_paint_cell(&self, canvas_type: CanvasType) -> Cell {
        match canvas_type {
            CanvasType::Scii => Cell::Scii(SciiCell {
                character: self.scii_character,
                ink: self.scii_ink,
                paper: self.scii_paper,
                bright: self.scii_bright,
                flash: self.scii_flash,
            }),
            _ => Cell::Block(BlockCell { color: self.block_color, bright: self.block_bright }),
        }
    }

    pub fn make_erase_cell(&self, canvas_type: CanvasType) -> Cell {
        let e = &self.erase;
        match canvas_type {
            CanvasType::Scii => Cell::Scii(SciiCell {
                character: erased(e.scii_character, SciiChar::FORCE_TRANSPARENT, SciiChar::TRANSPARENT),
                ink: erased(e.scii_ink, SciiColor::FORCE_TRANSPARENT, SciiColor::TRANSPARENT),
                paper: erased(e.scii_paper, SciiColor::FORCE_TRANSPARENT, SciiColor::TRANSPARENT),
                bright: erased(e.scii_bright, SciiLight::FORCE_TRANSPARENT, SciiLight::TRANSPARENT),
                flash: erased(e.scii_flash, SciiLight::FORCE_TRANSPARENT, SciiLight::TRANSPARENT),
            }),
            _ => Cell::Block(BlockCell {
                color: erased(e.block_color, SciiColor::FORCE_TRANSPARENT, SciiColor::TRANSPARENT),
                bright: erased(e.block_bright, SciiLight::FORCE_TRANSPARENT, SciiLight::TRANSPARENT),
            }),
        }
    }
}

impl BagStuffPacker for Palette {
    const PUT_IN_THE_BAG_VERSION: i32 = 3;

    fn put_in_the_bag(&self, bag: &mut PackableBag) {
        // v1
        bag.put_int(self.scii_ink.0);
        bag.put_int(self.scii_paper.0);
        bag.put_int(self.scii_bright.0);
        bag.put_int(self.scii_flash.0);
        bag.put_int(self.scii_character.0);

        // v2
        bag.put_int(self.block_color.0);
        bag.put_int(self.block_bright.0);

        // v3
        let e = &self.erase;
        for flag in [e.scii_ink, e.scii_paper, e.scii_bright, e.scii_flash, e.scii_character, e.block_color, e.block_bright] {
            bag.put_bool(flag);
        }
    }
}

impl BagStuffUnpacker for Palette {
    fn get_out_of_the_bag(version: i32, bag: &mut UnpackableBag) -> BagResult<Self> {
        require_supported_stuff_version("Palette", 3, version)?;

        let mut palette = Palette {
            scii_ink: SciiColor(bag.get_int()?),
            scii_paper: SciiColor(bag.get_int()?),
            scii_bright: SciiLight(bag.get_int()?),
            scii_flash: SciiLight(bag.get_int()?),
            scii_character: SciiChar(bag.get_int()?),
            ..Palette::default()
        };

        if version >= 2 {
            palette.block_color = SciiColor(bag.get_int()?);
            palette.block_bright = SciiLight(bag.get_int()?);
        }

        if version >= 3 {
            palette.erase = EraseFlags {
                scii_ink: bag.get_bool()?,
                scii_paper: bag.get_bool()?,
                scii_bright: bag.get_bool()?,
                scii_flash: bag.get_bool()?,
                scii_character: bag.get_bool()?,
                block_color: bag.get_bool()?,
                block_bright: bag.get_bool()?,
            };
        }

        Ok(palette)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::{BagFormat, pack_stuff, unpack_stuff};

    #[test]
    fn paint_cell_follows_canvas_cell_type() {
        let palette = Palette { scii_ink: SciiColor::RED, block_color: SciiColor::GREEN, ..Default::default() };
        assert_eq!(palette.make_paint_cell(CanvasType::Scii).as_scii().map(|c| c.ink), Some(SciiColor::RED));
        assert_eq!(palette.make_paint_cell(CanvasType::QBlock).as_block().map(|c| c.color), Some(SciiColor::GREEN));
    }

    #[test]
    fn erase_cell_forces_only_flagged_channels() {
        let palette = Palette { erase: EraseFlags { scii_ink: false, block_bright: false, ..Default::default() }, ..Default::default() };

        let scii = *palette.make_erase_cell(CanvasType::Scii).as_scii().unwrap();
        assert_eq!(scii.ink, SciiColor::TRANSPARENT);
        assert_eq!(scii.paper, SciiColor::FORCE_TRANSPARENT);
        assert_eq!(scii.character, SciiChar::FORCE_TRANSPARENT);

        let block = *palette.make_erase_cell(CanvasType::HBlock).as_block().unwrap();
        assert_eq!(block, BlockCell { color: SciiColor::FORCE_TRANSPARENT, bright: SciiLight::TRANSPARENT });
    }

    #[test]
    fn palette_survives_both_bag_formats() {
        let palette = Palette {
            scii_character: SciiChar(0x41),
            block_bright: SciiLight::ON,
            erase: EraseFlags { scii_flash: false, ..Default::default() },
            ..Default::default()
        };
        for format in [BagFormat::Legacy, BagFormat::Bitstream] {
            assert_eq!(unpack_stuff::<Palette>(&pack_stuff(&palette, format)).unwrap(), palette);
        }
    }

    #[test]
    fn version_one_palette_gets_defaults() {
        let mut bag = PackableBag::new();
        bag.put_stuff_with(1, |bag| {
            for value in [7, 0, 1, 0, 65] {
                bag.put_int(value);
            }
        });
        let palette: Palette = unpack_stuff(&bag.into_string()).unwrap();
        assert_eq!(palette.scii_ink, SciiColor::WHITE);
        assert_eq!(palette.block_color, SciiColor::TRANSPARENT);
        assert_eq!(palette.erase, EraseFlags::default());
    }
}
