use std::fmt;

use uuid::Uuid;

use crate::bag::{BagResult, BagStuffPacker, BagStuffUnpacker, PackableBag, UnpackableBag, require_supported_stuff_version};
use crate::canvas::{Canvas, CanvasType};
use crate::cell::{SciiCell, SciiChar, SciiColor, SciiLight};

// ============================================================================
// LAYER UID
// ============================================================================

/// Opaque layer identifier. The background layer always has the empty uid.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LayerUid(pub String);

impl LayerUid {
    pub const BACKGROUND_VALUE: &'static str = "";

    pub fn background() -> Self {
        LayerUid(String::new())
    }

    pub fn new(value: impl Into<String>) -> Self {
        LayerUid(value.into())
    }

    pub fn is_background(&self) -> bool {
        self.0 == Self::BACKGROUND_VALUE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for LayerUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayerUid({})", self.0)
    }
}

impl fmt::Display for LayerUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_background() { f.write_str("<background>") } else { f.write_str(&self.0) }
    }
}

/// Source of fresh layer uids.
pub trait UidFactory {
    fn create_uid(&mut self) -> String;
}

/// Random v4 uuids.
#[derive(Default)]
pub struct UuidFactory;

impl UidFactory for UuidFactory {
    fn create_uid(&mut self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Predictable uids (`layer-1`, `layer-2`, ...), for scripted sessions and tests.
#[derive(Default)]
pub struct CountingUidFactory {
    next: u32,
}

impl UidFactory for CountingUidFactory {
    fn create_uid(&mut self) -> String {
        self.next += 1;
        format!("layer-{}", self.next)
    }
}

// ============================================================================
// BACKGROUND LAYER
// ============================================================================

/// Solid paper color under every canvas layer, plus the screen border.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackgroundLayer {
    pub is_visible: bool,
    pub is_locked: bool,
    pub border: SciiColor,
    pub color: SciiColor,
    pub bright: SciiLight,
}

impl Default for BackgroundLayer {
    fn default() -> Self {
        Self {
            is_visible: true,
            is_locked: false,
            border: SciiColor::BLACK,
            color: SciiColor::TRANSPARENT,
            bright: SciiLight::OFF,
        }
    }
}

impl BackgroundLayer {
    pub fn uid(&self) -> LayerUid {
        LayerUid::background()
    }

    /// The background as a filled space character.
    pub fn scii_cell(&self) -> SciiCell {
        SciiCell {
            character: if self.color.is_transparent() { SciiChar::TRANSPARENT } else { SciiChar::SPACE },
            ink: self.color,
            paper: self.color,
            bright: self.bright,
            flash: SciiLight::OFF,
        }
    }
}

impl BagStuffPacker for BackgroundLayer {
    const PUT_IN_THE_BAG_VERSION: i32 = 1;

    fn put_in_the_bag(&self, bag: &mut PackableBag) {
        bag.put_bool(self.is_visible);
        bag.put_bool(self.is_locked);
        bag.put_int(self.border.0);
        bag.put_int(self.color.0);
        bag.put_int(self.bright.0);
    }
}

impl BagStuffUnpacker for BackgroundLayer {
    fn get_out_of_the_bag(version: i32, bag: &mut UnpackableBag) -> BagResult<Self> {
        require_supported_stuff_version("BackgroundLayer", 1, version)?;

        Ok(BackgroundLayer {
            is_visible: bag.get_bool()?,
            is_locked: bag.get_bool()?,
            border: SciiColor(bag.get_int()?),
            color: SciiColor(bag.get_int()?),
            bright: SciiLight(bag.get_int()?),
        })
    }
}

// ============================================================================
// CANVAS LAYER
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanvasLayer {
    pub uid: LayerUid,
    pub is_visible: bool,
    pub is_locked: bool,
    /// Painting only touches drawing cells that are already opaque.
    pub is_masked: bool,
    pub canvas: Canvas,
}

impl CanvasLayer {
    pub fn new(uid: LayerUid, canvas: Canvas) -> Self {
        Self { uid, is_visible: true, is_locked: false, is_masked: false, canvas }
    }

    pub fn canvas_type(&self) -> CanvasType {
        self.canvas.canvas_type()
    }

    /// Whether painting may change the drawing cell at this position.
    pub fn is_opaque(&self, drawing_x: i32, drawing_y: i32) -> bool {
        !self.is_masked || !self.canvas.get_drawing_cell(drawing_x, drawing_y).is_transparent()
    }

    /// Deep copy that keeps the canvas mutation counter.
    pub fn copy_mutable(&self) -> Self {
        Self { canvas: self.canvas.copy_mutable(), ..self.clone() }
    }
}

impl BagStuffPacker for CanvasLayer {
    const PUT_IN_THE_BAG_VERSION: i32 = 2;

    fn put_in_the_bag(&self, bag: &mut PackableBag) {
        // v1
        bag.put_string(self.uid.as_str());
        bag.put_bool(self.is_visible);
        bag.put_bool(self.is_locked);
        bag.put_stuff(&self.canvas);

        // v2
        bag.put_bool(self.is_masked);
    }
}

impl BagStuffUnpacker for CanvasLayer {
    fn get_out_of_the_bag(version: i32, bag: &mut UnpackableBag) -> BagResult<Self> {
        require_supported_stuff_version("CanvasLayer", 2, version)?;

        let uid = LayerUid(bag.get_string()?);
        let is_visible = bag.get_bool()?;
        let is_locked = bag.get_bool()?;
        let canvas = bag.get_stuff::<Canvas>()?;
        let is_masked = if version >= 2 { bag.get_bool()? } else { false };

        Ok(CanvasLayer { uid, is_visible, is_locked, is_masked, canvas })
    }
}
