// ============================================================================
// GRAPHICS ACTIONS - reversible document edits
// ============================================================================
//
// Every edit the engine understands is one of these values. Executing an
// action returns the action that reverts it, captured before the edit.

use std::fmt;

use crate::bag::{
    BagResult, BagStuffPacker, BagStuffUnpacker, BagUnpackError, PackableBag, UnpackableBag,
    require_supported_stuff_version,
};
use crate::canvas::CanvasType;
use crate::cell::{SciiCell, SciiColor, SciiLight};
use crate::components::layers::{CanvasLayer, LayerUid};
use crate::ops::region::Crate;
use crate::ops::shapes::Shape;

#[derive(Clone, PartialEq, Eq)]
pub enum GraphicsAction {
    SetBackgroundBorder { color: SciiColor },
    SetBackgroundColor { color: SciiColor },
    SetBackgroundBright { light: SciiLight },
    SetBackgroundVisible { is_visible: bool },
    SetBackgroundLocked { is_locked: bool },
    CreateLayer { canvas_type: CanvasType, layer_uid: LayerUid, on_top_of_layer_uid: LayerUid },
    ReplaceLayer { layer: CanvasLayer },
    InsertLayer { layer: CanvasLayer, on_top_of_layer_uid: LayerUid },
    DeleteLayer { layer_uid: LayerUid },
    SetLayerVisible { layer_uid: LayerUid, is_visible: bool },
    SetLayerLocked { layer_uid: LayerUid, is_locked: bool },
    MoveLayer { layer_uid: LayerUid, on_top_of_layer_uid: LayerUid },
    MergeShape { layer_uid: LayerUid, shape: Shape },
    ReplaceShape { layer_uid: LayerUid, shape: Shape },
    /// Overwrite SCII cells with their top-left corner at `(x, y)`.
    ReplaceCells { layer_uid: LayerUid, x: i32, y: i32, crate_: Crate<SciiCell> },
    MergeLayers { layer_uid: LayerUid, onto_layer_uid: LayerUid },
    UndoMergeLayers { insert_layer: CanvasLayer, insert_on_top_of_layer_uid: LayerUid, replace_layer: CanvasLayer },
    ConvertLayer { layer_uid: LayerUid, canvas_type: CanvasType },
    SetLayerMasked { layer_uid: LayerUid, is_masked: bool },
}

impl GraphicsAction {
    /// Stable id written to the bag.
    pub fn type_id(&self) -> i32 {
        match self {
            GraphicsAction::SetBackgroundBorder { .. } => 1,
            GraphicsAction::SetBackgroundColor { .. } => 2,
            GraphicsAction::SetBackgroundBright { .. } => 3,
            GraphicsAction::SetBackgroundVisible { .. } => 4,
            GraphicsAction::SetBackgroundLocked { .. } => 5,
            GraphicsAction::CreateLayer { .. } => 6,
            GraphicsAction::ReplaceLayer { .. } => 7,
            GraphicsAction::InsertLayer { .. } => 8,
            GraphicsAction::DeleteLayer { .. } => 9,
            GraphicsAction::SetLayerVisible { .. } => 10,
            GraphicsAction::SetLayerLocked { .. } => 11,
            GraphicsAction::MoveLayer { .. } => 12,
            GraphicsAction::MergeShape { .. } => 13,
            GraphicsAction::ReplaceShape { .. } => 14,
            GraphicsAction::ReplaceCells { .. } => 15,
            GraphicsAction::MergeLayers { .. } => 16,
            GraphicsAction::UndoMergeLayers { .. } => 17,
            GraphicsAction::ConvertLayer { .. } => 18,
            GraphicsAction::SetLayerMasked { .. } => 19,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GraphicsAction::SetBackgroundBorder { .. } => "SetBackgroundBorder",
            GraphicsAction::SetBackgroundColor { .. } => "SetBackgroundColor",
            GraphicsAction::SetBackgroundBright { .. } => "SetBackgroundBright",
            GraphicsAction::SetBackgroundVisible { .. } => "SetBackgroundVisible",
            GraphicsAction::SetBackgroundLocked { .. } => "SetBackgroundLocked",
            GraphicsAction::CreateLayer { .. } => "CreateLayer",
            GraphicsAction::ReplaceLayer { .. } => "ReplaceLayer",
            GraphicsAction::InsertLayer { .. } => "InsertLayer",
            GraphicsAction::DeleteLayer { .. } => "DeleteLayer",
            GraphicsAction::SetLayerVisible { .. } => "SetLayerVisible",
            GraphicsAction::SetLayerLocked { .. } => "SetLayerLocked",
            GraphicsAction::MoveLayer { .. } => "MoveLayer",
            GraphicsAction::MergeShape { .. } => "MergeShape",
            GraphicsAction::ReplaceShape { .. } => "ReplaceShape",
            GraphicsAction::ReplaceCells { .. } => "ReplaceCells",
            GraphicsAction::MergeLayers { .. } => "MergeLayers",
            GraphicsAction::UndoMergeLayers { .. } => "UndoMergeLayers",
            GraphicsAction::ConvertLayer { .. } => "ConvertLayer",
            GraphicsAction::SetLayerMasked { .. } => "SetLayerMasked",
        }
    }

    fn pack_payload(&self, bag: &mut PackableBag) {
        match self {
            GraphicsAction::SetBackgroundBorder { color } | GraphicsAction::SetBackgroundColor { color } => {
                bag.put_int(color.value());
            }
            GraphicsAction::SetBackgroundBright { light } => bag.put_int(light.value()),
            GraphicsAction::SetBackgroundVisible { is_visible } => bag.put_bool(*is_visible),
            GraphicsAction::SetBackgroundLocked { is_locked } => bag.put_bool(*is_locked),
            GraphicsAction::CreateLayer { canvas_type, layer_uid, on_top_of_layer_uid } => {
                bag.put_int(canvas_type.value());
                bag.put_string(layer_uid.as_str());
                bag.put_string(on_top_of_layer_uid.as_str());
            }
            GraphicsAction::ReplaceLayer { layer } => bag.put_stuff(layer),
            GraphicsAction::InsertLayer { layer, on_top_of_layer_uid } => {
                bag.put_stuff(layer);
                bag.put_string(on_top_of_layer_uid.as_str());
            }
            GraphicsAction::DeleteLayer { layer_uid } => bag.put_string(layer_uid.as_str()),
            GraphicsAction::SetLayerVisible { layer_uid, is_visible: value }
            | GraphicsAction::SetLayerLocked { layer_uid, is_locked: value }
            | GraphicsAction::SetLayerMasked { layer_uid, is_masked: value } => {
                bag.put_string(layer_uid.as_str());
                bag.put_bool(*value);
            }
            GraphicsAction::MoveLayer { layer_uid, on_top_of_layer_uid } => {
                bag.put_string(layer_uid.as_str());
                bag.put_string(on_top_of_layer_uid.as_str());
            }
            GraphicsAction::MergeShape { layer_uid, shape } | GraphicsAction::ReplaceShape { layer_uid, shape } => {
                bag.put_string(layer_uid.as_str());
                bag.put_stuff(shape);
            }
            GraphicsAction::ReplaceCells { layer_uid, x, y, crate_ } => {
                bag.put_string(layer_uid.as_str());
                bag.put_int(*x);
                bag.put_int(*y);
                bag.put_stuff(crate_);
            }
            GraphicsAction::MergeLayers { layer_uid, onto_layer_uid } => {
                bag.put_string(layer_uid.as_str());
                bag.put_string(onto_layer_uid.as_str());
            }
            GraphicsAction::UndoMergeLayers { insert_layer, insert_on_top_of_layer_uid, replace_layer } => {
                bag.put_stuff(insert_layer);
                bag.put_string(insert_on_top_of_layer_uid.as_str());
                bag.put_stuff(replace_layer);
            }
            GraphicsAction::ConvertLayer { layer_uid, canvas_type } => {
                bag.put_string(layer_uid.as_str());
                bag.put_int(canvas_type.value());
            }
        }
    }

    fn unpack_payload(ty: i32, bag: &mut UnpackableBag) -> BagResult<Self> {
        fn uid(bag: &mut UnpackableBag) -> BagResult<LayerUid> {
            Ok(LayerUid(bag.get_string()?))
        }

        Ok(match ty {
            1 => GraphicsAction::SetBackgroundBorder { color: SciiColor(bag.get_int()?) },
            2 => GraphicsAction::SetBackgroundColor { color: SciiColor(bag.get_int()?) },
            3 => GraphicsAction::SetBackgroundBright { light: SciiLight(bag.get_int()?) },
            4 => GraphicsAction::SetBackgroundVisible { is_visible: bag.get_bool()? },
            5 => GraphicsAction::SetBackgroundLocked { is_locked: bag.get_bool()? },
            6 => GraphicsAction::CreateLayer {
                canvas_type: CanvasType::of(bag.get_int()?)?,
                layer_uid: uid(bag)?,
                on_top_of_layer_uid: uid(bag)?,
            },
            7 => GraphicsAction::ReplaceLayer { layer: bag.get_stuff()? },
            8 => GraphicsAction::InsertLayer { layer: bag.get_stuff()?, on_top_of_layer_uid: uid(bag)? },
            9 => GraphicsAction::DeleteLayer { layer_uid: uid(bag)? },
            10 => GraphicsAction::SetLayerVisible { layer_uid: uid(bag)?, is_visible: bag.get_bool()? },
            11 => GraphicsAction::SetLayerLocked { layer_uid: uid(bag)?, is_locked: bag.get_bool()? },
            12 => GraphicsAction::MoveLayer { layer_uid: uid(bag)?, on_top_of_layer_uid: uid(bag)? },
            13 => GraphicsAction::MergeShape { layer_uid: uid(bag)?, shape: bag.get_stuff()? },
            14 => GraphicsAction::ReplaceShape { layer_uid: uid(bag)?, shape: bag.get_stuff()? },
            15 => GraphicsAction::ReplaceCells {
                layer_uid: uid(bag)?,
                x: bag.get_int()?,
                y: bag.get_int()?,
                crate_: bag.get_stuff()?,
            },
            16 => GraphicsAction::MergeLayers { layer_uid: uid(bag)?, onto_layer_uid: uid(bag)? },
            17 => GraphicsAction::UndoMergeLayers {
                insert_layer: bag.get_stuff()?,
                insert_on_top_of_layer_uid: uid(bag)?,
                replace_layer: bag.get_stuff()?,
            },
            18 => GraphicsAction::ConvertLayer { layer_uid: uid(bag)?, canvas_type: CanvasType::of(bag.get_int()?)? },
            19 => GraphicsAction::SetLayerMasked { layer_uid: uid(bag)?, is_masked: bag.get_bool()? },
            _ => return Err(BagUnpackError::UnknownPolymorphicType { kind: "GraphicsAction", ty }),
        })
    }
}

// Layers and crates print as summaries so log lines stay short.
impl fmt::Debug for GraphicsAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name())?;
        match self {
            GraphicsAction::SetBackgroundBorder { color } | GraphicsAction::SetBackgroundColor { color } => {
                write!(f, "color={:?}", color)?
            }
            GraphicsAction::SetBackgroundBright { light } => write!(f, "light={:?}", light)?,
            GraphicsAction::SetBackgroundVisible { is_visible } => write!(f, "is_visible={}", is_visible)?,
            GraphicsAction::SetBackgroundLocked { is_locked } => write!(f, "is_locked={}", is_locked)?,
            GraphicsAction::CreateLayer { canvas_type, layer_uid, on_top_of_layer_uid } => write!(
                f,
                "canvas_type={:?}, layer_uid={}, on_top_of_layer_uid={}",
                canvas_type, layer_uid, on_top_of_layer_uid
            )?,
            GraphicsAction::ReplaceLayer { layer } => write!(f, "layer={}", layer.uid)?,
            GraphicsAction::InsertLayer { layer, on_top_of_layer_uid } => {
                write!(f, "layer={}, on_top_of_layer_uid={}", layer.uid, on_top_of_layer_uid)?
            }
            GraphicsAction::DeleteLayer { layer_uid } => write!(f, "layer_uid={}", layer_uid)?,
            GraphicsAction::SetLayerVisible { layer_uid, is_visible: value }
            | GraphicsAction::SetLayerLocked { layer_uid, is_locked: value }
            | GraphicsAction::SetLayerMasked { layer_uid, is_masked: value } => {
                write!(f, "layer_uid={}, value={}", layer_uid, value)?
            }
            GraphicsAction::MoveLayer { layer_uid, on_top_of_layer_uid } => {
                write!(f, "layer_uid={}, on_top_of_layer_uid={}", layer_uid, on_top_of_layer_uid)?
            }
            GraphicsAction::MergeShape { layer_uid, shape } | GraphicsAction::ReplaceShape { layer_uid, shape } => {
                write!(f, "layer_uid={}, shape={:?}", layer_uid, shape.kind())?
            }
            GraphicsAction::ReplaceCells { layer_uid, x, y, crate_ } => {
                write!(f, "layer_uid={}, x={}, y={}, crate={:?}", layer_uid, x, y, crate_)?
            }
            GraphicsAction::MergeLayers { layer_uid, onto_layer_uid } => {
                write!(f, "layer_uid={}, onto_layer_uid={}", layer_uid, onto_layer_uid)?
            }
            GraphicsAction::UndoMergeLayers { insert_layer, insert_on_top_of_layer_uid, replace_layer } => write!(
                f,
                "insert_layer={}, insert_on_top_of_layer_uid={}, replace_layer={}",
                insert_layer.uid, insert_on_top_of_layer_uid, replace_layer.uid
            )?,
            GraphicsAction::ConvertLayer { layer_uid, canvas_type } => {
                write!(f, "layer_uid={}, canvas_type={:?}", layer_uid, canvas_type)?
            }
        }
        write!(f, ")")
    }
}

impl BagStuffPacker for GraphicsAction {
    const PUT_IN_THE_BAG_VERSION: i32 = 1;

    fn put_in_the_bag(&self, bag: &mut PackableBag) {
        bag.put_int(self.type_id());
        bag.put_stuff_with(1, |bag| self.pack_payload(bag));
    }
}

impl BagStuffUnpacker for GraphicsAction {
    fn get_out_of_the_bag(version: i32, bag: &mut UnpackableBag) -> BagResult<Self> {
        require_supported_stuff_version("GraphicsAction", 1, version)?;

        let ty = bag.get_int()?;
        bag.get_stuff_with(|version, bag| {
            require_supported_stuff_version("GraphicsAction", 1, version)?;
            GraphicsAction::unpack_payload(ty, bag)
        })
    }
}

/// An executed action together with the action that reverts it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphicsActionPair {
    pub action: GraphicsAction,
    pub undo_action: GraphicsAction,
}

impl GraphicsActionPair {
    pub fn new(action: GraphicsAction, undo_action: GraphicsAction) -> Self {
        Self { action, undo_action }
    }
}

impl BagStuffPacker for GraphicsActionPair {
    const PUT_IN_THE_BAG_VERSION: i32 = 1;

    fn put_in_the_bag(&self, bag: &mut PackableBag) {
        bag.put_stuff(&self.action);
        bag.put_stuff(&self.undo_action);
    }
}

impl BagStuffUnpacker for GraphicsActionPair {
    fn get_out_of_the_bag(version: i32, bag: &mut UnpackableBag) -> BagResult<Self> {
        require_supported_stuff_version("GraphicsActionPair", 1, version)?;
        Ok(Self { action: bag.get_stuff()?, undo_action: bag.get_stuff()? })
    }
}
