// ============================================================================
// GRAPHICS - layer stack edits and composition
// ============================================================================
//
//   action.rs  : the 19 reversible actions and their bag form
//   renderer.rs: grouped compositor from layers to SCII cells
//   engine.rs  : GraphicsEngine: validates, applies and reverts actions
// ============================================================================

pub mod action;
pub mod engine;
pub mod renderer;

pub use action::{GraphicsAction, GraphicsActionPair};
pub use engine::{GraphicsEngine, GraphicsState, SCREEN_SCII_HEIGHT, SCREEN_SCII_WIDTH};
