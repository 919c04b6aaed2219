// ============================================================================
// SCIIPAINT - ZX Spectrum SCII pixel editor core
// ============================================================================
//
// Modules:
//   bag       : versioned positional serialization (BAG1 text, BAG2 bitstream)
//   cell      : SCII and block cells, their channels
//   merger    : channel and cell merge rules
//   canvas    : the four canvas resolutions over one attribute grid
//   components: layers, palette, undo/redo history
//   ops       : boxes, crates, shapes and the shape rasterizer
//   graphics  : reversible actions, the compositor, the engine
//   project   : one open document and its recorded edits
//   io        : project files on disk, PNG screen export
//   settings  : persisted editor preferences
//   logger    : engine logging capability, tracing subscriber
//   cli       : headless command line
// ============================================================================

#![allow(clippy::too_many_arguments)]

pub mod bag;
pub mod canvas;
pub mod cell;
pub mod cli;
pub mod components;
pub mod error;
pub mod graphics;
pub mod io;
pub mod logger;
pub mod merger;
pub mod ops;
pub mod project;
pub mod settings;
