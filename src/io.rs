// ============================================================================
// PROJECT FILES AND SCREEN EXPORT
// ============================================================================
//
// Project files are a packed bag, signature first. PNG export draws the
// composed screen at 8x8 pixels per SCII cell with the border around it.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{ImageEncoder, ImageError, Rgba, RgbaImage};
use thiserror::Error;

use crate::bag::{BagFormat, BagUnpackError};
use crate::canvas::Canvas;
use crate::cell::{SciiCell, SciiChar, SciiColor, SciiLight};
use crate::logger::Logger;
use crate::project::Project;

/// Extension used for project files.
pub const PROJECT_EXTENSION: &str = "bpe";

/// Pixels per SCII cell side.
pub const CELL_PIXELS: u32 = 8;

/// Border width, in cells, around the exported screen.
pub const DEFAULT_BORDER_CELLS: u32 = 4;

const ZX_NORMAL: u8 = 0xD7;
const ZX_BRIGHT: u8 = 0xFF;

/// Error type for project file operations
#[derive(Error, Debug)]
pub enum ProjectFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File is empty")]
    Empty,

    #[error("Not a project file (found '{0}')")]
    NotAProject(String),

    #[error("Can't read project: {0}")]
    Unpack(#[from] BagUnpackError),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),
}

// ============================================================================
// PROJECT FILES
// ============================================================================

/// Peek at the signature of a project file without reading the rest.
pub fn peek_format(path: &Path) -> Result<BagFormat, ProjectFileError> {
    let mut head = [0u8; 4];
    let mut file = File::open(path)?;
    let read = file.read(&mut head)?;

    if read == 0 {
        return Err(ProjectFileError::Empty);
    }

    let head = String::from_utf8_lossy(&head[..read]).into_owned();
    BagFormat::detect(&head).ok_or(ProjectFileError::NotAProject(head))
}

/// Load `path` into `project`. On any error the project is left as it was.
pub fn load_project_into(project: &mut Project, path: &Path) -> Result<BagFormat, ProjectFileError> {
    let format = peek_format(path)?;
    let input = std::fs::read_to_string(path)?;

    project.unpack(&input)?;
    project.path = Some(path.to_path_buf());
    project.update_name_from_path();
    project.mark_clean();

    tracing::info!(path = %path.display(), format = ?format, "project loaded");
    Ok(format)
}

/// Open a project file as a new document.
pub fn open_project(path: &Path, logger: Arc<dyn Logger>, history_max_steps: usize) -> Result<Project, ProjectFileError> {
    let mut project = Project::new_untitled(1, logger);
    project.set_history_max_steps(history_max_steps);

    load_project_into(&mut project, path)?;
    Ok(project)
}

/// Save `project` to `path`. `history_limit` keeps only the newest steps (negative keeps all).
pub fn save_project(
    project: &mut Project,
    path: &Path,
    format: BagFormat,
    history_limit: i32,
) -> Result<(), ProjectFileError> {
    let packed = project.pack(format, history_limit);

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(packed.as_bytes())?;
    writer.flush()?;

    project.path = Some(path.to_path_buf());
    project.update_name_from_path();
    project.mark_clean();

    tracing::info!(path = %path.display(), format = ?format, bytes = packed.len(), "project saved");
    Ok(())
}

/// Whether the file still uses the legacy text format.
pub fn is_legacy_file(path: &Path) -> Result<bool, ProjectFileError> {
    Ok(peek_format(path)? == BagFormat::Legacy)
}

// ============================================================================
// SCREEN EXPORT
// ============================================================================

/// ZX Spectrum RGB for a color; transparent channels come out fully transparent.
pub fn zx_rgba(color: SciiColor, bright: SciiLight) -> Rgba<u8> {
    if color.is_transparent() {
        return Rgba([0, 0, 0, 0]);
    }

    let level = if bright == SciiLight::ON { ZX_BRIGHT } else { ZX_NORMAL };
    let value = color.value();
    let channel = |bit: i32| if value & bit != 0 { level } else { 0 };

    // GRB bit order: 1 blue, 2 red, 4 green.
    Rgba([channel(2), channel(4), channel(1), 0xFF])
}

/// Draw the composed screen and its border, one pixel per ZX pixel.
pub fn render_screen(screen: &Canvas, border: SciiColor, border_cells: u32) -> RgbaImage {
    let border_pixels = border_cells * CELL_PIXELS;
    let width = screen.scii_width().max(0) as u32 * CELL_PIXELS + border_pixels * 2;
    let height = screen.scii_height().max(0) as u32 * CELL_PIXELS + border_pixels * 2;

    let mut image = RgbaImage::from_pixel(width, height, zx_rgba(border, SciiLight::OFF));

    for sy in 0..screen.scii_height() {
        for sx in 0..screen.scii_width() {
            let cell = screen.get_scii_cell(sx, sy);
            let left = border_pixels + sx as u32 * CELL_PIXELS;
            let top = border_pixels + sy as u32 * CELL_PIXELS;

            for py in 0..CELL_PIXELS {
                for px in 0..CELL_PIXELS {
                    let pixel = if is_ink_pixel(&cell, px, py) {
                        zx_rgba(cell.ink, cell.bright)
                    } else {
                        zx_rgba(cell.paper, cell.bright)
                    };
                    image.put_pixel(left + px, top + py, pixel);
                }
            }
        }
    }

    image
}

// Block glyphs are drawn by quadrant. Other characters show as an ink square
// over the paper, since glyph shapes are not part of the document.
fn is_ink_pixel(cell: &SciiCell, px: u32, py: u32) -> bool {
    let half = CELL_PIXELS / 2;

    if cell.character.is_block() {
        let bit = match (px < half, py < half) {
            (false, true) => SciiChar::BLOCK_BIT_TR,
            (true, true) => SciiChar::BLOCK_BIT_TL,
            (false, false) => SciiChar::BLOCK_BIT_BR,
            (true, false) => SciiChar::BLOCK_BIT_BL,
        };
        return cell.character.block_bits() & bit != 0;
    }

    if cell.character.is_transparent() || cell.character == SciiChar::SPACE {
        return false;
    }

    let quarter = CELL_PIXELS / 4;
    (quarter..CELL_PIXELS - quarter).contains(&px) && (quarter..CELL_PIXELS - quarter).contains(&py)
}

/// Export the project's screen as a PNG, upscaled by `scale`.
pub fn export_png(project: &Project, path: &Path, scale: u32, border_cells: u32) -> Result<(), ProjectFileError> {
    let engine = project.engine();
    let mut image = render_screen(engine.preview(), engine.border_color(), border_cells);

    let scale = scale.max(1);
    if scale > 1 {
        image = image::imageops::resize(&image, image.width() * scale, image.height() * scale, FilterType::Nearest);
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    PngEncoder::new(&mut writer).write_image(image.as_raw(), image.width(), image.height(), image::ColorType::Rgba8)?;
    writer.flush()?;

    tracing::info!(path = %path.display(), width = image.width(), height = image.height(), "screen exported");
    Ok(())
}
