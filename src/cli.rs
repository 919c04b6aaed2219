// ============================================================================
// SciiPaint CLI: headless project inspection, export and migration
// ============================================================================
//
// Usage examples:
//   sciipaint info art.bpe
//   sciipaint render art.bpe -o art.png --scale 3
//   sciipaint render "shots/*.bpe" --output-dir png/
//   sciipaint migrate "old/*.bpe" --keep-history 100
//   sciipaint undo-all art.bpe
//
// Everything runs synchronously on the current thread.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, bail, ensure};
use clap::{ArgAction, Parser, Subcommand};
use tracing::Level;

use crate::bag::{BagFormat, pack_stuff};
use crate::io::{self, PROJECT_EXTENSION};
use crate::logger::{Logger, TracingLogger};
use crate::project::Project;
use crate::settings::EditorSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// SciiPaint headless project tool.
#[derive(Parser, Debug)]
#[command(
    name = "sciipaint",
    version,
    about = "SciiPaint headless project tool",
    long_about = "Inspect, export and migrate SciiPaint project files without opening the editor.\n\n\
                  Example:\n  \
                  sciipaint render art.bpe -o art.png --scale 3\n  \
                  sciipaint migrate \"old/*.bpe\" --keep-history 100"
)]
pub struct CliArgs {
    /// More output: -v info, -vv debug, -vvv trace. RUST_LOG directives are honoured too.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also write the session log file.
    #[arg(long, global = true)]
    pub log_file: bool,

    /// Read settings from this file instead of the platform config location.
    #[arg(long, value_name = "FILE", global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print layers and history of each project.
    Info {
        /// Project file(s). Glob patterns accepted (e.g. "*.bpe").
        #[arg(required = true, num_args = 1..)]
        input: Vec<String>,
    },

    /// Export the composed screen, border included, as PNG.
    Render {
        /// Project file(s). Glob patterns accepted.
        #[arg(required = true, num_args = 1..)]
        input: Vec<String>,

        /// Output file path. Only valid for single-file input.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output directory for batch export.
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Upscale factor (1-16). Defaults to the saved setting.
        #[arg(long, value_name = "N")]
        scale: Option<u32>,

        /// Border width in cells (0-16). Defaults to the saved setting.
        #[arg(long, value_name = "CELLS")]
        border: Option<u32>,
    },

    /// Re-save legacy BAG1 projects in the BAG2 format.
    Migrate {
        /// Project file(s). Glob patterns accepted.
        #[arg(required = true, num_args = 1..)]
        input: Vec<String>,

        /// Write migrated files here instead of replacing them.
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Keep only the newest N history steps. Defaults to the saved setting.
        #[arg(long, value_name = "N")]
        keep_history: Option<i32>,

        /// Re-save files that are already BAG2 as well.
        #[arg(long)]
        force: bool,
    },

    /// Undo every step, redo back, and check the document comes out identical.
    UndoAll {
        /// Project file(s). Glob patterns accepted.
        #[arg(required = true, num_args = 1..)]
        input: Vec<String>,
    },
}

impl CliArgs {
    /// Subscriber level for the `-v` count.
    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    fn inputs(&self) -> &[String] {
        match &self.command {
            Command::Info { input }
            | Command::Render { input, .. }
            | Command::Migrate { input, .. }
            | Command::UndoAll { input } => input,
        }
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the command and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let settings = match &args.settings {
        Some(path) => EditorSettings::load_from(path),
        None => EditorSettings::load(),
    };
    run_with_settings(&args, &settings)
}

/// Same as [`run`], with settings supplied by the caller.
pub fn run_with_settings(args: &CliArgs, settings: &EditorSettings) -> ExitCode {
    let inputs = resolve_inputs(args.inputs());
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if let Command::Render { output: Some(_), output_dir: None, .. } = &args.command {
        if inputs.len() > 1 {
            eprintln!(
                "error: {} input files given but --output only accepts a single file path.\n\
                 Use --output-dir to specify a destination directory for batch export.",
                inputs.len()
            );
            return ExitCode::FAILURE;
        }
    }

    let output_dir = match &args.command {
        Command::Render { output_dir, .. } | Command::Migrate { output_dir, .. } => output_dir.as_deref(),
        _ => None,
    };
    if let Some(dir) = output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
            return ExitCode::FAILURE;
        }
    }

    let logger: Arc<dyn Logger> = Arc::new(TracingLogger);
    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }

        let file_start = Instant::now();
        let result = run_one(&args.command, input_path, settings, logger.clone());

        match result {
            Ok(summary) => {
                println!("{summary}");
                tracing::info!(
                    path = %input_path.display(),
                    elapsed_ms = file_start.elapsed().as_millis() as u64,
                    "done"
                );
            }
            Err(e) => {
                eprintln!("  error: {:#}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file commands
// ============================================================================

fn run_one(
    command: &Command,
    input: &Path,
    settings: &EditorSettings,
    logger: Arc<dyn Logger>,
) -> anyhow::Result<String> {
    let format = io::peek_format(input).with_context(|| format!("'{}'", input.display()))?;
    let mut project = io::open_project(input, logger, settings.history_max_steps)
        .with_context(|| format!("load failed for '{}'", input.display()))?;

    match command {
        Command::Info { .. } => Ok(describe_project(&project, format)),

        Command::Render { output, output_dir, scale, border, .. } => {
            let scale = scale.unwrap_or(settings.export_scale).clamp(1, 16);
            let border = border.unwrap_or(settings.export_border_cells).min(16);
            let output_path = output
                .clone()
                .or_else(|| build_output_path(input, output_dir.as_deref(), "png"))
                .with_context(|| format!("cannot determine output path for '{}'", input.display()))?;

            io::export_png(&project, &output_path, scale, border).context("export failed")?;
            Ok(format!("  -> {}", output_path.display()))
        }

        Command::Migrate { output_dir, keep_history, force, .. } => {
            if format == BagFormat::Bitstream && !*force {
                return Ok("  already BAG2, skipped".to_string());
            }

            let output_path = match output_dir {
                Some(dir) => build_output_path(input, Some(dir.as_path()), PROJECT_EXTENSION)
                    .with_context(|| format!("cannot determine output path for '{}'", input.display()))?,
                None => input.to_path_buf(),
            };
            let limit = keep_history.unwrap_or(settings.history_steps_on_save);

            io::save_project(&mut project, &output_path, BagFormat::Bitstream, limit).context("save failed")?;
            Ok(format!("  {:?} -> BAG2 {}", format, output_path.display()))
        }

        Command::UndoAll { .. } => {
            let report = check_undo_redo(&mut project)?;
            Ok(format!("  ok: {} undone, {} redone", report.undone, report.redone))
        }
    }
}

/// Human-readable summary of a project: background, layers top to bottom, history.
pub fn describe_project(project: &Project, format: BagFormat) -> String {
    let engine = project.engine();
    let background = engine.background_layer();
    let history = project.history();

    let mut lines = vec![
        format!("  {} ({})", project.display_title(), format.signature()),
        format!(
            "  background: color {} bright {} border {}{}{}",
            background.color.value(),
            background.bright.value(),
            background.border.value(),
            if background.is_visible { "" } else { " hidden" },
            if background.is_locked { " locked" } else { "" },
        ),
    ];

    for layer in engine.canvas_layers().iter().rev() {
        let marker = if layer.uid == *project.current_layer_uid() { "*" } else { " " };
        lines.push(format!(
            "  {marker} {} {} {}x{}{}{}{}",
            layer.uid,
            layer.canvas.canvas_type().name(),
            layer.canvas.scii_width(),
            layer.canvas.scii_height(),
            if layer.is_visible { "" } else { " hidden" },
            if layer.is_locked { " locked" } else { "" },
            if layer.is_masked { " masked" } else { "" },
        ));
    }

    lines.push(format!(
        "  history: {} steps, {} undoable, {} redoable",
        history.len(),
        history.undo_count(),
        history.redo_count()
    ));
    lines.join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoRedoReport {
    pub undone: usize,
    pub redone: usize,
}

/// Undo to the start of history, redo back to the saved position, and require
/// the graphics state to pack to the same bytes as before.
pub fn check_undo_redo(project: &mut Project) -> anyhow::Result<UndoRedoReport> {
    let position = project.history().position();
    let before = pack_stuff(project.engine(), BagFormat::Bitstream);

    let mut undone = 0;
    while project.undo() {
        undone += 1;
    }
    ensure!(undone == position, "undid {undone} steps, expected {position}");

    let mut redone = 0;
    while redone < position && project.redo() {
        redone += 1;
    }
    ensure!(redone == position, "redid {redone} steps, expected {position}");

    let after = pack_stuff(project.engine(), BagFormat::Bitstream);
    if before != after {
        bail!("document differs after undo/redo of {position} steps");
    }

    Ok(UndoRedoReport { undone, redone })
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Output path for one input: inside `output_dir` when given, otherwise next
/// to the input. Never the input itself.
fn build_output_path(input: &Path, output_dir: Option<&Path>, ext: &str) -> Option<PathBuf> {
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    let candidate = match output_dir {
        Some(dir) => dir.join(format!("{}.{}", stem, ext)),
        None => input.parent().unwrap_or(Path::new(".")).join(format!("{}.{}", stem, ext)),
    };

    if candidate == input {
        let parent = candidate.parent().unwrap_or(Path::new("."));
        Some(parent.join(format!("{}_out.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}
