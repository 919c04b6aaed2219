//! Save, reload, undo everything and redo everything: the document must come
//! back exactly, whichever bag format it went through.

use std::sync::Arc;

use sciipaint::bag::BagFormat;
use sciipaint::canvas::CanvasType;
use sciipaint::cell::{SciiChar, SciiColor, SciiLight};
use sciipaint::graphics::GraphicsState;
use sciipaint::io;
use sciipaint::logger::NoopLogger;
use sciipaint::ops::shapes::Shape;
use sciipaint::project::Project;

/// Twelve recorded steps, the last one undone.
fn build_project() -> Project {
    let mut project = Project::new_untitled(1, Arc::new(NoopLogger));

    let text = project.create_layer(CanvasType::Scii).unwrap();
    project.palette.scii_ink = SciiColor::YELLOW;
    project.palette.scii_paper = SciiColor::NAVY;
    project.palette.scii_bright = SciiLight::ON;
    project.palette.scii_character = SciiChar(b'A' as i32);
    let cell = project.paint_cell().unwrap();
    assert!(project.paint_shape(Shape::Line { sx: 0, sy: 0, ex: 7, ey: 3, cell }));

    let blocks = project.create_layer(CanvasType::QBlock).unwrap();
    project.palette.block_color = SciiColor::RED;
    project.palette.block_bright = SciiLight::OFF;
    let cell = project.paint_cell().unwrap();
    assert!(project.paint_shape(Shape::FillEllipse { sx: 2, sy: 2, ex: 13, ey: 9, cell }));

    project.create_layer(CanvasType::QBlock).unwrap();
    project.palette.block_color = SciiColor::WHITE;
    let cell = project.paint_cell().unwrap();
    assert!(project.paint_shape(Shape::FillBox { sx: 10, sy: 10, ex: 20, ey: 14, cell }));

    assert!(project.merge_current_layer_down());
    assert_eq!(project.current_layer_uid(), &blocks);
    assert!(project.move_current_layer_down());
    assert_eq!(project.engine().canvas_layers()[0].uid, blocks);

    assert!(project.set_background_color(SciiColor::GREEN));
    assert!(project.set_background_border(SciiColor::BLUE));

    assert!(project.select_layer(&text));
    assert!(project.convert_current_layer(CanvasType::HBlock));
    assert!(project.set_layer_visible(&blocks, false));

    assert!(project.undo());
    project
}

fn undo_all(project: &mut Project) -> usize {
    let mut count = 0;
    while project.undo() {
        count += 1;
    }
    count
}

fn redo_all(project: &mut Project) -> usize {
    let mut count = 0;
    while project.redo() {
        count += 1;
    }
    count
}

#[test]
fn history_replays_after_reload_in_both_formats() {
    let dir = tempfile::tempdir().unwrap();
    let mut project = build_project();
    assert_eq!(project.history().len(), 12);
    assert_eq!(project.history().position(), 11);

    let saved_state = project.engine().state().clone();
    assert!(project.redo());
    let tip_state = project.engine().state().clone();
    assert!(project.undo());

    for (name, format) in [("bag2.bpe", BagFormat::Bitstream), ("bag1.bpe", BagFormat::Legacy)] {
        let path = dir.path().join(name);
        io::save_project(&mut project, &path, format, -1).unwrap();
        assert_eq!(io::peek_format(&path).unwrap(), format);

        let mut loaded = io::open_project(&path, Arc::new(NoopLogger), 100).unwrap();
        assert_eq!(loaded.engine().state(), &saved_state);
        assert_eq!(loaded.history().len(), 12);
        assert_eq!(loaded.history().position(), 11);

        assert_eq!(undo_all(&mut loaded), 11);
        assert_eq!(loaded.engine().state(), &GraphicsState::default());
        assert!(loaded.current_layer_uid().is_background());

        assert_eq!(redo_all(&mut loaded), 12);
        assert_eq!(loaded.engine().state(), &tip_state);

        // The replayed document saves and loads like the original.
        let resaved = dir.path().join(format!("re-{name}"));
        io::save_project(&mut loaded, &resaved, format, -1).unwrap();
        let reloaded = io::open_project(&resaved, Arc::new(NoopLogger), 100).unwrap();
        assert_eq!(reloaded.engine().state(), &tip_state);
        assert_eq!(reloaded.history().position(), 12);
    }
}

#[test]
fn legacy_file_migrates_to_the_same_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.bpe");
    let mut project = build_project();

    io::save_project(&mut project, &path, BagFormat::Legacy, -1).unwrap();
    assert!(io::is_legacy_file(&path).unwrap());

    let mut loaded = io::open_project(&path, Arc::new(NoopLogger), 100).unwrap();
    io::save_project(&mut loaded, &path, BagFormat::Bitstream, -1).unwrap();
    assert!(!io::is_legacy_file(&path).unwrap());

    assert_eq!(std::fs::read_to_string(&path).unwrap(), project.pack(BagFormat::Bitstream, -1));
}

#[test]
fn trimmed_history_still_replays_the_kept_steps() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trimmed.bpe");
    let mut project = build_project();
    let saved_state = project.engine().state().clone();

    io::save_project(&mut project, &path, BagFormat::Bitstream, 3).unwrap();
    let mut loaded = io::open_project(&path, Arc::new(NoopLogger), 100).unwrap();
    assert_eq!(loaded.history().len(), 3);
    assert_eq!(loaded.history().position(), 2);

    assert_eq!(undo_all(&mut loaded), 2);
    assert_ne!(loaded.engine().state(), &GraphicsState::default());
    assert_eq!(redo_all(&mut loaded), 3);
    assert!(loaded.undo());
    assert_eq!(loaded.engine().state(), &saved_state);
}
