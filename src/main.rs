use anyhow::{Context, Result};
use env_logger::{Builder, Env};
use log::info;
use photo_puzzle_generator::PuzzleCutter;
use std::env;
use std::fs::create_dir_all;
use std::path::PathBuf;

/// Command line collaborator around the cutting engine: decodes the photo, runs one cut and
/// writes the piece cutouts plus the print guide into an output directory.
fn main() -> Result<()> {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info")
    }
    let env = Env::default();
    Builder::from_env(env).format_timestamp_millis().init();

    let image_path = env::args()
        .nth(1)
        .context("usage: photo_puzzle <image> [pieces] [output dir]")?;
    // An unparsable count falls through to the engine default.
    let piece_count = env::args()
        .nth(2)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(0);
    let output_dir = PathBuf::from(env::args().nth(3).unwrap_or_else(|| "puzzle".to_string()));

    let pack = PuzzleCutter::from_path(&image_path, piece_count)?.cut()?;

    let pieces_dir = output_dir.join("pieces");
    create_dir_all(&pieces_dir)
        .with_context(|| format!("failed to create {}", pieces_dir.display()))?;
    for piece in &pack.pieces {
        piece
            .image
            .save(pieces_dir.join(format!("piece_{}_{}.png", piece.row, piece.col)))
            .with_context(|| format!("failed to save piece ({}, {})", piece.row, piece.col))?;
    }
    let guide_path = output_dir.join("print_guide.png");
    pack.guide
        .save(&guide_path)
        .with_context(|| format!("failed to save {}", guide_path.display()))?;

    info!(
        "wrote {} pieces ({}x{} grid) and {}",
        pack.pieces.len(),
        pack.grid.rows,
        pack.grid.cols,
        guide_path.display()
    );
    Ok(())
}
