use env_logger::{Builder, Env};
use photo_puzzle_generator::{ProfileKind, PuzzleCutter};
use std::env;
use std::fs::create_dir_all;

fn main() {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "debug")
    }
    let env = Env::default();
    Builder::from_env(env).format_timestamp_millis().init();
    let image_path = env::args()
        .nth(1)
        .unwrap_or("assets/images/raw.jpg".to_string());
    let pack = PuzzleCutter::from_path(&image_path, 20)
        .expect("Failed to load image")
        .profile(ProfileKind::Curved)
        .margin(0.05)
        .seed(7)
        .cut()
        .expect("Failed to cut puzzle");

    create_dir_all("images").expect("Failed to create images directory");
    pack.guide
        .save("images/print_guide.png")
        .expect("Failed to save image");

    for piece in pack.pieces.iter() {
        piece
            .image
            .save(format!("images/puzzle_piece_{}_{}.png", piece.row, piece.col))
            .expect("Failed to save image");
    }
}
