//! Terminal module: stdin input and stdout rendering for the overlay

mod commands;
mod reader;
mod render;

pub use commands::help;
pub use reader::InputReader;
pub use render::render;
