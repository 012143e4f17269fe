//! rgoban-core: 碁盤の状態・座標・着手ルール
//!
//! 解析ツール群が共有する盤面表現。解析エンジンとのプロトコルは
//! `rgoban-katago`、棋譜の読み込みは `rgoban-sgf` が担う。

pub mod goban;
pub mod types;

pub use goban::{Goban, PlayError};
pub use types::color::Color;
pub use types::vertex::{COLUMNS, Vertex};
