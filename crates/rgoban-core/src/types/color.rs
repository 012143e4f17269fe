//! 石の色（Color）

use serde::{Deserialize, Serialize};

/// 石の色（黒/白）。手番の表現にも使う。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Color {
    Black = 0,
    White = 1,
}

impl Color {
    /// 色の数
    pub const NUM: usize = 2;

    /// 相手の色を返す
    #[inline]
    pub const fn opponent(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    /// 解析エンジンのプロトコルで使うプレイヤートークン
    pub const fn token(self) -> &'static str {
        match self {
            Color::Black => "b",
            Color::White => "w",
        }
    }

    /// プレイヤートークンから変換する
    pub fn from_token(token: &str) -> Option<Color> {
        match token {
            "b" | "B" => Some(Color::Black),
            "w" | "W" => Some(Color::White),
            _ => None,
        }
    }

    /// インデックスとして使用（配列アクセス用）
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl std::ops::Not for Color {
    type Output = Color;

    #[inline]
    fn not(self) -> Color {
        self.opponent()
    }
}
