//! 盤上の座標（Vertex）と指し手トークン
//!
//! 解析エンジンとの間ではGTP流のトークンを使う。列は `A` から始まる
//! 英字で、数字の `1` と紛らわしい `I` は慣例に従って飛ばす。
//! 行は下から数えた1始まりの数字。パスは予約語 `pass`。

/// 列ラベル（`I` 抜き、最大19路まで）
pub const COLUMNS: &str = "ABCDEFGHJKLMNOPQRST";

/// 盤上の一点またはパス。`row`/`col` は0始まりで、`row` 0 が盤の最下段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Vertex {
    Point { row: u8, col: u8 },
    Pass,
}

impl Vertex {
    pub const fn point(row: u8, col: u8) -> Vertex {
        Vertex::Point { row, col }
    }

    #[inline]
    pub const fn is_pass(self) -> bool {
        matches!(self, Vertex::Pass)
    }

    /// `row * size + col` のフラットな行動インデックス。パスは `size²`。
    pub fn action_index(self, size: u8) -> usize {
        let size = size as usize;
        match self {
            Vertex::Point { row, col } => row as usize * size + col as usize,
            Vertex::Pass => size * size,
        }
    }

    /// 行動インデックスから復元する。`size²` がパス、範囲外は `None`。
    pub fn from_action_index(index: usize, size: u8) -> Option<Vertex> {
        let cells = size as usize * size as usize;
        if index == cells {
            Some(Vertex::Pass)
        } else if index < cells {
            Some(Vertex::Point {
                row: (index / size as usize) as u8,
                col: (index % size as usize) as u8,
            })
        } else {
            None
        }
    }

    /// 指し手トークンへ変換する（例: `Q16`、パスは `pass`）
    pub fn to_gtp(self) -> String {
        match self {
            Vertex::Pass => "pass".to_string(),
            Vertex::Point { row, col } => {
                let letter = COLUMNS.as_bytes()[col as usize] as char;
                format!("{}{}", letter, row + 1)
            }
        }
    }

    /// 指し手トークンを解析する。大文字小文字は区別しない。
    /// 盤サイズの範囲外や `I` 列は `None`。
    pub fn from_gtp(token: &str, size: u8) -> Option<Vertex> {
        if token.eq_ignore_ascii_case("pass") {
            return Some(Vertex::Pass);
        }
        let mut chars = token.chars();
        let letter = chars.next()?.to_ascii_uppercase();
        let col = COLUMNS.find(letter)? as u8;
        let row: u8 = chars.as_str().parse::<u8>().ok()?.checked_sub(1)?;
        if row < size && col < size {
            Some(Vertex::Point { row, col })
        } else {
            None
        }
    }
}

impl std::fmt::Display for Vertex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_gtp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gtp_roundtrip() {
        assert_eq!(Vertex::point(0, 0).to_gtp(), "A1");
        assert_eq!(Vertex::point(18, 18).to_gtp(), "T19");
        // 列8は I を飛ばして J
        assert_eq!(Vertex::point(9, 8).to_gtp(), "J10");
        assert_eq!(Vertex::Pass.to_gtp(), "pass");

        for v in [
            Vertex::point(0, 0),
            Vertex::point(18, 18),
            Vertex::point(3, 15),
            Vertex::Pass,
        ] {
            assert_eq!(Vertex::from_gtp(&v.to_gtp(), 19), Some(v));
        }
    }

    #[test]
    fn test_gtp_rejects_invalid() {
        assert_eq!(Vertex::from_gtp("I5", 19), None);
        assert_eq!(Vertex::from_gtp("A0", 19), None);
        assert_eq!(Vertex::from_gtp("A20", 19), None);
        assert_eq!(Vertex::from_gtp("K10", 9), None);
        assert_eq!(Vertex::from_gtp("", 19), None);
    }

    #[test]
    fn test_gtp_case_insensitive() {
        assert_eq!(Vertex::from_gtp("q16", 19), Some(Vertex::point(15, 15)));
        assert_eq!(Vertex::from_gtp("PASS", 19), Some(Vertex::Pass));
    }

    #[test]
    fn test_action_index() {
        assert_eq!(Vertex::point(0, 0).action_index(19), 0);
        assert_eq!(Vertex::point(1, 0).action_index(19), 19);
        assert_eq!(Vertex::Pass.action_index(19), 361);

        assert_eq!(Vertex::from_action_index(361, 19), Some(Vertex::Pass));
        assert_eq!(Vertex::from_action_index(362, 19), None);
        for index in [0usize, 19, 42, 360] {
            let v = Vertex::from_action_index(index, 19).unwrap();
            assert_eq!(v.action_index(19), index);
        }
    }
}
