//! SGF棋譜のパース
//!
//! 解析パイプラインが必要とする範囲のSGFを読む: ルートプロパティ
//! （盤サイズ・コミ・置石）と本譜の着手列。変化がある場合は常に
//! 最初の分岐（本譜）だけを辿る。
//!
//! 座標系について: SGFの座標 `aa` は盤の左上が原点だが、指し手
//! トークンと同じく「`row` 0 が最下段」に変換して保持する。

use log::warn;
use rgoban_core::{Color, Vertex};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SgfError {
    #[error("sgf root node not found")]
    MissingRoot,
    #[error("unexpected end of sgf data")]
    UnexpectedEnd,
    #[error("invalid value for property {0}: '{1}'")]
    BadProperty(String, String),
    #[error("unsupported board size {0}")]
    BadBoardSize(u32),
}

/// 1局分の棋譜
#[derive(Debug, Clone, PartialEq)]
pub struct SgfGame {
    pub board_size: u8,
    pub komi: f64,
    /// 置石数（`HA` プロパティ。置石なしなら `None`）
    pub handicap: Option<u32>,
    /// 本譜の着手列
    pub moves: Vec<(Color, Vertex)>,
}

impl SgfGame {
    pub fn parse(text: &str) -> Result<SgfGame, SgfError> {
        Parser::new(text).parse()
    }

    /// 置石のある対局かどうか
    pub fn has_handicap(&self) -> bool {
        self.handicap.is_some_and(|h| h > 0)
    }
}

/// コミが無い棋譜の既定値（tromp-taylorルールの標準コミ）
const DEFAULT_KOMI: f64 = 7.5;
const DEFAULT_BOARD_SIZE: u8 = 19;

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Parser<'a> {
        Parser {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn parse(mut self) -> Result<SgfGame, SgfError> {
        self.skip_ws();
        if self.bump() != Some(b'(') {
            return Err(SgfError::MissingRoot);
        }
        let mut game = SgfGame {
            board_size: DEFAULT_BOARD_SIZE,
            komi: DEFAULT_KOMI,
            handicap: None,
            moves: Vec::new(),
        };
        self.sequence(&mut game)?;
        if game.board_size < 2 || game.board_size > 19 {
            return Err(SgfError::BadBoardSize(game.board_size as u32));
        }
        Ok(game)
    }

    /// ノード列を読む。子ツリーがあれば最初の分岐だけを辿り、
    /// 残りの兄弟分岐は読み飛ばす。
    fn sequence(&mut self, game: &mut SgfGame) -> Result<(), SgfError> {
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(SgfError::UnexpectedEnd),
                Some(b';') => {
                    self.pos += 1;
                    self.node(game)?;
                }
                Some(b'(') => {
                    self.pos += 1;
                    self.sequence(game)?;
                    return self.skip_siblings();
                }
                Some(b')') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(_) => {
                    self.pos += 1;
                }
            }
        }
    }

    /// 現在のツリーの残りの兄弟分岐を、閉じ括弧まで読み飛ばす。
    fn skip_siblings(&mut self) -> Result<(), SgfError> {
        let mut depth = 0usize;
        loop {
            match self.bump() {
                None => return Err(SgfError::UnexpectedEnd),
                Some(b'[') => {
                    self.value_body()?;
                }
                Some(b'(') => depth += 1,
                Some(b')') => {
                    if depth == 0 {
                        return Ok(());
                    }
                    depth -= 1;
                }
                Some(_) => {}
            }
        }
    }

    /// 1ノード分のプロパティを読む。
    fn node(&mut self, game: &mut SgfGame) -> Result<(), SgfError> {
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b) if b.is_ascii_alphabetic() => {
                    let ident = self.ident();
                    let values = self.values()?;
                    self.apply_property(game, &ident, &values)?;
                }
                _ => return Ok(()),
            }
        }
    }

    /// プロパティ識別子。古い形式の小文字（`CoPyright` 等）は
    /// 大文字だけを残して正規化する。
    fn ident(&mut self) -> String {
        let mut ident = String::new();
        while let Some(b) = self.peek() {
            if !b.is_ascii_alphabetic() {
                break;
            }
            if b.is_ascii_uppercase() {
                ident.push(b as char);
            }
            self.pos += 1;
        }
        ident
    }

    /// `[...]` のプロパティ値の並びを読む。
    fn values(&mut self) -> Result<Vec<String>, SgfError> {
        let mut values = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() != Some(b'[') {
                return Ok(values);
            }
            self.pos += 1;
            values.push(self.value_body()?);
        }
    }

    /// `[` の直後から対応する `]` までを読む。`\` は次の1文字を
    /// エスケープする。
    fn value_body(&mut self) -> Result<String, SgfError> {
        let mut value = String::new();
        loop {
            match self.bump() {
                None => return Err(SgfError::UnexpectedEnd),
                Some(b']') => return Ok(value),
                Some(b'\\') => {
                    let Some(escaped) = self.bump() else {
                        return Err(SgfError::UnexpectedEnd);
                    };
                    value.push(escaped as char);
                }
                Some(b) => value.push(b as char),
            }
        }
    }

    fn apply_property(
        &mut self,
        game: &mut SgfGame,
        ident: &str,
        values: &[String],
    ) -> Result<(), SgfError> {
        let first = values.first().map(String::as_str).unwrap_or("");
        match ident {
            "B" | "W" => {
                let color = if ident == "B" { Color::Black } else { Color::White };
                let vertex = parse_move(first, game.board_size)
                    .ok_or_else(|| SgfError::BadProperty(ident.to_string(), first.to_string()))?;
                game.moves.push((color, vertex));
            }
            "SZ" => {
                // 長方形盤 (`SZ[19:19]`) は正方形のみ受け付ける
                let part = first.split(':').next().unwrap_or("");
                let size: u32 = part
                    .trim()
                    .parse()
                    .map_err(|_| SgfError::BadProperty("SZ".to_string(), first.to_string()))?;
                if !(2..=19).contains(&size) {
                    return Err(SgfError::BadBoardSize(size));
                }
                game.board_size = size as u8;
            }
            "KM" => {
                game.komi = first
                    .trim()
                    .parse()
                    .map_err(|_| SgfError::BadProperty("KM".to_string(), first.to_string()))?;
            }
            "HA" => {
                let handicap: u32 = first
                    .trim()
                    .parse()
                    .map_err(|_| SgfError::BadProperty("HA".to_string(), first.to_string()))?;
                game.handicap = Some(handicap);
            }
            "AB" | "AW" => {
                // 石の直接配置も置碁として扱う（空盤を前提にできない）
                if !values.is_empty() {
                    warn!("sgf places stones with {ident}; treating game as handicapped");
                    game.handicap = Some(game.handicap.unwrap_or(0).max(values.len() as u32));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// SGFの着手座標を読む。空の値（および19路以下での `tt`）はパス。
fn parse_move(value: &str, board_size: u8) -> Option<Vertex> {
    if value.is_empty() || (value == "tt" && board_size <= 19) {
        return Some(Vertex::Pass);
    }
    let bytes = value.as_bytes();
    if bytes.len() != 2 {
        return None;
    }
    let col = bytes[0].checked_sub(b'a')?;
    let y = bytes[1].checked_sub(b'a')?;
    if col >= board_size || y >= board_size {
        return None;
    }
    // SGFは上端原点、内部表現は下端原点
    Some(Vertex::point(board_size - 1 - y, col))
}
