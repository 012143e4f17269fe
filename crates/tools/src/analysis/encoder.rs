//! 評価値の量子化エンコーダ
//!
//! 局面ごとの手別勝率を16bit整数に量子化し、盤面1枚分を固定長の
//! バイト列へ詰める。値0は「未評価」（石のあるマスや結果の無い点）の
//! 予約値で、評価済みの値と衝突しないよう量子化結果は常に1以上。

use anyhow::{Result, ensure};
use base64::prelude::*;
use byteorder::{BigEndian, ByteOrder};
use rgoban_core::Vertex;
use serde::{Deserialize, Serialize};

use super::policy::PositionEvaluation;

/// 未評価マスの予約値
pub const UNEVALUATED: u16 = 0;

/// 勝率 q ∈ [0,1] を16bitに量子化する。範囲外は契約違反。
pub fn quantize_winrate(q: f64) -> Result<u16> {
    ensure!((0.0..=1.0).contains(&q), "winrate {q} outside [0,1]");
    Ok((q * 65534.0).round() as u16 + 1)
}

/// 量子化値を勝率へ戻す（検証・可視化用）。0は未評価。
pub fn dequantize_winrate(value: u16) -> Option<f64> {
    if value == UNEVALUATED {
        None
    } else {
        Some(f64::from(value - 1) / 65534.0)
    }
}

/// 盤面1枚分を行優先で2バイトずつビッグエンディアンに詰める。
/// 対応する評価の無いマスは0のまま。パスは盤上のマスではないので
/// ここには含まれない。
pub fn encode_value_map(eval: &PositionEvaluation, board_size: u8) -> Result<Vec<u8>> {
    let size = board_size as usize;
    let mut buf = vec![0u8; size * size * 2];
    for (vertex, mv) in &eval.moves {
        let Vertex::Point { row, col } = *vertex else {
            continue;
        };
        let value = quantize_winrate(mv.winrate)?;
        let offset = (row as usize * size + col as usize) * 2;
        BigEndian::write_u16(&mut buf[offset..offset + 2], value);
    }
    Ok(buf)
}

/// 1局分の評価列。局面ごとに追記し、終局または決着で確定する。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedGameRecord {
    pub board_size: u8,
    /// 局面ごとの全体勝率（小数4桁に丸め）
    pub winrates: Vec<f64>,
    /// 局面ごとの量子化勝率マップ（base64、2·size²バイト）
    pub value_maps: Vec<String>,
    /// 元の棋譜テキスト
    pub sgf: String,
}

impl EncodedGameRecord {
    pub fn new(board_size: u8, sgf: String) -> EncodedGameRecord {
        EncodedGameRecord {
            board_size,
            winrates: Vec::new(),
            value_maps: Vec::new(),
            sgf,
        }
    }

    /// 1局面分を追記する
    pub fn push(&mut self, eval: &PositionEvaluation) -> Result<()> {
        let map = encode_value_map(eval, self.board_size)?;
        self.value_maps.push(BASE64_STANDARD.encode(map));
        self.winrates.push(round4(eval.winrate));
        Ok(())
    }

    pub fn positions(&self) -> usize {
        self.winrates.len()
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::policy::MoveEvaluation;
    use rgoban_core::Color;
    use std::collections::BTreeMap;

    fn evaluation(entries: &[(Vertex, f64)]) -> PositionEvaluation {
        let mut moves = BTreeMap::new();
        for &(vertex, winrate) in entries {
            moves.insert(
                vertex,
                MoveEvaluation {
                    winrate,
                    visits: 30,
                    deepened: false,
                },
            );
        }
        PositionEvaluation {
            winrate: 0.4723,
            to_play: Color::Black,
            moves,
        }
    }

    #[test]
    fn quantization_matches_the_fixed_points() {
        assert_eq!(quantize_winrate(0.5).unwrap(), 32768);
        assert_eq!(quantize_winrate(0.0).unwrap(), 1);
        assert_eq!(quantize_winrate(1.0).unwrap(), 65535);
    }

    #[test]
    fn quantization_rejects_out_of_range() {
        assert!(quantize_winrate(-0.01).is_err());
        assert!(quantize_winrate(1.01).is_err());
        assert!(quantize_winrate(f64::NAN).is_err());
    }

    #[test]
    fn quantization_roundtrip_stays_within_one_step() {
        for i in 0..=1000 {
            let q = i as f64 / 1000.0;
            let decoded = dequantize_winrate(quantize_winrate(q).unwrap()).unwrap();
            assert!(
                (decoded - q).abs() < 1.0 / 65534.0,
                "roundtrip error too large for q={q}"
            );
        }
        // 予約値は評価済みの値と衝突しない
        assert_eq!(dequantize_winrate(UNEVALUATED), None);
    }

    #[test]
    fn value_map_places_cells_in_row_major_order() {
        let eval = evaluation(&[
            (Vertex::point(0, 0), 0.5),
            (Vertex::point(1, 2), 1.0),
            // パスはマップに現れない
            (Vertex::Pass, 0.25),
        ]);
        let map = encode_value_map(&eval, 5).unwrap();
        assert_eq!(map.len(), 5 * 5 * 2);
        assert_eq!(BigEndian::read_u16(&map[0..2]), 32768);
        let offset = (1 * 5 + 2) * 2;
        assert_eq!(BigEndian::read_u16(&map[offset..offset + 2]), 65535);
        // 評価の無いマスは未評価のまま
        assert_eq!(BigEndian::read_u16(&map[2..4]), UNEVALUATED);
    }

    #[test]
    fn record_accumulates_rounded_winrates() {
        let mut record = EncodedGameRecord::new(5, "(;SZ[5])".to_string());
        record.push(&evaluation(&[(Vertex::point(0, 0), 0.5)])).unwrap();
        assert_eq!(record.positions(), 1);
        assert_eq!(record.winrates, vec![0.4723]);
        let bytes = BASE64_STANDARD.decode(&record.value_maps[0]).unwrap();
        assert_eq!(bytes.len(), 50);
    }

    #[test]
    fn record_push_fails_on_corrupt_winrate() {
        let mut record = EncodedGameRecord::new(5, String::new());
        let eval = evaluation(&[(Vertex::point(0, 0), 1.5)]);
        assert!(record.push(&eval).is_err());
    }
}
