//! 解析結果の盤面表示
//!
//! 石と候補手を24bitカラーで端末に描く。候補手の色は「その手を
//! 打ったときの勝率の変化」を赤（大損）→緑（全体勝率と同等）で
//! 表し、深掘りされた手は大きい丸で強調する。

use std::io::{self, Write};

use crossterm::style::{Color as TermColor, Stylize};
use rgoban_core::{COLUMNS, Color, Goban, Vertex};

use super::policy::PositionEvaluation;

/// 盤の背景色（木目）
const BOARD_BG: TermColor = TermColor::Rgb {
    r: 0xbf,
    g: 0x99,
    b: 0x2a,
};

/// 勝率の変化を色に割り当てる。deltaは普通は負で、
/// 関心があるのは [-0.2, 0] の範囲だけ。
fn delta_color(delta: f64) -> TermColor {
    let x = (delta + 0.2) * 5.0;
    let r = (2.0 * (1.0 - x) * 255.0).clamp(0.0, 255.0) as u8;
    let g = (2.0 * x * 255.0).clamp(0.0, 255.0) as u8;
    TermColor::Rgb { r, g, b: 0 }
}

/// 1局面を描画する
pub fn print_position(
    out: &mut impl Write,
    goban: &Goban,
    eval: &PositionEvaluation,
) -> io::Result<()> {
    writeln!(out, "Winrate: {:.3}", eval.winrate)?;
    let size = goban.size();
    for row in (0..size).rev() {
        write!(out, "{:2} ", row + 1)?;
        for col in 0..size {
            match goban.stone_at(row, col) {
                Some(Color::Black) => {
                    write!(out, "{}", "⬤ ".with(TermColor::Black).on(BOARD_BG))?;
                }
                Some(Color::White) => {
                    write!(out, "{}", "⬤ ".with(TermColor::White).on(BOARD_BG))?;
                }
                None => {
                    let vertex = Vertex::point(row, col);
                    if let Some(mv) = eval.moves.get(&vertex) {
                        let delta = mv.winrate - eval.winrate;
                        let glyph = if mv.deepened { "⬤ " } else { "● " };
                        write!(out, "{}", glyph.with(delta_color(delta)).on(BOARD_BG))?;
                    } else {
                        write!(out, "{}", "  ".on(BOARD_BG))?;
                    }
                }
            }
        }
        writeln!(out)?;
    }
    write!(out, "   ")?;
    for col in 0..size as usize {
        write!(out, "{} ", &COLUMNS[col..=col])?;
    }
    writeln!(out)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::policy::MoveEvaluation;
    use std::collections::BTreeMap;

    #[test]
    fn delta_color_spans_red_to_green() {
        // 勝率が変わらない手は緑
        assert_eq!(delta_color(0.0), TermColor::Rgb { r: 0, g: 255, b: 0 });
        // 2割以上落とす手は赤
        assert_eq!(delta_color(-0.2), TermColor::Rgb { r: 255, g: 0, b: 0 });
        // 中間は両成分が混ざる
        let TermColor::Rgb { r, g, .. } = delta_color(-0.1) else {
            panic!("expected rgb");
        };
        assert!(r > 0 && g > 0);
    }

    #[test]
    fn prints_board_with_coordinates() {
        let mut goban = Goban::new(5);
        goban.play(Color::Black, Vertex::point(2, 2)).unwrap();
        let mut moves = BTreeMap::new();
        moves.insert(
            Vertex::point(0, 0),
            MoveEvaluation {
                winrate: 0.48,
                visits: 200,
                deepened: true,
            },
        );
        let eval = PositionEvaluation {
            winrate: 0.5,
            to_play: Color::White,
            moves,
        };
        let mut out = Vec::new();
        print_position(&mut out, &goban, &eval).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Winrate: 0.500"));
        assert!(text.starts_with("Winrate"));
        // 行ラベルと列ラベル
        assert!(text.contains(" 5 "));
        assert!(text.contains("A B C D E"));
    }
}
