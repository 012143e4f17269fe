//! 1局分の解析ドライバ
//!
//! 棋譜の本譜を初期局面から1手ずつ進めながら各局面を解析し、
//! 評価列を組み立てる。どちらかの勝率が決着しきい値を越えたら
//! それ以降の局面には手を付けない。

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use log::info;
use rgoban_core::{Color, Goban, Vertex};
use rgoban_katago::QueryClient;
use rgoban_sgf::SgfGame;

use super::encoder::EncodedGameRecord;
use super::policy::{PolicySettings, PositionEvaluation, analyse_position};

/// 1局を解析する。
///
/// - `decisive`: 全体勝率が `[1-decisive, decisive]` を外れたら打ち切る
/// - `stop`: 局面の合間に確認する中断フラグ
/// - `on_position`: 局面を解析するたびに呼ばれる（描画など）
///
/// 中断された場合は `Ok(None)` を返し、途中までの結果は捨てる。
pub fn analyse_game(
    client: &impl QueryClient,
    game: &SgfGame,
    sgf_text: &str,
    settings: &PolicySettings,
    decisive: f64,
    stop: &AtomicBool,
    on_position: &mut dyn FnMut(&Goban, &PositionEvaluation),
) -> Result<Option<EncodedGameRecord>> {
    let mut goban = Goban::new(game.board_size);
    let mut history: Vec<(Color, Vertex)> = Vec::new();
    let mut record = EncodedGameRecord::new(game.board_size, sgf_text.to_string());

    let eval = analyse_position(client, &goban, &history, game.komi, settings)
        .context("analysis of the initial position failed")?;
    on_position(&goban, &eval);
    record.push(&eval)?;
    if is_decisive(eval.winrate, decisive) {
        info!("game decided before the first move (winrate {:.3})", eval.winrate);
        return Ok(Some(record));
    }

    for (ply, (color, vertex)) in game.moves.iter().enumerate() {
        if stop.load(Ordering::Relaxed) {
            return Ok(None);
        }
        goban.play(*color, *vertex).with_context(|| {
            format!("record contains illegal move {} at ply {}", vertex.to_gtp(), ply + 1)
        })?;
        history.push((*color, *vertex));

        let eval = analyse_position(client, &goban, &history, game.komi, settings)
            .with_context(|| format!("analysis failed at ply {}", ply + 1))?;
        on_position(&goban, &eval);
        record.push(&eval)?;

        if is_decisive(eval.winrate, decisive) {
            info!(
                "game decided at ply {} (winrate {:.3}), skipping the remaining {} positions",
                ply + 1,
                eval.winrate,
                game.moves.len() - ply - 1
            );
            break;
        }
    }
    Ok(Some(record))
}

/// どちらかの側にとって勝敗が実質決しているか
fn is_decisive(winrate: f64, decisive: f64) -> bool {
    winrate <= 1.0 - decisive || winrate >= decisive
}
