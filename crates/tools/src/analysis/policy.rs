//! 適応的な着手選択ポリシー
//!
//! 全合法手を低visit数でスキャンし、局面全体の高visit検索と突き
//! 合わせて、深掘りに値する手だけを選んで再解析する。全手を高visit
//! で読むのは高価すぎるため、探索予算の大半を「エンジンが有望視する
//! 手」と「スキャンで全体勝率に肉薄した手」に集中させつつ、可視化と
//! 保存のためにすべての合法手へ安価な評価値を残す。

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use rgoban_core::{Color, Goban, Vertex};
use rgoban_katago::{KatagoError, QueryClient, QueryHandle, QueryParams};

/// 個別クエリがエンジンエラーになったときの扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnEngineError {
    /// 局面全体の解析を失敗させる。1手でも欠けると盤面エンコードに
    /// 穴が開くため、こちらが既定。
    Abort,
    /// その手を未評価のまま続行する
    Tolerate,
}

/// ポリシーの調整パラメータ。
/// `margin` と `scan_visits` は運用しながら調整してきた値なので、
/// 固定せず設定として持つ。
#[derive(Debug, Clone)]
pub struct PolicySettings {
    /// 訪問数ランキング上位から無条件で深掘りする手数
    pub top_n: usize,
    /// 「全体勝率に肉薄している」とみなす勝率マージン
    pub margin: f64,
    /// 全合法手スキャンのvisit数
    pub scan_visits: u32,
    /// 深掘り再解析のvisit数
    pub deep_visits: u32,
    /// 局面全体検索のvisit数
    pub full_visits: u32,
    /// この範囲の外なら勝敗が実質決しているとみなし、
    /// マージンによる深掘り対象の拡張を行わない
    pub decided_below: f64,
    pub decided_above: f64,
    /// エンジンへ渡すルール名
    pub rules: String,
    pub on_engine_error: OnEngineError,
}

impl Default for PolicySettings {
    fn default() -> PolicySettings {
        PolicySettings {
            top_n: 8,
            margin: 0.02,
            scan_visits: 30,
            deep_visits: 200,
            full_visits: 1600,
            decided_below: 0.1,
            decided_above: 0.9,
            rules: "tromp-taylor".to_string(),
            on_engine_error: OnEngineError::Abort,
        }
    }
}

/// 1手分の評価。`winrate` は現局面の手番側から見た値
/// （エンジンは着手後の手番側の勝率を返すため、1から引いてある）。
#[derive(Debug, Clone, Copy)]
pub struct MoveEvaluation {
    pub winrate: f64,
    pub visits: u64,
    /// 深掘り再解析の結果かどうか
    pub deepened: bool,
}

/// 1局面分の解析結果
#[derive(Debug, Clone)]
pub struct PositionEvaluation {
    /// 手番側から見た局面全体の勝率
    pub winrate: f64,
    pub to_play: Color,
    pub moves: BTreeMap<Vertex, MoveEvaluation>,
}

/// 履歴の最後の手から手番を決める（交互着手、空なら黒番）
pub fn side_to_move(history: &[(Color, Vertex)]) -> Color {
    history.last().map_or(Color::Black, |(color, _)| color.opponent())
}

/// 深掘り対象の手を選ぶ。訪問数上位 `top_n` は無条件。さらに勝敗が
/// 決していない局面に限り、スキャン勝率が `全体勝率 - margin` を
/// 上回った手も加える。
pub fn select_deepen_moves(
    overall_winrate: f64,
    ranked: &[Vertex],
    scans: &BTreeMap<Vertex, MoveEvaluation>,
    settings: &PolicySettings,
) -> BTreeSet<Vertex> {
    let mut deepen: BTreeSet<Vertex> = ranked.iter().take(settings.top_n).copied().collect();
    if overall_winrate > settings.decided_below && overall_winrate < settings.decided_above {
        for (vertex, eval) in scans {
            if eval.winrate > overall_winrate - settings.margin {
                deepen.insert(*vertex);
            }
        }
    }
    deepen
}

/// 1局面を解析する。
///
/// 1. 全合法手（パス含む）それぞれに低visitのクエリを発行する
/// 2. 並行して局面全体の高visitクエリを発行し、その結果を待つ
/// 3. スキャン結果と突き合わせて深掘り対象を選ぶ
/// 4. 深掘り対象をdeep visitsで再解析し、スキャン結果を置き換える
///
/// 深掘りクエリは必ず局面全体の結果を観測してから発行する。
pub fn analyse_position(
    client: &impl QueryClient,
    goban: &Goban,
    history: &[(Color, Vertex)],
    komi: f64,
    settings: &PolicySettings,
) -> Result<PositionEvaluation> {
    let size = goban.size();
    let to_play = side_to_move(history);
    let base_moves: Vec<(String, String)> = history
        .iter()
        .map(|(color, vertex)| (color.token().to_string(), vertex.to_gtp()))
        .collect();
    let query = |moves: Vec<(String, String)>, max_visits: u32| QueryParams {
        moves,
        rules: settings.rules.clone(),
        komi,
        board_size: size,
        max_visits,
    };
    let follow_up = |vertex: Vertex| {
        let mut moves = base_moves.clone();
        moves.push((to_play.token().to_string(), vertex.to_gtp()));
        moves
    };

    // 全合法手のスキャンを積む
    let mut scans: Vec<(Vertex, QueryHandle)> = Vec::new();
    for vertex in goban.legal_moves(to_play) {
        let handle = client.issue(&query(follow_up(vertex), settings.scan_visits))?;
        scans.push((vertex, handle));
    }

    // 局面全体の検索。スキャンと同時に進む。
    let full = client.issue(&query(base_moves.clone(), settings.full_visits))?;
    let overall = full.wait().context("whole-position query failed")?;
    let overall_winrate = overall
        .root_winrate()
        .ok_or_else(|| anyhow!("whole-position response carries no rootInfo"))?;

    // スキャン結果を回収する
    let mut results: BTreeMap<Vertex, MoveEvaluation> = BTreeMap::new();
    for (vertex, handle) in scans {
        if let Some(eval) = collect_move_result(handle, vertex, false, settings)? {
            results.insert(vertex, eval);
        }
    }

    // 深掘り対象を選んで再解析
    let ranked: Vec<Vertex> = overall
        .moves_by_order()
        .iter()
        .filter_map(|info| Vertex::from_gtp(&info.mv, size))
        .collect();
    let deepen = select_deepen_moves(overall_winrate, &ranked, &results, settings);
    debug!(
        "deepening {} of {} scanned moves (overall winrate {overall_winrate:.3})",
        deepen.len(),
        results.len()
    );

    let mut deep_handles: Vec<(Vertex, QueryHandle)> = Vec::new();
    for vertex in &deepen {
        let handle = client.issue(&query(follow_up(*vertex), settings.deep_visits))?;
        deep_handles.push((*vertex, handle));
    }
    for (vertex, handle) in deep_handles {
        if let Some(eval) = collect_move_result(handle, vertex, true, settings)? {
            results.insert(vertex, eval);
        }
    }

    Ok(PositionEvaluation {
        winrate: overall_winrate,
        to_play,
        moves: results,
    })
}

/// 1手分の応答を回収する。エンジンエラーは設定に応じて
/// 局面全体の失敗にするか、その手を未評価として読み飛ばす。
fn collect_move_result(
    handle: QueryHandle,
    vertex: Vertex,
    deepened: bool,
    settings: &PolicySettings,
) -> Result<Option<MoveEvaluation>> {
    match handle.wait() {
        Ok(response) => {
            let reported = response.root_winrate().ok_or_else(|| {
                anyhow!("response for move {} carries no rootInfo", vertex.to_gtp())
            })?;
            Ok(Some(MoveEvaluation {
                winrate: 1.0 - reported,
                visits: response.root_visits(),
                deepened,
            }))
        }
        Err(e @ KatagoError::Engine { .. })
            if settings.on_engine_error == OnEngineError::Tolerate =>
        {
            warn!("query for move {} failed, leaving unevaluated: {e}", vertex.to_gtp());
            Ok(None)
        }
        Err(e) => {
            Err(e).with_context(|| format!("query for move {} failed", vertex.to_gtp()))
        }
    }
}
