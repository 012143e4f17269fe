/// SGF棋譜アーカイブをKataGo analysis engineで解析するドライバ
///
/// # よく使うコマンド例
///
/// - アーカイブを丸ごと解析（結果は analysed/ 配下）:
///   `cargo run -p tools --bin analyse_games -- --katago ~/katago/katago --engine-config analysis.cfg --model kata1-b40c256.bin.gz --archive sgfs/alphago.tgz`
///
/// - 盤面描画なしで10局だけ、マージンを広めに:
///   `cargo run -p tools --bin analyse_games -- --katago ... --engine-config ... --model ... --archive sgfs/alphago.tgz --no-render --max-games 10 --margin 0.03`
///
/// 解析済みの棋譜は `index.json` に記録され、次回以降はスキップされる
/// （`--force` で再解析）。
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rgoban_core::Goban;
use rgoban_katago::{Analyser, EngineCommand};
use rgoban_sgf::SgfGame;
use tools::analysis::{
    OnEngineError, PolicySettings, PositionEvaluation, ResultStore, analyse_game, print_position,
    read_sgf_archive,
};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Analyse SGF game archives with a KataGo analysis engine"
)]
struct Cli {
    /// Path to the katago binary
    #[arg(long)]
    katago: PathBuf,

    /// KataGo analysis config file (passed as -config)
    #[arg(long)]
    engine_config: PathBuf,

    /// Model weights file (passed as -model)
    #[arg(long)]
    model: PathBuf,

    /// Archive of .sgf games (gzip-compressed tar)
    #[arg(long)]
    archive: PathBuf,

    /// Output directory for index.json and per-game records
    #[arg(long, default_value = "analysed")]
    out: PathBuf,

    /// Number of top-ranked moves that are always deepened
    #[arg(long, default_value_t = 8)]
    top_n: usize,

    /// Winrate margin for deepening moves close to the overall winrate
    #[arg(long, default_value_t = 0.02)]
    margin: f64,

    /// Visit budget for the per-move scan queries
    #[arg(long, default_value_t = 30)]
    scan_visits: u32,

    /// Visit budget for the deepening re-analysis
    #[arg(long, default_value_t = 200)]
    deep_visits: u32,

    /// Visit budget for the whole-position query
    #[arg(long, default_value_t = 1600)]
    full_visits: u32,

    /// Stop a game once the winrate leaves [1-DECISIVE, DECISIVE]
    #[arg(long, default_value_t = 0.95)]
    decisive: f64,

    /// Ruleset passed to the engine
    #[arg(long, default_value = "tromp-taylor")]
    rules: String,

    /// Re-analyse games already present in the index
    #[arg(long, default_value_t = false)]
    force: bool,

    /// Skip the board rendering
    #[arg(long, default_value_t = false)]
    no_render: bool,

    /// Treat per-move engine errors as unevaluated instead of failing the game
    #[arg(long, default_value_t = false)]
    skip_failed_moves: bool,

    /// Limit the number of games to analyse in this run
    #[arg(long)]
    max_games: Option<usize>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let settings = PolicySettings {
        top_n: cli.top_n,
        margin: cli.margin,
        scan_visits: cli.scan_visits,
        deep_visits: cli.deep_visits,
        full_visits: cli.full_visits,
        rules: cli.rules.clone(),
        on_engine_error: if cli.skip_failed_moves {
            OnEngineError::Tolerate
        } else {
            OnEngineError::Abort
        },
        ..PolicySettings::default()
    };

    // Ctrl-C ハンドラ: 局面の合間で確認して止める
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            eprintln!("\nShutting down gracefully...");
            shutdown.store(true, Ordering::Relaxed);
        })
        .ok();
    }

    let mut store = ResultStore::open(&cli.out)?;
    let games = read_sgf_archive(&cli.archive)?;
    info!(
        "archive {} holds {} sgf games ({} already analysed)",
        cli.archive.display(),
        games.len(),
        store.len()
    );

    let analyser = Analyser::start(&EngineCommand::katago(
        &cli.katago,
        &cli.engine_config,
        &cli.model,
    ))
    .context("failed to start the analysis engine")?;

    let progress = ProgressBar::new(games.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .expect("valid template"),
    );

    let mut analysed = 0usize;
    for entry in games {
        progress.inc(1);
        if shutdown.load(Ordering::Relaxed) {
            warn!("interrupted, leaving the remaining games for the next run");
            break;
        }
        if cli.max_games.is_some_and(|limit| analysed >= limit) {
            info!("reached --max-games limit");
            break;
        }
        if !cli.force && store.contains(&entry.name) {
            debug!("already analysed, skipping {}", entry.name);
            continue;
        }
        progress.set_message(entry.name.clone());

        let text = String::from_utf8_lossy(&entry.bytes).into_owned();
        let game = match SgfGame::parse(&text) {
            Ok(game) => game,
            Err(e) => {
                warn!("skipping unreadable sgf {}: {e}", entry.name);
                continue;
            }
        };
        // 置碁は空盤前提が崩れるため対象外
        if game.has_handicap() {
            info!("skipping handicap game {}", entry.name);
            continue;
        }

        let mut on_position = |goban: &Goban, eval: &PositionEvaluation| {
            if !cli.no_render {
                progress.suspend(|| {
                    if let Err(e) = print_position(&mut io::stdout(), goban, eval) {
                        warn!("failed to render position: {e}");
                    }
                });
            }
        };
        let record = analyse_game(
            &analyser,
            &game,
            &text,
            &settings,
            cli.decisive,
            &shutdown,
            &mut on_position,
        )
        .with_context(|| format!("analysis of {} failed", entry.name))?;

        match record {
            Some(record) => {
                let path = store.save(&entry.name, &record)?;
                debug!("saved {} positions to {}", record.positions(), path.display());
                analysed += 1;
            }
            // 中断された局は保存しない
            None => break,
        }
    }
    progress.finish_and_clear();

    info!("analysed {analysed} games in this run");
    Ok(())
}
