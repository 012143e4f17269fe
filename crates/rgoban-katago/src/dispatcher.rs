//! クエリディスパッチャ
//!
//! エンジンは受け取ったクエリを順不同で返すため、発行と応答の対応は
//! 到着順ではなく `id` で取る。発行側は `issue` でクエリを積み、返る
//! ハンドルの `wait` で自分の応答だけを待つ。stdoutを読むのは常駐の
//! readerスレッド1本だけで、応答の解決は必ずそこで行われる。
//!
//! プロトコルの破損（解釈できない行、未知のid）はクエリ単位の失敗では
//! なく共有状態の整合性違反なので、ディスパッチャ全体を毒状態にして
//! 待機中・以後のすべてのクエリを失敗させる。

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::process::ChildStdout;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;

use log::{debug, error, info};

use crate::engine::{EngineCommand, EngineProcess};
use crate::error::KatagoError;
use crate::protocol::{AnalysisQuery, EngineResponse, VersionQuery};

/// クエリ発行のパラメータ。`id` はディスパッチャが採番する。
#[derive(Debug, Clone)]
pub struct QueryParams {
    pub moves: Vec<(String, String)>,
    pub rules: String,
    pub komi: f64,
    pub board_size: u8,
    pub max_visits: u32,
}

type QueryResult = Result<EngineResponse, KatagoError>;

/// 発行済みで未解決のクエリ1件分
struct Pending {
    /// 診断用に保持する元のクエリ行
    query: String,
    tx: mpsc::Sender<QueryResult>,
}

struct Shared {
    table: Mutex<HashMap<String, Pending>>,
    /// プロトコル破損の記録。一度設定されたら戻らない。
    poisoned: Mutex<Option<String>>,
}

impl Shared {
    fn new() -> Shared {
        Shared {
            table: Mutex::new(HashMap::new()),
            poisoned: Mutex::new(None),
        }
    }
}

/// 発行済みクエリの完了を表すハンドル。
/// `wait` が唯一の観測手段で、結果はちょうど1回だけ得られる。
pub struct QueryHandle {
    rx: mpsc::Receiver<QueryResult>,
}

impl QueryHandle {
    /// readerスレッドがこのクエリを解決するまでブロックする。
    pub fn wait(self) -> QueryResult {
        match self.rx.recv() {
            Ok(outcome) => outcome,
            // 解決される前に送信側が消えた（ディスパッチャ破棄など）
            Err(mpsc::RecvError) => Err(KatagoError::Disconnected),
        }
    }

    /// 解決済みの結果を持つハンドルを作る。スクリプト化した
    /// クライアント実装（テストダブル）のためにある。
    pub fn resolved(outcome: QueryResult) -> QueryHandle {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(outcome);
        QueryHandle { rx }
    }
}

/// クエリ発行の抽象。ポリシー層はこの契約だけに依存する。
pub trait QueryClient {
    fn issue(&self, params: &QueryParams) -> Result<QueryHandle, KatagoError>;
}

/// 解析エンジン1プロセスを所有するディスパッチャ
pub struct Analyser {
    process: EngineProcess,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    reader: Option<JoinHandle<()>>,
}

impl Analyser {
    /// エンジンを起動し、バージョン応答を確認してから返す。
    /// ハンドシェイクが通らなければ起動失敗として扱う。
    pub fn start(cfg: &EngineCommand) -> Result<Analyser, KatagoError> {
        let analyser = Analyser::start_unchecked(cfg)?;
        let handle = match analyser.issue_version() {
            Ok(handle) => handle,
            Err(e) => return Err(KatagoError::Handshake(e.to_string())),
        };
        match handle.wait() {
            Ok(response) => {
                info!(
                    "katago version {} ({})",
                    response.version.as_deref().unwrap_or("unknown"),
                    response.git_hash.as_deref().unwrap_or("unknown")
                );
                Ok(analyser)
            }
            Err(e) => Err(KatagoError::Handshake(e.to_string())),
        }
    }

    /// プロセスの起動とreaderスレッドの立ち上げのみを行う
    fn start_unchecked(cfg: &EngineCommand) -> Result<Analyser, KatagoError> {
        let (process, stdout) = EngineProcess::spawn(cfg)?;
        let shared = Arc::new(Shared::new());
        let reader_shared = Arc::clone(&shared);
        let reader = std::thread::spawn(move || reader_loop(stdout, reader_shared));
        Ok(Analyser {
            process,
            shared,
            next_id: AtomicU64::new(0),
            reader: Some(reader),
        })
    }

    /// プロセスの生存期間中、一度も再利用されないidを採番する
    fn fresh_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("query_{n}")
    }

    /// クエリを発行する。応答は待たない。
    pub fn issue(&self, params: &QueryParams) -> Result<QueryHandle, KatagoError> {
        let query = AnalysisQuery {
            id: self.fresh_id(),
            moves: params.moves.clone(),
            rules: params.rules.clone(),
            komi: params.komi,
            board_x_size: params.board_size,
            board_y_size: params.board_size,
            max_visits: params.max_visits,
        };
        let line = serde_json::to_string(&query)
            .map_err(|e| KatagoError::Protocol(format!("failed to serialize query: {e}")))?;
        self.send_registered(query.id, line)
    }

    fn issue_version(&self) -> Result<QueryHandle, KatagoError> {
        let query = VersionQuery::new(self.fresh_id());
        let line = serde_json::to_string(&query)
            .map_err(|e| KatagoError::Protocol(format!("failed to serialize query: {e}")))?;
        self.send_registered(query.id, line)
    }

    /// 応答が書き込みより先に届いても取りこぼさないよう、
    /// 登録してから送信する。送信に失敗したら登録を取り消す。
    fn send_registered(&self, id: String, line: String) -> Result<QueryHandle, KatagoError> {
        if let Ok(poisoned) = self.shared.poisoned.lock() {
            if let Some(reason) = poisoned.as_ref() {
                return Err(KatagoError::Protocol(reason.clone()));
            }
        }
        let (tx, rx) = mpsc::channel();
        {
            let mut table = self
                .shared
                .table
                .lock()
                .map_err(|_| KatagoError::Protocol("correlation table poisoned".to_string()))?;
            table.insert(
                id.clone(),
                Pending {
                    query: line.clone(),
                    tx,
                },
            );
        }
        if let Err(e) = self.process.send_line(&line) {
            if let Ok(mut table) = self.shared.table.lock() {
                table.remove(&id);
            }
            return Err(e);
        }
        Ok(QueryHandle { rx })
    }

    /// エンジンを終了させ、readerスレッドを回収する。何度呼んでも安全。
    /// 未解決のクエリは切断として失敗する。
    pub fn shutdown(&mut self) {
        self.process.shutdown();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl QueryClient for Analyser {
    fn issue(&self, params: &QueryParams) -> Result<QueryHandle, KatagoError> {
        Analyser::issue(self, params)
    }
}

impl Drop for Analyser {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// エンジンのstdoutを読み続け、応答を待ち手へ引き渡す常駐ループ
fn reader_loop(stdout: ChildStdout, shared: Arc<Shared>) {
    let reader = BufReader::new(stdout);
    for line in reader.lines() {
        match line {
            Ok(line) => {
                if !handle_line(&shared, &line) {
                    return;
                }
            }
            Err(e) => {
                poison(&shared, format!("engine stdout read failed: {e}"));
                return;
            }
        }
    }
    // EOF: プロセスが終了した。残った待ち手には切断を通知する。
    debug!("engine stdout closed; reader loop exiting");
    if let Ok(mut table) = shared.table.lock() {
        for (_, pending) in table.drain() {
            let _ = pending.tx.send(Err(KatagoError::Disconnected));
        }
    }
}

/// 応答1行を処理する。継続可能なら `true`。
fn handle_line(shared: &Shared, line: &str) -> bool {
    if line.trim().is_empty() {
        return true;
    }
    let response: EngineResponse = match serde_json::from_str(line) {
        Ok(response) => response,
        Err(e) => {
            poison(shared, format!("unparseable engine response ({e}): {line}"));
            return false;
        }
    };
    let pending = match shared.table.lock() {
        Ok(mut table) => table.remove(&response.id),
        Err(_) => None,
    };
    let Some(pending) = pending else {
        poison(
            shared,
            format!("response for unknown query id '{}'", response.id),
        );
        return false;
    };
    let outcome = match response.failure_message() {
        Some(message) => Err(KatagoError::Engine {
            message,
            field: response.field.clone(),
            query: pending.query,
        }),
        None => Ok(response),
    };
    // 待ち手が先にハンドルを捨てていても致命的ではない
    let _ = pending.tx.send(outcome);
    true
}

/// プロトコル破損を記録し、待機中の全クエリを失敗させる
fn poison(shared: &Shared, reason: String) {
    error!("{reason}");
    if let Ok(mut poisoned) = shared.poisoned.lock() {
        poisoned.get_or_insert_with(|| reason.clone());
    }
    if let Ok(mut table) = shared.table.lock() {
        for (_, pending) in table.drain() {
            let _ = pending.tx.send(Err(KatagoError::Protocol(reason.clone())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn params(max_visits: u32) -> QueryParams {
        QueryParams {
            moves: vec![("b".to_string(), "Q16".to_string())],
            rules: "tromp-taylor".to_string(),
            komi: 7.5,
            board_size: 19,
            max_visits,
        }
    }

    fn insert_pending(shared: &Shared, id: &str) -> mpsc::Receiver<QueryResult> {
        let (tx, rx) = mpsc::channel();
        shared.table.lock().unwrap().insert(
            id.to_string(),
            Pending {
                query: format!(r#"{{"id":"{id}"}}"#),
                tx,
            },
        );
        rx
    }

    #[test]
    fn error_response_resolves_only_its_waiter() {
        let shared = Shared::new();
        let rx1 = insert_pending(&shared, "query_1");
        let rx2 = insert_pending(&shared, "query_2");

        let keep_going = handle_line(
            &shared,
            r#"{"id":"query_1","error":"illegal move","field":"moves"}"#,
        );
        assert!(keep_going);

        let outcome = rx1.recv().unwrap();
        let err = outcome.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("illegal move"), "missing error text: {text}");
        assert!(text.contains("moves"), "missing field name: {text}");
        match err {
            KatagoError::Engine { field, .. } => assert_eq!(field.as_deref(), Some("moves")),
            other => panic!("expected engine error, got {other:?}"),
        }

        // 他の待ち手には影響しない
        assert!(rx2.try_recv().is_err());
        assert!(shared.table.lock().unwrap().contains_key("query_2"));
        assert!(!shared.table.lock().unwrap().contains_key("query_1"));
    }

    #[test]
    fn warning_response_fails_the_waiter() {
        let shared = Shared::new();
        let rx = insert_pending(&shared, "query_1");
        assert!(handle_line(
            &shared,
            r#"{"id":"query_1","warning":"unused key","field":"rules"}"#,
        ));
        assert!(rx.recv().unwrap().is_err());
    }

    #[test]
    fn unknown_id_poisons_dispatcher() {
        let shared = Shared::new();
        let rx = insert_pending(&shared, "query_1");

        assert!(!handle_line(&shared, r#"{"id":"never_issued"}"#));
        assert!(matches!(
            rx.recv().unwrap(),
            Err(KatagoError::Protocol(_))
        ));
        assert!(shared.poisoned.lock().unwrap().is_some());
        assert!(shared.table.lock().unwrap().is_empty());
    }

    #[test]
    fn malformed_line_poisons_dispatcher() {
        let shared = Shared::new();
        let rx = insert_pending(&shared, "query_1");

        assert!(!handle_line(&shared, "this is not json"));
        assert!(matches!(
            rx.recv().unwrap(),
            Err(KatagoError::Protocol(_))
        ));
    }

    #[test]
    fn blank_lines_are_ignored() {
        let shared = Shared::new();
        assert!(handle_line(&shared, ""));
        assert!(handle_line(&shared, "   "));
        assert!(shared.poisoned.lock().unwrap().is_none());
    }

    // 以下は `cat` をエコーエンジンとして使う結合テスト。
    // 送ったクエリ行がそのまま応答として返ってくるので、id照合と
    // 並行発行の往復を実プロセスで確認できる。
    #[cfg(unix)]
    mod with_cat {
        use super::*;
        use std::sync::Arc;

        fn cat_analyser() -> Analyser {
            Analyser::start(&EngineCommand::new("cat")).expect("cat should start")
        }

        #[test]
        fn handshake_and_roundtrip() {
            let analyser = cat_analyser();
            let handle = analyser.issue(&params(30)).unwrap();
            let response = handle.wait().unwrap();
            // ハンドシェイクが query_1 を使っている
            assert_eq!(response.id, "query_2");
            // 解決済みのエントリは表に残らない
            assert!(analyser.shared.table.lock().unwrap().is_empty());
        }

        #[test]
        fn identifiers_unique_under_concurrent_issuers() {
            let analyser = Arc::new(cat_analyser());
            let mut workers = Vec::new();
            for _ in 0..4 {
                let analyser = Arc::clone(&analyser);
                workers.push(std::thread::spawn(move || {
                    let mut ids = Vec::new();
                    for _ in 0..25 {
                        let handle = analyser.issue(&params(10)).unwrap();
                        ids.push(handle.wait().unwrap().id);
                    }
                    ids
                }));
            }
            let mut all = HashSet::new();
            for worker in workers {
                for id in worker.join().unwrap() {
                    assert!(all.insert(id), "duplicate query id observed");
                }
            }
            assert_eq!(all.len(), 100);
            assert!(analyser.shared.table.lock().unwrap().is_empty());
        }

        #[test]
        fn outstanding_queries_fail_on_shutdown() {
            // 何も返さないエンジン: ハンドシェイクを挟まず直接起動する
            let mut analyser = Analyser::start_unchecked(&EngineCommand {
                path: "sleep".into(),
                args: vec!["30".to_string()],
            })
            .unwrap();
            let handle = analyser.issue(&params(30)).unwrap();
            analyser.shutdown();
            assert!(matches!(handle.wait(), Err(KatagoError::Disconnected)));
        }

        #[test]
        fn handshake_fails_for_silent_engine() {
            // 即終了するプロセスではバージョン応答が得られない
            let result = Analyser::start(&EngineCommand::new("true"));
            assert!(matches!(result, Err(KatagoError::Handshake(_))));
        }
    }
}
