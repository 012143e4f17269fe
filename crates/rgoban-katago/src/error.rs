//! エンジンクライアントのエラー型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KatagoError {
    /// エンジンプロセスを起動できなかった
    #[error("failed to launch analysis engine: {0}")]
    Spawn(std::io::Error),

    /// 起動時のバージョン確認に失敗した
    #[error("engine version handshake failed: {0}")]
    Handshake(String),

    /// エンジンとの読み書きに失敗した
    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// エンジンが対象のクエリにエラーまたは警告を返した。
    /// `message` にはエンジンの報告した本文（`field` があればその名前も）
    /// が入り、`query` は診断用に元のクエリ行を保持する。
    #[error("engine error: {message} for query {query}")]
    Engine {
        message: String,
        field: Option<String>,
        query: String,
    },

    /// プロトコルの整合性が壊れた（解釈不能な応答行、未知のidなど）。
    /// ディスパッチャ全体にとって致命的で、回復しない。
    #[error("analysis protocol corrupted: {0}")]
    Protocol(String),

    /// 応答が届く前にエンジンとの接続が閉じた
    #[error("engine exited before responding")]
    Disconnected,
}
