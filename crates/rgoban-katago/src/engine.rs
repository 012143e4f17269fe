//! 解析エンジンの子プロセス管理
//!
//! stdinへの書き込みは複数の発行元から並行に呼ばれるため、
//! 「1クエリ＝1行」の書き込みとflushをロックでひとまとまりに
//! 直列化する。stdoutは起動時に読み取り側（readerスレッド）へ
//! 引き渡し、以後このプロセスの出力を読むのはその1箇所だけになる。

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Mutex;

use log::debug;

use crate::error::KatagoError;

/// エンジンプロセス起動時の設定
#[derive(Debug, Clone)]
pub struct EngineCommand {
    pub path: PathBuf,
    pub args: Vec<String>,
}

impl EngineCommand {
    pub fn new(path: impl Into<PathBuf>) -> EngineCommand {
        EngineCommand {
            path: path.into(),
            args: Vec::new(),
        }
    }

    /// KataGoをanalysisモードで起動するコマンドを組み立てる
    pub fn katago(path: &Path, config: &Path, model: &Path) -> EngineCommand {
        EngineCommand {
            path: path.to_path_buf(),
            args: vec![
                "analysis".to_string(),
                "-config".to_string(),
                config.display().to_string(),
                "-model".to_string(),
                model.display().to_string(),
            ],
        }
    }
}

/// 1本のエンジンプロセスに対する入出力をカプセル化する。
pub struct EngineProcess {
    child: Mutex<Child>,
    stdin: Mutex<BufWriter<ChildStdin>>,
}

impl EngineProcess {
    /// プロセスを起動し、stdoutのハンドルを読み取り側へ返す。
    pub fn spawn(cfg: &EngineCommand) -> Result<(EngineProcess, ChildStdout), KatagoError> {
        let mut child = Command::new(&cfg.path)
            .args(&cfg.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(KatagoError::Spawn)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| KatagoError::Protocol("engine stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| KatagoError::Protocol("engine stdout unavailable".to_string()))?;
        debug!("launched engine {} {:?}", cfg.path.display(), cfg.args);
        let process = EngineProcess {
            child: Mutex::new(child),
            stdin: Mutex::new(BufWriter::new(stdin)),
        };
        Ok((process, stdout))
    }

    /// 1行を書き込んでflushする。行の途中に他の書き込みが
    /// 混ざらないことを保証する。
    pub fn send_line(&self, line: &str) -> Result<(), KatagoError> {
        let mut stdin = self
            .stdin
            .lock()
            .map_err(|_| KatagoError::Protocol("engine stdin lock poisoned".to_string()))?;
        stdin.write_all(line.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()?;
        Ok(())
    }

    /// プロセスを終了させて回収する。何度呼んでも安全。
    pub fn shutdown(&self) {
        if let Ok(mut child) = self.child.lock() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        self.shutdown();
    }
}
