//! 解析結果の永続化
//!
//! 出力ディレクトリ直下に `index.json`（棋譜名 → 索引エントリ）と、
//! 棋譜の内容ハッシュをファイル名にした結果レコードを置く。
//! 索引はBTreeMapでキーをソートし、人が読める整形JSONで保存する。

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::encoder::EncodedGameRecord;

/// 解析済み棋譜1つ分の索引エントリ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// 結果レコードのファイル名（出力ディレクトリからの相対）
    pub record: String,
    /// 解析した局面数
    pub positions: usize,
    /// 最後に解析した局面の全体勝率
    pub final_winrate: f64,
    pub analysed_at: String,
}

/// `index.json` と結果レコード群を管理する
pub struct ResultStore {
    dir: PathBuf,
    index: BTreeMap<String, IndexEntry>,
}

const INDEX_FILE: &str = "index.json";

impl ResultStore {
    /// 出力ディレクトリを用意し、既存の索引があれば読み込む。
    pub fn open(dir: &Path) -> Result<ResultStore> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        let index_path = dir.join(INDEX_FILE);
        let index = if index_path.exists() {
            let text = fs::read_to_string(&index_path)
                .with_context(|| format!("failed to read {}", index_path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("corrupt index file {}", index_path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(ResultStore {
            dir: dir.to_path_buf(),
            index,
        })
    }

    pub fn contains(&self, game_name: &str) -> bool {
        self.index.contains_key(game_name)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// 1局分の結果を書き出し、索引を更新して保存する。
    /// 結果レコードは棋譜の内容ハッシュをキーにするため、同じ棋譜を
    /// 再解析しても別ファイルは増えない。
    pub fn save(&mut self, game_name: &str, record: &EncodedGameRecord) -> Result<PathBuf> {
        let file_name = format!("{}.json", content_hash(record.sgf.as_bytes()));
        let path = self.dir.join(&file_name);
        let json = serde_json::to_string(record).context("failed to serialize game record")?;
        fs::write(&path, json)
            .with_context(|| format!("failed to write record {}", path.display()))?;

        self.index.insert(
            game_name.to_string(),
            IndexEntry {
                record: file_name,
                positions: record.positions(),
                final_winrate: record.winrates.last().copied().unwrap_or(0.5),
                analysed_at: Local::now().to_rfc3339(),
            },
        );
        self.save_index()?;
        Ok(path)
    }

    fn save_index(&self) -> Result<()> {
        let path = self.dir.join(INDEX_FILE);
        let json =
            serde_json::to_string_pretty(&self.index).context("failed to serialize index")?;
        fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

/// 棋譜バイト列の内容ハッシュ（結果レコードのファイル名に使う）
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::encoder::EncodedGameRecord;

    fn sample_record() -> EncodedGameRecord {
        let mut record = EncodedGameRecord::new(5, "(;GM[1]SZ[5];B[cc])".to_string());
        record.winrates.push(0.4721);
        record.value_maps.push("AAAA".to_string());
        record
    }

    #[test]
    fn content_hash_is_stable_hex() {
        let hash = content_hash(b"abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn save_and_reopen_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ResultStore::open(dir.path()).unwrap();
        assert!(store.is_empty());

        let record = sample_record();
        let path = store.save("games/0001.sgf", &record).unwrap();
        assert!(path.exists());
        assert!(store.contains("games/0001.sgf"));

        let reopened = ResultStore::open(dir.path()).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.contains("games/0001.sgf"));
        assert!(!reopened.contains("games/0002.sgf"));

        // レコードはJSONとして読み戻せる
        let text = std::fs::read_to_string(&path).unwrap();
        let loaded: EncodedGameRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(loaded.board_size, 5);
        assert_eq!(loaded.winrates, vec![0.4721]);
    }

    #[test]
    fn index_file_is_sorted_and_pretty() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ResultStore::open(dir.path()).unwrap();
        store.save("b.sgf", &sample_record()).unwrap();
        store.save("a.sgf", &sample_record()).unwrap();

        let text = std::fs::read_to_string(dir.path().join("index.json")).unwrap();
        let a = text.find("a.sgf").unwrap();
        let b = text.find("b.sgf").unwrap();
        assert!(a < b, "index keys should be sorted");
        assert!(text.contains('\n'), "index should be pretty-printed");
    }
}
