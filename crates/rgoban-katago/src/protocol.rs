//! 解析エンジンとのJSONメッセージ型
//!
//! 1行につき1メッセージ。キー名はエンジン側の命名（camelCase）に
//! 合わせ、`serde(rename)` で対応する。

use serde::{Deserialize, Serialize};

/// 局面解析クエリ。`moves` は (プレイヤートークン, 指し手トークン) の列。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisQuery {
    pub id: String,
    pub moves: Vec<(String, String)>,
    pub rules: String,
    pub komi: f64,
    #[serde(rename = "boardXSize")]
    pub board_x_size: u8,
    #[serde(rename = "boardYSize")]
    pub board_y_size: u8,
    #[serde(rename = "maxVisits")]
    pub max_visits: u32,
}

/// 起動時ハンドシェイクのバージョン問い合わせ
#[derive(Debug, Clone, Serialize)]
pub struct VersionQuery {
    pub id: String,
    pub action: &'static str,
}

impl VersionQuery {
    pub fn new(id: String) -> VersionQuery {
        VersionQuery {
            id,
            action: "query_version",
        }
    }
}

/// エンジンからの応答1行分。成功・エラー・警告のいずれも
/// この型で受け、`failure_message` で判別する。
#[derive(Debug, Clone, Deserialize)]
pub struct EngineResponse {
    pub id: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub warning: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default, rename = "rootInfo")]
    pub root_info: Option<RootInfo>,
    #[serde(default, rename = "moveInfos")]
    pub move_infos: Vec<MoveInfo>,
    /// `query_version` への応答にのみ含まれる
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub git_hash: Option<String>,
}

/// 局面全体の評価
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RootInfo {
    /// 手番側から見た勝率 [0,1]
    pub winrate: f64,
    #[serde(default)]
    pub visits: Option<u64>,
    #[serde(default, rename = "scoreLead")]
    pub score_lead: Option<f64>,
}

/// 候補手1つ分の統計
#[derive(Debug, Clone, Deserialize)]
pub struct MoveInfo {
    #[serde(rename = "move")]
    pub mv: String,
    /// 訪問数によるランク（0が最多）
    pub order: u32,
    #[serde(default)]
    pub visits: u64,
    #[serde(default)]
    pub winrate: f64,
    #[serde(default, rename = "scoreLead")]
    pub score_lead: Option<f64>,
}

impl EngineResponse {
    /// エラー/警告の応答であれば、人が読める1行のメッセージに
    /// まとめて返す。成功応答なら `None`。
    pub fn failure_message(&self) -> Option<String> {
        let (kind, field) = if let Some(error) = &self.error {
            (error, &self.field)
        } else if let Some(warning) = &self.warning {
            (warning, &self.field)
        } else {
            return None;
        };
        Some(match field {
            Some(field) => format!("{kind} in field '{field}'"),
            None => kind.clone(),
        })
    }

    /// 局面全体の勝率（成功応答でのみ存在する）
    pub fn root_winrate(&self) -> Option<f64> {
        self.root_info.map(|info| info.winrate)
    }

    pub fn root_visits(&self) -> u64 {
        self.root_info.and_then(|info| info.visits).unwrap_or(0)
    }

    /// 候補手を `order`（訪問数ランク）昇順で返す
    pub fn moves_by_order(&self) -> Vec<&MoveInfo> {
        let mut infos: Vec<&MoveInfo> = self.move_infos.iter().collect();
        infos.sort_by_key(|info| info.order);
        infos
    }
}
