use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::cell::CellRef;

/// node の役割
///
/// - Coordinator: 空き行に token を書いて予約し、ステータスの遷移を管理する
/// - Worker: 事前共有された token が書かれた行を拾うだけ（ステータスは書かない）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Coordinator,
    Worker,
}

impl NodeRole {
    pub fn is_coordinator(self) -> bool {
        matches!(self, NodeRole::Coordinator)
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Coordinator => f.write_str("coordinator"),
            NodeRole::Worker => f.write_str("worker"),
        }
    }
}

impl FromStr for NodeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "coordinator" => Ok(NodeRole::Coordinator),
            "worker" => Ok(NodeRole::Worker),
            other => Err(format!("unknown node role '{other}'")),
        }
    }
}

/// タスクの設定値（ヘッダーの列順を保つ）
///
/// JSON にはキー → 値のオブジェクトとして出す。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskConfig {
    entries: Vec<(String, String)>,
}

impl TaskConfig {
    /// キーと値を列順に組にする（短い方に合わせる）
    pub fn from_columns(keys: &[String], values: &[String]) -> Self {
        Self {
            entries: keys
                .iter()
                .zip(values)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for TaskConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl fmt::Display for TaskConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        f.write_str("}")
    }
}

/// claim に成功した行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimedTask {
    pub config: TaskConfig,
    /// 結果を書き込むセル（content pointer）
    pub content: CellRef,
}

impl ClaimedTask {
    /// テーブル上の行番号（1-based）
    pub fn row(&self) -> u32 {
        self.content.row
    }
}
