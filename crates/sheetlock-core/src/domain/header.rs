//! Header parser - ヘッダー行の解釈
//!
//! ヘッダー行は次の形でなければならない:
//!
//! ```text
//! cfg.<key1> | cfg.<key2> | ... | status | <result>
//! ```
//!
//! - 先頭から連続する `cfg.` 始まりのセルが設定キー（1 つ以上）
//! - その直後のセルがちょうど `status`
//! - さらに次の列が結果列

use thiserror::Error;

/// 設定キー列のマーカー
pub const CONFIG_PREFIX: &str = "cfg.";

/// ステータス列のヘッダー値
pub const STATUS_MARKER: &str = "status";

/// ヘッダー不正（致命的・リトライしない）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("no configuration columns: header must start with at least one 'cfg.' cell")]
    NoConfigColumns,

    #[error("configuration columns span the whole header; expected a 'status' column after them")]
    NoStatusColumn,

    #[error("expected header[{index}] = 'status', but got '{found}'")]
    StatusMarkerMismatch { index: usize, found: String },
}

/// パース済みヘッダー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLayout {
    /// 設定キー（`cfg.` 付きのまま、列順）
    pub config_keys: Vec<String>,
    /// ステータス列の 0-based index（== config_keys.len()）
    pub status_index: usize,
    /// 結果列の 0-based index（== status_index + 1）
    pub content_index: usize,
}

impl HeaderLayout {
    pub fn parse(header: &[String]) -> Result<Self, HeaderError> {
        let prefix_len = header
            .iter()
            .take_while(|cell| cell.starts_with(CONFIG_PREFIX))
            .count();

        if prefix_len == 0 {
            return Err(HeaderError::NoConfigColumns);
        }
        let Some(marker) = header.get(prefix_len) else {
            return Err(HeaderError::NoStatusColumn);
        };
        if marker != STATUS_MARKER {
            return Err(HeaderError::StatusMarkerMismatch {
                index: prefix_len,
                found: marker.clone(),
            });
        }

        Ok(Self {
            config_keys: header[..prefix_len].to_vec(),
            status_index: prefix_len,
            content_index: prefix_len + 1,
        })
    }
}
