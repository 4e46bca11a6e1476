//! Errors - エラー型と分類
//!
//! # 分類
//! - **Config**（致命的）: ヘッダー不正。リトライしても直らない。
//! - **TokenRequired**（致命的）: token なしで worker として claim した。
//! - **StoreUnavailable**（一時的）: TableStore の通信失敗。claim の読み込みでは
//!   リトライループ内で吸収し、書き込みでは呼び出し側に返す。
//! - **ProtocolWarning**（非致命）: ロックを持たずに lock 操作を呼んだ。
//!   エラーにはせず `tracing::warn!` で記録する。

use thiserror::Error;

use super::header::HeaderError;

/// TableStore の通信エラー
///
/// 中身（HTTP ステータスなど）はコアからは見ない。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("table store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        StoreError::Unavailable(reason.into())
    }
}

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("invalid table header: {0}")]
    Config(#[from] HeaderError),

    #[error("a token is required for a worker node")]
    TokenRequired,

    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    #[error("no claimed task to report on (report called before claim)")]
    NotClaimed,

    #[error("node already holds a lock on row {row}; release or finish it first")]
    LockAlreadyHeld { row: u32 },

    #[error("claim cancelled by shutdown")]
    Cancelled,
}

impl ClaimError {
    /// リトライで回復しうるエラーか
    pub fn is_transient(&self) -> bool {
        matches!(self, ClaimError::StoreUnavailable(_))
    }
}
