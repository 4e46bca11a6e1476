//! sheetlock-core
//!
//! 共有テーブル（スプレッドシートなど）を台帳として、複数の node が中央の
//! スケジューラなしに 1 行ずつタスクを取り合うためのプロトコル。
//!
//! # モジュール構成
//! - **domain**: セル座標、ヘッダー、ステータス、token、エラー
//! - **ports**: 抽象化レイヤー（TableStore）
//! - **impls**: 実装（InMemoryTableStore, FileTableStore）
//! - **app**: TaskRegistry, ClaimProtocol, WorkerLoop
//! - **config**: node 設定（TOML）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{ClaimProtocol, ClaimRetryPolicy, LockWrite, ScopedOutcome, TaskHandler, WorkerLoop};
pub use config::{NodeConfig, SettingsError};
pub use domain::{CellRef, ClaimError, ClaimedTask, NodeRole, RangeSpec, StoreError, TaskConfig, Token};
pub use ports::TableStore;
