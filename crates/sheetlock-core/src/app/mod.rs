//! App - アプリケーション層
//!
//! ports を組み合わせてプロトコルを実装する。
//!
//! # 主要コンポーネント
//! - **TaskRegistry**: 取得したテーブル（ヘッダー + タスク行）とスキャン
//! - **ClaimProtocol**: claim / lock / release の状態機械
//! - **ClaimRetryPolicy**: パス数とバックオフ
//! - **WorkerLoop**: claim → 処理 → report の繰り返し

pub mod claim;
pub mod registry;
pub mod retry;
pub mod worker_loop;

pub use self::claim::{ClaimProtocol, LockWrite, ScopedOutcome};
pub use self::registry::{Fetched, ScanResult, TaskRegistry};
pub use self::retry::{ClaimRetryPolicy, RetrySettings};
pub use self::worker_loop::{LoopSummary, TaskHandler, WorkerLoop};
