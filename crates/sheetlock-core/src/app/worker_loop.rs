//! WorkerLoop - タスク実行ループ
//!
//! # フロー
//! 1. ClaimProtocol::run_claimed() で 1 行 claim → `1`（処理中）を書く
//! 2. TaskHandler::execute() で処理
//! 3. 成功なら結果を書いて `2`、失敗・shutdown なら `-1` に戻す
//! 4. claim できなくなる（パス数を使い切る）か shutdown まで繰り返す
//!
//! 終了時は必ず ClaimProtocol::shutdown() を呼び、握っている行を返す。
//!
//! worker role はステータスを書かないので、coordinator が `2` にするまで同じ行を
//! 何度でも拾う。worker では `max_tasks` を指定すること。

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};

use super::claim::{ClaimProtocol, ScopedOutcome};
use crate::domain::{ClaimError, ClaimedTask, Token};
use crate::ports::TableStore;

/// 連続失敗でループを止めるまでの回数（既定）
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// 1 行分の処理。返した値がそのまま結果列に書かれる。
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn execute(&self, task: &ClaimedTask) -> Result<Vec<String>, String>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoopSummary {
    pub completed: usize,
    pub failed: usize,
    /// shutdown で止まった
    pub cancelled: bool,
}

pub struct WorkerLoop<S: TableStore, H: TaskHandler> {
    protocol: ClaimProtocol<S>,
    handler: H,
    table: String,
    token: Option<Token>,
    max_tasks: Option<usize>,
    max_consecutive_failures: u32,
}

impl<S: TableStore, H: TaskHandler> WorkerLoop<S, H> {
    pub fn new(protocol: ClaimProtocol<S>, handler: H, table: impl Into<String>) -> Self {
        Self {
            protocol,
            handler,
            table: table.into(),
            token: None,
            max_tasks: None,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }

    /// worker では必須。coordinator で省略すると claim ごとに生成する。
    pub fn token(mut self, token: Option<Token>) -> Self {
        self.token = token;
        self
    }

    pub fn max_tasks(mut self, max_tasks: Option<usize>) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    pub fn max_consecutive_failures(mut self, n: u32) -> Self {
        self.max_consecutive_failures = n;
        self
    }

    pub fn protocol(&self) -> &ClaimProtocol<S> {
        &self.protocol
    }

    pub async fn run(&mut self) -> Result<LoopSummary, ClaimError> {
        let result = self.run_inner().await;
        if let Err(err) = self.protocol.shutdown().await {
            warn!(error = %err, "failed to release lock on shutdown");
        }
        result
    }

    async fn run_inner(&mut self) -> Result<LoopSummary, ClaimError> {
        let mut summary = LoopSummary::default();
        let mut consecutive_failures = 0u32;

        loop {
            if self
                .max_tasks
                .is_some_and(|max| summary.completed + summary.failed >= max)
            {
                info!(?summary, "task limit reached");
                break;
            }

            let handler = &self.handler;
            let outcome = match self
                .protocol
                .run_claimed(&self.table, self.token, |task| async move {
                    handler.execute(&task).await
                })
                .await
            {
                Ok(outcome) => outcome,
                Err(ClaimError::Cancelled) => {
                    summary.cancelled = true;
                    break;
                }
                Err(err) => return Err(err),
            };

            match outcome {
                ScopedOutcome::NoWork => {
                    info!(?summary, "all tasks have been completed");
                    break;
                }
                ScopedOutcome::Completed(task) => {
                    info!(row = task.row(), config = %task.config, "task finished");
                    summary.completed += 1;
                    consecutive_failures = 0;
                }
                ScopedOutcome::Failed { task, error } => {
                    error!(row = task.row(), config = %task.config, %error, "task failed, row released");
                    summary.failed += 1;
                    consecutive_failures += 1;
                    if consecutive_failures >= self.max_consecutive_failures {
                        warn!(consecutive_failures, "too many consecutive failures, stopping");
                        break;
                    }
                }
                ScopedOutcome::Cancelled(task) => {
                    info!(row = task.row(), "shutdown during task, row released");
                    summary.cancelled = true;
                    break;
                }
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::retry::ClaimRetryPolicy;
    use crate::domain::{CellRef, NodeRole};
    use crate::impls::InMemoryTableStore;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::watch;

    const TABLE: &str = "sweep";

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    async fn sweep_store(n: usize) -> Arc<InMemoryTableStore> {
        let store = Arc::new(InMemoryTableStore::new());
        let mut rows = vec![row(&[]), row(&["cfg.seed", "status", "result"])];
        for i in 0..n {
            rows.push(vec![i.to_string(), "-1".to_string()]);
        }
        store.insert_table(TABLE, rows).await;
        store
    }

    /// seed を 2 倍にして返す。`fail_first` 回だけ失敗する。
    struct Doubler {
        fail_first: AtomicU32,
    }

    impl Doubler {
        fn new(fail_first: u32) -> Self {
            Self {
                fail_first: AtomicU32::new(fail_first),
            }
        }
    }

    #[async_trait]
    impl TaskHandler for Doubler {
        async fn execute(&self, task: &ClaimedTask) -> Result<Vec<String>, String> {
            let left = self.fail_first.load(Ordering::SeqCst);
            if left > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(format!("intentional failure (left={left})"));
            }
            let seed: i64 = task
                .config
                .get("cfg.seed")
                .ok_or("missing seed")?
                .parse()
                .map_err(|e| format!("bad seed: {e}"))?;
            Ok(vec![(seed * 2).to_string()])
        }
    }

    #[tokio::test]
    async fn processes_every_row_then_stops() {
        let store = sweep_store(3).await;
        let protocol = ClaimProtocol::new(store.clone(), NodeRole::Coordinator);
        let mut worker = WorkerLoop::new(protocol, Doubler::new(0), TABLE);

        let summary = worker.run().await.unwrap();

        assert_eq!(
            summary,
            LoopSummary {
                completed: 3,
                failed: 0,
                cancelled: false
            }
        );
        let sheet = store.snapshot(TABLE).await.unwrap();
        assert_eq!(sheet.rows()[2], row(&["0", "2", "0"]));
        assert_eq!(sheet.rows()[3], row(&["1", "2", "2"]));
        assert_eq!(sheet.rows()[4], row(&["2", "2", "4"]));
        assert_eq!(worker.protocol().lock_handle(), None);
    }

    #[tokio::test]
    async fn failed_row_is_released_and_retried() {
        let store = sweep_store(1).await;
        let protocol = ClaimProtocol::new(store.clone(), NodeRole::Coordinator);
        let mut worker = WorkerLoop::new(protocol, Doubler::new(1), TABLE);

        let summary = worker.run().await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(store.cell(TABLE, CellRef::new(3, 2)).await.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn stops_after_consecutive_failures() {
        let store = sweep_store(1).await;
        let protocol = ClaimProtocol::new(store.clone(), NodeRole::Coordinator);
        let mut worker =
            WorkerLoop::new(protocol, Doubler::new(10), TABLE).max_consecutive_failures(2);

        let summary = worker.run().await.unwrap();

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.completed, 0);
        assert_eq!(store.cell(TABLE, CellRef::new(3, 2)).await.as_deref(), Some("-1"));
    }

    #[tokio::test]
    async fn respects_task_limit() {
        let store = sweep_store(5).await;
        let protocol = ClaimProtocol::new(store.clone(), NodeRole::Coordinator);
        let mut worker = WorkerLoop::new(protocol, Doubler::new(0), TABLE).max_tasks(Some(2));

        let summary = worker.run().await.unwrap();
        assert_eq!(summary.completed, 2);
        assert_eq!(store.cell(TABLE, CellRef::new(5, 2)).await.as_deref(), Some("-1"));
    }

    #[tokio::test]
    async fn shutdown_stops_loop() {
        let store = sweep_store(3).await;
        let (tx, rx) = watch::channel(true);
        let protocol = ClaimProtocol::new(store.clone(), NodeRole::Coordinator).with_shutdown(rx);
        let mut worker = WorkerLoop::new(protocol, Doubler::new(0), TABLE);

        let summary = worker.run().await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.completed, 0);
        drop(tx);
    }

    #[tokio::test]
    async fn worker_without_token_fails_fast() {
        let store = sweep_store(1).await;
        let protocol = ClaimProtocol::new(store.clone(), NodeRole::Worker);
        let mut worker = WorkerLoop::new(protocol, Doubler::new(0), TABLE);
        assert!(matches!(
            worker.run().await.unwrap_err(),
            ClaimError::TokenRequired
        ));
    }

    #[tokio::test]
    async fn worker_role_processes_preassigned_row() {
        let store = Arc::new(InMemoryTableStore::new());
        store
            .insert_table(
                TABLE,
                vec![
                    row(&[]),
                    row(&["cfg.seed", "status", "result"]),
                    row(&["21", "-1"]),
                    row(&["5", "424242"]),
                ],
            )
            .await;
        let protocol = ClaimProtocol::new(store.clone(), NodeRole::Worker)
            .with_retry_policy(ClaimRetryPolicy::immediate().max_attempts(2));
        let mut worker = WorkerLoop::new(protocol, Doubler::new(0), TABLE)
            .token(Some(Token::new(424242).unwrap()))
            .max_tasks(Some(1));

        let summary = worker.run().await.unwrap();

        assert_eq!(summary.completed, 1);
        assert_eq!(store.cell(TABLE, CellRef::new(4, 3)).await.as_deref(), Some("10"));
        // worker はステータスを書かない
        assert_eq!(store.cell(TABLE, CellRef::new(4, 2)).await.as_deref(), Some("424242"));
        assert_eq!(store.cell(TABLE, CellRef::new(3, 2)).await.as_deref(), Some("-1"));
    }
}
