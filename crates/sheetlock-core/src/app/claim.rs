//! ClaimProtocol - 行の claim / lock / release 状態機械
//!
//! 1 node につき 1 インスタンス。TableStore のハンドルを所有し、
//! 「今どの行のステータスセルを握っているか」（lock handle）と
//! 「結果をどこに書くか」（content pointer）をプロセス内で保持する。
//!
//! # claim のフロー（1 パス）
//! 1. TaskRegistry::fetch() でテーブル全体を読む
//! 2. 上から順にスキャン
//!    - 自分の token が書かれた行 → その行を返して終了
//!    - 空き行かつ coordinator → token を書き込んで予約し、このパスは終了
//! 3. 次のパスで読み直し、自分の token が残っていれば claim 成功
//!
//! # 既知の競合
//! 「読む → token を書く」は atomic ではない。2 つの coordinator が同じ空き行に
//! 同時に token を書くと、後から書いた方が残る。負けた側は次のパスで自分の
//! token を見つけられず、黙って引き下がる（行は失われない）。
//! `verify_reservation` を有効にすると書き込み直後にセルを読み直して確認する。

use std::future::Future;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::registry::{ScanResult, TaskRegistry};
use super::retry::ClaimRetryPolicy;
use crate::config::NodeConfig;
use crate::domain::status::{FINISHED, FREE, PROCESSING};
use crate::domain::{
    CellRef, ClaimError, ClaimedTask, NodeId, NodeRole, RangeSpec, Status, Token,
};
use crate::ports::TableStore;

/// ステータスセルへの書き込みが実際に行われたか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockWrite {
    Written,
    /// worker はステータスを書かない
    NotCoordinator,
    /// lock handle を持っていない（警告のみ）
    NoLockHeld,
}

/// `run_claimed` の結果
#[derive(Debug)]
pub enum ScopedOutcome<E> {
    /// パス数を使い切っても claim できなかった
    NoWork,
    /// 結果を書いて完了にした
    Completed(ClaimedTask),
    /// 処理が失敗したので行を手放した
    Failed { task: ClaimedTask, error: E },
    /// 処理中に shutdown が来たので行を手放した
    Cancelled(ClaimedTask),
}

pub struct ClaimProtocol<S: TableStore> {
    store: S,
    role: NodeRole,
    node_id: NodeId,
    retry: ClaimRetryPolicy,
    verify_reservation: bool,
    table: Option<String>,
    lock: Option<CellRef>,
    content: Option<CellRef>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<S: TableStore> ClaimProtocol<S> {
    pub fn new(store: S, role: NodeRole) -> Self {
        Self {
            store,
            role,
            node_id: NodeId::new(),
            retry: ClaimRetryPolicy::default(),
            verify_reservation: false,
            table: None,
            lock: None,
            content: None,
            shutdown: None,
        }
    }

    pub fn from_config(store: S, config: &NodeConfig) -> Self {
        Self::new(store, config.role)
            .with_retry_policy(config.retry_policy())
            .verify_reservation(config.verify_reservation)
    }

    pub fn with_retry_policy(mut self, retry: ClaimRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn verify_reservation(mut self, verify: bool) -> Self {
        self.verify_reservation = verify;
        self
    }

    /// `true` が送られたら、次のパスの先頭（または処理中）で止まる
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn lock_handle(&self) -> Option<CellRef> {
        self.lock
    }

    pub fn content_pointer(&self) -> Option<CellRef> {
        self.content
    }

    /// 1 行を claim する
    ///
    /// - worker は `token` 必須（なければ `TokenRequired`）
    /// - coordinator で `token` がなければこの呼び出し用に 1 つ生成し、
    ///   リトライの間は同じ値を使う
    /// - パス数を使い切ったら `Ok(None)`（エラーではない）
    #[instrument(skip(self), fields(node = %self.node_id, role = %self.role))]
    pub async fn claim(
        &mut self,
        table: &str,
        token: Option<Token>,
    ) -> Result<Option<ClaimedTask>, ClaimError> {
        if !self.role.is_coordinator() && token.is_none() {
            return Err(ClaimError::TokenRequired);
        }
        if let Some(held) = self.lock {
            return Err(ClaimError::LockAlreadyHeld { row: held.row });
        }
        let token = token.unwrap_or_else(Token::generate);
        self.table = Some(table.to_string());
        self.content = None;

        let mut idle = 0u32;
        for attempt in 1..=self.retry.max_attempts {
            if self.shutdown_requested() {
                self.drop_reservation(token).await;
                return Err(ClaimError::Cancelled);
            }

            let Some(registry) = TaskRegistry::fetch(&self.store, table).await?.into_tasks() else {
                warn!(attempt, "can not get any valid tasks");
                idle += 1;
                self.backoff(attempt, idle).await;
                continue;
            };

            match registry.scan(token, self.role.is_coordinator()) {
                ScanResult::Mine { index, config } => {
                    let content = registry.content_cell(index);
                    if self.role.is_coordinator() {
                        let status_cell = registry.status_cell(index);
                        if self.lock.is_some_and(|pending| pending != status_cell) {
                            // 前のパスで予約した別の行は孤児になるので返す
                            self.drop_reservation(token).await;
                        }
                        self.lock = Some(status_cell);
                    }
                    self.content = Some(content);
                    info!(row = content.row, %config, attempt, "claimed task");
                    return Ok(Some(ClaimedTask { config, content }));
                }
                ScanResult::Free { index } => {
                    self.forget_lost_reservation();
                    let cell = registry.status_cell(index);
                    self.lock = Some(cell);
                    if let Err(err) = self.acquire_lock(token).await {
                        warn!(row = cell.row, error = %err, "failed to write reservation");
                        self.lock = None;
                        idle += 1;
                        self.backoff(attempt, idle).await;
                        continue;
                    }
                    if self.verify_reservation && !self.reservation_holds(table, cell, token).await {
                        debug!(row = cell.row, "reservation overwritten right after write");
                        self.lock = None;
                        idle += 1;
                        self.backoff(attempt, idle).await;
                        continue;
                    }
                    debug!(row = cell.row, attempt, "reserved row, confirming on next pass");
                }
                ScanResult::Nothing => {
                    self.forget_lost_reservation();
                    idle += 1;
                    self.backoff(attempt, idle).await;
                }
            }
        }

        // 最後のパスで予約したまま確認できなかった行は返しておく
        self.drop_reservation(token).await;
        warn!(max_attempts = self.retry.max_attempts, "can not get valid task config");
        Ok(None)
    }

    /// 握っている行に token を書く（予約）
    pub async fn acquire_lock(&mut self, token: Token) -> Result<LockWrite, ClaimError> {
        self.write_status(token.value(), "acquire", false).await
    }

    /// `1`（処理中）を書く。lock handle は保持したまま。
    pub async fn confirm(&mut self) -> Result<LockWrite, ClaimError> {
        self.write_status(PROCESSING, "confirm", false).await
    }

    /// `-1` を書いて lock handle を手放す
    ///
    /// 書き込みに失敗した場合は handle を残す（呼び出し側で再試行できる）。
    pub async fn release(&mut self) -> Result<LockWrite, ClaimError> {
        self.write_status(FREE, "release", true).await
    }

    /// `2`（完了）を書いて lock handle を手放す
    pub async fn finish(&mut self) -> Result<LockWrite, ClaimError> {
        self.write_status(FINISHED, "finish", true).await
    }

    /// 結果行を content pointer に書き、`finish()` する
    ///
    /// claim 前に呼ぶのはプロトコル違反なので `NotClaimed` を返す。
    #[instrument(skip(self, result), fields(node = %self.node_id))]
    pub async fn report(&mut self, result: Vec<String>) -> Result<LockWrite, ClaimError> {
        let (Some(content), Some(table)) = (self.content, self.table.as_deref()) else {
            return Err(ClaimError::NotClaimed);
        };
        self.store.write(table, content, vec![result]).await?;
        self.content = None;
        info!(row = content.row, "reported result");
        self.finish().await
    }

    /// 終了処理。握っている行があれば `-1` に戻す。
    ///
    /// プロセスが突然落ちた場合は呼ばれないので、行は予約されたまま残りうる。
    pub async fn shutdown(&mut self) -> Result<LockWrite, ClaimError> {
        self.content = None;
        if self.lock.is_none() {
            return Ok(LockWrite::NoLockHeld);
        }
        self.release().await
    }

    /// claim → confirm → `work` → report をひとまとめに行う
    ///
    /// `work` が失敗したとき、処理中に shutdown が来たとき、report が失敗したときは
    /// 必ず行を手放す（`-1` に戻す）。
    pub async fn run_claimed<F, Fut, E>(
        &mut self,
        table: &str,
        token: Option<Token>,
        work: F,
    ) -> Result<ScopedOutcome<E>, ClaimError>
    where
        F: FnOnce(ClaimedTask) -> Fut,
        Fut: Future<Output = Result<Vec<String>, E>>,
    {
        let Some(task) = self.claim(table, token).await? else {
            return Ok(ScopedOutcome::NoWork);
        };
        if let Err(err) = self.confirm().await {
            warn!(row = task.row(), error = %err, "failed to mark row as processing");
        }

        let run = work(task.clone());
        let result = match self.shutdown.as_mut() {
            Some(rx) => tokio::select! {
                result = run => Some(result),
                _ = wait_for_shutdown(rx) => None,
            },
            None => Some(run.await),
        };

        match result {
            Some(Ok(row)) => match self.report(row).await {
                Ok(_) => Ok(ScopedOutcome::Completed(task)),
                Err(err) => {
                    self.abandon_claim().await;
                    Err(err)
                }
            },
            Some(Err(error)) => {
                self.abandon_claim().await;
                Ok(ScopedOutcome::Failed { task, error })
            }
            None => {
                self.abandon_claim().await;
                Ok(ScopedOutcome::Cancelled(task))
            }
        }
    }

    async fn write_status(
        &mut self,
        value: i64,
        action: &'static str,
        clear: bool,
    ) -> Result<LockWrite, ClaimError> {
        if !self.role.is_coordinator() {
            return Ok(LockWrite::NotCoordinator);
        }
        let (Some(cell), Some(table)) = (self.lock, self.table.as_deref()) else {
            warn!(node = %self.node_id, action, "no lock held");
            return Ok(LockWrite::NoLockHeld);
        };
        self.store
            .write(table, cell, vec![vec![value.to_string()]])
            .await?;
        debug!(node = %self.node_id, action, row = cell.row, value, "status written");
        if clear {
            self.lock = None;
        }
        Ok(LockWrite::Written)
    }

    /// 未確認の予約を手放す（ベストエフォート）。失敗しても handle は捨てる。
    ///
    /// セルを読み直し、まだ自分の token が残っているときだけ `-1` を書く。
    /// 他の node が上書き済み（token や `1`）なら、その行には触らない。
    async fn drop_reservation(&mut self, token: Token) {
        let (Some(cell), Some(table)) = (self.lock, self.table.clone()) else {
            return;
        };
        if !self.reservation_holds(&table, cell, token).await {
            debug!(row = cell.row, "reservation already taken over, leaving the row alone");
            self.lock = None;
            return;
        }
        if let Err(err) = self.release().await {
            warn!(row = cell.row, error = %err, "failed to release reservation; row stays reserved");
        }
        self.lock = None;
    }

    /// confirm 済みの行を手放す。失敗しても handle は捨てる。
    async fn abandon_claim(&mut self) {
        self.content = None;
        let Some(cell) = self.lock else {
            return;
        };
        if let Err(err) = self.release().await {
            warn!(row = cell.row, error = %err, "failed to release claimed row; row stays reserved");
        }
        self.lock = None;
    }

    /// 前のパスの予約が他の node に上書きされていたら、黙って handle を捨てる
    fn forget_lost_reservation(&mut self) {
        if let Some(lost) = self.lock.take() {
            debug!(row = lost.row, "reservation lost to another node, backing off");
        }
    }

    async fn reservation_holds(&self, table: &str, cell: CellRef, token: Token) -> bool {
        match self.store.read(table, RangeSpec::single(cell)).await {
            Ok(rows) => {
                let value = rows.first().and_then(|row| row.first()).map(String::as_str);
                Status::parse(value).is_held_by(token)
            }
            Err(err) => {
                debug!(row = cell.row, error = %err, "reservation check failed");
                false
            }
        }
    }

    async fn backoff(&self, attempt: u32, idle: u32) {
        if attempt >= self.retry.max_attempts {
            return;
        }
        let delay = self.retry.delay_for(idle, &mut rand::thread_rng());
        if !delay.is_zero() {
            debug!(?delay, "no task this pass, backing off");
            tokio::time::sleep(delay).await;
        }
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

impl<S: TableStore> Drop for ClaimProtocol<S> {
    fn drop(&mut self) {
        if let Some(cell) = self.lock {
            warn!(
                node = %self.node_id,
                row = cell.row,
                "claim protocol dropped while holding a lock; call shutdown() to release it"
            );
        }
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // 送信側がいなくなったら shutdown は来ない
            std::future::pending::<()>().await;
        }
    }
}
