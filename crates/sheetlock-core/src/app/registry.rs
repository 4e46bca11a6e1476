//! TaskRegistry - 取得したテーブルのメモリ上のビュー
//!
//! # フロー
//! 1. TableStore::read() でテーブル全体（A1 から既定の上限まで）を読む
//! 2. 1 行目（予約）を捨てる
//! 3. 2 行目をヘッダーとして HeaderLayout::parse()
//! 4. 3 行目以降をタスク行として保持
//!
//! 通信エラーは `Fetched::Unavailable` として返す（エラーにしない）。
//! 呼び出し側は「まだタスクがない」と同じ扱いでリトライする。

use tracing::debug;

use crate::domain::cell::{FIRST_TASK_ROW, HEADER_ROW};
use crate::domain::{
    CellRef, ClaimError, HeaderLayout, RangeSpec, Status, TaskConfig, Token,
};
use crate::ports::TableStore;

/// fetch の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// ストアに届かなかった
    Unavailable,
    /// テーブルはあるがヘッダー行がまだない
    NoHeader,
    Loaded(TaskRegistry),
}

impl Fetched {
    /// タスク行を 1 つ以上持つ registry（なければ None）
    pub fn into_tasks(self) -> Option<TaskRegistry> {
        match self {
            Fetched::Loaded(registry) if !registry.is_empty() => Some(registry),
            _ => None,
        }
    }
}

/// スキャン 1 回の判定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    /// 自分の token が書かれた行を見つけた
    Mine { index: usize, config: TaskConfig },
    /// 予約できる空き行（coordinator のみ）
    Free { index: usize },
    Nothing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRegistry {
    pub layout: HeaderLayout,
    pub rows: Vec<Vec<String>>,
}

impl TaskRegistry {
    pub async fn fetch<S>(store: &S, table: &str) -> Result<Fetched, ClaimError>
    where
        S: TableStore + ?Sized,
    {
        let range = RangeSpec::whole_table();
        let content = match store.read(table, range).await {
            Ok(content) => content,
            Err(err) => {
                debug!(range = %range.to_a1(table), error = %err, "table fetch failed");
                return Ok(Fetched::Unavailable);
            }
        };
        Ok(match Self::from_table(content)? {
            Some(registry) => Fetched::Loaded(registry),
            None => Fetched::NoHeader,
        })
    }

    /// 読み込んだ行（row 1 から）から作る。ヘッダー行がなければ None。
    pub fn from_table(mut content: Vec<Vec<String>>) -> Result<Option<Self>, ClaimError> {
        let header_index = (HEADER_ROW - 1) as usize;
        if content.len() <= header_index {
            return Ok(None);
        }
        let rows = content.split_off((FIRST_TASK_ROW - 1) as usize);
        let layout = HeaderLayout::parse(&content[header_index])?;
        Ok(Some(Self { layout, rows }))
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn status_of(&self, index: usize) -> Option<Status> {
        self.rows
            .get(index)
            .map(|row| Status::of_row(row, self.layout.status_index))
    }

    /// 行のステータスセル
    pub fn status_cell(&self, index: usize) -> CellRef {
        CellRef::for_task(index, self.layout.status_index)
    }

    /// 行の結果セル（content pointer）
    pub fn content_cell(&self, index: usize) -> CellRef {
        CellRef::for_task(index, self.layout.content_index)
    }

    /// 上から順に 1 行ずつ判定する
    ///
    /// - ステータス列に届かない行は飛ばす
    /// - ステータスセルがない行は空き扱い
    /// - 読めない値が入っている行は飛ばす（一致にも予約対象にもしない）
    /// - 自分の token なら Mine、空きかつ coordinator なら Free で打ち切る
    pub fn scan(&self, token: Token, can_reserve: bool) -> ScanResult {
        let status_index = self.layout.status_index;
        for (index, row) in self.rows.iter().enumerate() {
            if row.len() < status_index {
                continue;
            }
            let status = Status::of_row(row, status_index);
            if status.is_held_by(token) {
                let config = TaskConfig::from_columns(&self.layout.config_keys, &row[..status_index]);
                return ScanResult::Mine { index, config };
            }
            if can_reserve && status.is_claimable() {
                return ScanResult::Free { index };
            }
        }
        ScanResult::Nothing
    }
}
