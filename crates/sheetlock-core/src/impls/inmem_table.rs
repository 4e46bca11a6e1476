//! InMemoryTableStore - 開発用・テスト用の TableStore
//!
//! # 実装詳細
//! - `HashMap<String, Sheet>` でテーブル名ごとにグリッドを管理
//! - tokio の Mutex で排他制御（read / write はそれぞれ 1 往復として扱う）
//! - テスト用に read / write の失敗注入と呼び出し回数のカウンタを持つ
//!
//! 存在しないテーブルへの read / write は `Unavailable`（スプレッドシート API で
//! 存在しないタブを指定したときと同じ扱い）。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

use super::sheet::Sheet;
use crate::domain::{CellRef, RangeSpec, StoreError};
use crate::ports::TableStore;

pub struct InMemoryTableStore {
    tables: Mutex<HashMap<String, Sheet>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// テーブルを丸ごと置き換える（row 1 から）
    pub async fn insert_table(&self, table: &str, rows: Vec<Vec<String>>) {
        self.tables
            .lock()
            .await
            .insert(table.to_string(), Sheet::from_rows(rows));
    }

    /// テーブルのスナップショット
    pub async fn snapshot(&self, table: &str) -> Option<Sheet> {
        self.tables.lock().await.get(table).cloned()
    }

    pub async fn cell(&self, table: &str, cell: CellRef) -> Option<String> {
        self.tables
            .lock()
            .await
            .get(table)
            .and_then(|sheet| sheet.cell(cell).map(str::to_string))
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryTableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    async fn read(&self, table: &str, range: RangeSpec) -> Result<Vec<Vec<String>>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("injected read failure"));
        }
        let tables = self.tables.lock().await;
        let sheet = tables
            .get(table)
            .ok_or_else(|| StoreError::unavailable(format!("unknown table '{table}'")))?;
        Ok(sheet.read_range(&range))
    }

    async fn write(
        &self,
        table: &str,
        top_left: CellRef,
        rows: Vec<Vec<String>>,
    ) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("injected write failure"));
        }
        let mut tables = self.tables.lock().await;
        let sheet = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::unavailable(format!("unknown table '{table}'")))?;
        sheet.write_at(top_left, &rows);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let store = InMemoryTableStore::new();
        store
            .insert_table("runs", vec![row(&[]), row(&["cfg.a", "status"])])
            .await;

        store
            .write("runs", CellRef::new(3, 1), vec![row(&["x", "-1"])])
            .await
            .unwrap();
        let rows = store.read("runs", RangeSpec::whole_table()).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], row(&["x", "-1"]));
        assert_eq!(store.read_count(), 1);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn unknown_table_is_unavailable() {
        let store = InMemoryTableStore::new();
        let err = store.read("missing", RangeSpec::whole_table()).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn injected_failures() {
        let store = InMemoryTableStore::new();
        store.insert_table("runs", vec![row(&["a"])]).await;

        store.set_fail_reads(true);
        assert!(store.read("runs", RangeSpec::whole_table()).await.is_err());
        store.set_fail_reads(false);
        assert!(store.read("runs", RangeSpec::whole_table()).await.is_ok());

        store.set_fail_writes(true);
        assert!(
            store
                .write("runs", CellRef::new(1, 1), vec![row(&["b"])])
                .await
                .is_err()
        );
        assert_eq!(store.cell("runs", CellRef::new(1, 1)).await.as_deref(), Some("a"));
    }
}
