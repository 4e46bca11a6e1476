//! FileTableStore - JSON ファイルを共有テーブルとして使う TableStore
//!
//! 同じファイルを複数の demo プロセスから読み書きするための実装。
//! ファイルの中身はテーブル名 → 行の配列:
//!
//! ```json
//! { "runs": [[], ["cfg.lr", "cfg.bs", "status", "result"], ["0.01", "32", "-1"]] }
//! ```
//!
//! 書き込みはファイル全体の read-modify-write で、置き換えは一時ファイル + rename。
//! 別プロセスの書き込みと混ざらないよう、読み込みから rename までは隣の
//! `<path>.lock` に排他ロック（fd-lock）を取る。読み込みはロックを取らない
//! （rename で置き換わるので書きかけは見えない）。
//!
//! セル単位では後勝ち。排他はプロトコル側の token に任せる。

use async_trait::async_trait;
use fd_lock::RwLock;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::sheet::Sheet;
use crate::domain::{CellRef, RangeSpec, StoreError};
use crate::ports::TableStore;

type Tables = BTreeMap<String, Sheet>;

pub struct FileTableStore {
    path: PathBuf,
}

impl FileTableStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// テーブルを作成（既にあれば置き換え）。ファイルがなければ作る。
    pub async fn put_table(&self, table: &str, rows: Vec<Vec<String>>) -> Result<(), StoreError> {
        let table = table.to_string();
        self.update(true, move |tables| {
            tables.insert(table, Sheet::from_rows(rows));
            Ok(())
        })
        .await
    }

    async fn load(&self) -> Result<Tables, StoreError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            StoreError::unavailable(format!("read {}: {e}", self.path.display()))
        })?;
        decode(&self.path, &bytes)
    }

    /// ロックを取ったうえで読み込み → `apply` → 書き戻し
    async fn update<F>(&self, create: bool, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Tables) -> Result<(), StoreError> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || update_locked(&path, create, apply))
            .await
            .map_err(|e| StoreError::unavailable(format!("file store task: {e}")))?
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

fn decode(path: &Path, bytes: &[u8]) -> Result<Tables, StoreError> {
    serde_json::from_slice(bytes)
        .map_err(|e| StoreError::unavailable(format!("decode {}: {e}", path.display())))
}

fn update_locked<F>(path: &Path, create: bool, apply: F) -> Result<(), StoreError>
where
    F: FnOnce(&mut Tables) -> Result<(), StoreError>,
{
    let lock_file = lock_path(path);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&lock_file)
        .map_err(|e| StoreError::unavailable(format!("open {}: {e}", lock_file.display())))?;
    let mut lock = RwLock::new(file);
    let _guard = lock
        .write()
        .map_err(|e| StoreError::unavailable(format!("lock {}: {e}", lock_file.display())))?;

    let mut tables = match std::fs::read(path) {
        Ok(bytes) => decode(path, &bytes)?,
        Err(e) if create && e.kind() == ErrorKind::NotFound => Tables::new(),
        Err(e) => {
            return Err(StoreError::unavailable(format!(
                "read {}: {e}",
                path.display()
            )));
        }
    };
    apply(&mut tables)?;

    let bytes = serde_json::to_vec_pretty(&tables)
        .map_err(|e| StoreError::unavailable(format!("encode: {e}")))?;
    let tmp = path.with_extension(format!("tmp-{}", ulid::Ulid::new()));
    std::fs::write(&tmp, bytes)
        .map_err(|e| StoreError::unavailable(format!("write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| StoreError::unavailable(format!("rename to {}: {e}", path.display())))
}

#[async_trait]
impl TableStore for FileTableStore {
    async fn read(&self, table: &str, range: RangeSpec) -> Result<Vec<Vec<String>>, StoreError> {
        let tables = self.load().await?;
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
        let table = table.to_string();
        self.update(false, move |tables| {
            let sheet = tables
                .get_mut(&table)
                .ok_or_else(|| StoreError::unavailable(format!("unknown table '{table}'")))?;
            sheet.write_at(top_left, &rows);
            Ok(())
        })
        .await
    }
}
