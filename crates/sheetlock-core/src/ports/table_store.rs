//! TableStore port - 共有テーブルへの読み書き
//!
//! 認証・セッション・通信プロトコルはこの trait の外側にある。コアは認証済みの
//! ハンドルを受け取り、矩形レンジの read / write だけを使う。
//!
//! # 設計原則
//! - read と write は独立した往復。トランザクションはない。
//! - 書き込みはセル単位の上書き（マージしない）
//! - 通信エラーは [`StoreError::Unavailable`] 一つに畳む

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{CellRef, RangeSpec, StoreError};

#[async_trait]
pub trait TableStore: Send + Sync {
    /// レンジ内の行を読む
    ///
    /// 末尾の空セル・空行は返さなくてよい（スプレッドシート API と同じ）。
    async fn read(&self, table: &str, range: RangeSpec) -> Result<Vec<Vec<String>>, StoreError>;

    /// `top_left` を左上として `rows` を書き込む
    async fn write(
        &self,
        table: &str,
        top_left: CellRef,
        rows: Vec<Vec<String>>,
    ) -> Result<(), StoreError>;
}

/// 同じプロセス内の複数 node でストアを共有するため
#[async_trait]
impl<T: TableStore + ?Sized> TableStore for Arc<T> {
    async fn read(&self, table: &str, range: RangeSpec) -> Result<Vec<Vec<String>>, StoreError> {
        (**self).read(table, range).await
    }

    async fn write(
        &self,
        table: &str,
        top_left: CellRef,
        rows: Vec<Vec<String>>,
    ) -> Result<(), StoreError> {
        (**self).write(table, top_left, rows).await
    }
}
