//! Impls - TableStore の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryTableStore**: テスト用。失敗注入と呼び出し回数つき。
//! - **FileTableStore**: JSON ファイル。複数プロセスの demo 用。
//!
//! 本番のリモートストア（スプレッドシート API など）は別クレートで
//! `TableStore` を実装する想定。

pub mod file_table;
pub mod inmem_table;
pub mod sheet;

pub use self::file_table::FileTableStore;
pub use self::inmem_table::InMemoryTableStore;
pub use self::sheet::Sheet;
