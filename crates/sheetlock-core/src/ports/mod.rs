//! Ports - 抽象化レイヤー
//!
//! 外部システム（スプレッドシート API など）へのインターフェース。
//! 開発用・テスト用の実装は `impls` にある。

pub mod table_store;

pub use self::table_store::TableStore;
