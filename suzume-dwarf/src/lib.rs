//! Suzume DWARF デバッグ情報解析
//!
//! このクレートは、ELFファイルとDWARFデバッグ情報の解析機能を提供します。
//! コンパイルユニット・関数・行テーブルを一度だけ読み込み、アドレスと関数・ソース行の
//! 相互変換、変数ロケーション式の評価を行います。

pub mod error;
pub mod lines;
pub mod loader;
pub mod loc_eval;
pub mod resolver;
pub mod symbols;
pub mod unit;
pub mod utils;
pub mod variables;

pub use error::DwarfError;
pub use lines::{LineRow, LineTable};
pub use loader::DwarfLoader;
pub use loc_eval::{Loc, LocationEvaluator};
pub use resolver::SymbolResolver;
pub use symbols::{Symbol, SymbolTable};
pub use unit::{CompileUnit, DebugInfo, Function};
pub use variables::{LocationExpr, Variable, VariableLocation};

/// DWARF読み込みの結果型
pub type Result<T> = anyhow::Result<T>;
