//! Suzume デバッガのコア機能
//!
//! このクレートは、デバッガの中核となるロジックを提供します。
//! ブレークポイント管理、ステップ実行、スタック巻き戻し、変数の位置特定を
//! ターゲット制御とデバッグ情報の上に組み立てます。

pub mod breakpoint;
pub mod command;
pub mod config;
pub mod debugger;
pub mod errors;
pub mod parse;
pub mod stepping;
pub mod unwind;
pub mod variables;

pub use breakpoint::{Breakpoint, BreakpointId, BreakpointManager};
pub use command::{BreakpointRef, Command};
pub use config::DebuggerConfig;
pub use debugger::Debugger;
pub use errors::DebugError;
pub use parse::BreakLocation;
pub use unwind::StackFrame;
pub use variables::{ValueLocation, VariableValue};

// 他のクレートから使用するために再エクスポート
pub use suzume_dwarf::{LineRow, Symbol};
pub use suzume_target::{ProcessState, StopReason};

/// デバッガの結果型
pub type Result<T> = std::result::Result<T, DebugError>;
