//! デバッガのエラー型

use suzume_dwarf::DwarfError;
use suzume_target::{Signal, TargetError};
use thiserror::Error;

/// デバッガ操作のエラー
///
/// 検索の失敗（レジスタ名・関数・行・ブレークポイント）は回復可能で、状態を変更しません。
/// `ProcessExited` 以降はどの操作も OS を呼ばずに失敗します。
#[derive(Debug, Error)]
pub enum DebugError {
    #[error("unknown register '{0}'")]
    UnknownRegister(String),

    #[error("no register with DWARF number {0}")]
    UnknownDebugRegister(i32),

    #[error("breakpoint already exists at 0x{0:x}")]
    DuplicateBreakpoint(u64),

    #[error("no breakpoint {0}")]
    NoSuchBreakpoint(String),

    #[error("no function contains address 0x{0:x}")]
    NoEnclosingFunction(u64),

    #[error("no line information for address 0x{0:x}")]
    NoLineInfo(u64),

    #[error("no statement at {file}:{line}")]
    NoSuchLine { file: String, line: u64 },

    #[error("no function named '{0}'")]
    NoSuchFunction(String),

    #[error("unsupported variable location: {0}")]
    UnsupportedVariableLocation(String),

    #[error("process has exited")]
    ProcessExited,

    /// ステップ実行中にフォールトで停止した。プロセスは停止したまま
    #[error("process received {} (si_code={code})", .signal.as_str())]
    Fault { signal: Signal, code: i32 },

    /// ステップ実行中に別の理由で停止した
    #[error("stepping interrupted: {0}")]
    Interrupted(String),

    /// フレームポインタのチェーンが上限を超えた
    #[error("backtrace exceeded {0} frames")]
    UnwindLimit(usize),

    #[error("Not attached to a process")]
    NotAttached,

    #[error("DWARF information not loaded")]
    NoDebugInfo,

    #[error(transparent)]
    Target(TargetError),

    #[error(transparent)]
    Dwarf(DwarfError),
}

impl From<TargetError> for DebugError {
    fn from(e: TargetError) -> Self {
        match e {
            TargetError::UnknownRegister(name) => DebugError::UnknownRegister(name),
            TargetError::UnknownDebugRegister(n) => DebugError::UnknownDebugRegister(n),
            TargetError::ProcessExited => DebugError::ProcessExited,
            TargetError::Detached => DebugError::NotAttached,
            other => DebugError::Target(other),
        }
    }
}

impl From<DwarfError> for DebugError {
    fn from(e: DwarfError) -> Self {
        match e {
            DwarfError::NoEnclosingFunction(addr) => DebugError::NoEnclosingFunction(addr),
            DwarfError::NoLineInfo(addr) => DebugError::NoLineInfo(addr),
            DwarfError::NoSuchLine { file, line } => DebugError::NoSuchLine { file, line },
            DwarfError::NoSuchFunction(name) => DebugError::NoSuchFunction(name),
            DwarfError::UnsupportedVariableLocation(what) => {
                DebugError::UnsupportedVariableLocation(what)
            }
            other => DebugError::Dwarf(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_errors_are_flattened() {
        let e: DebugError = TargetError::UnknownDebugRegister(-1).into();
        assert!(matches!(e, DebugError::UnknownDebugRegister(-1)));

        let e: DebugError = TargetError::ProcessExited.into();
        assert!(matches!(e, DebugError::ProcessExited));

        let e: DebugError = TargetError::Detached.into();
        assert!(matches!(e, DebugError::NotAttached));

        let e: DebugError = DwarfError::NoLineInfo(0x10).into();
        assert!(matches!(e, DebugError::NoLineInfo(0x10)));
    }

    #[test]
    fn test_fault_message() {
        let e = DebugError::Fault {
            signal: Signal::SIGSEGV,
            code: 1,
        };
        assert_eq!(e.to_string(), "process received SIGSEGV (si_code=1)");
    }
}
