//! ターゲット制御のエラー型

use thiserror::Error;

/// プロセス制御・レジスタ・メモリアクセスのエラー
#[derive(Debug, Error)]
pub enum TargetError {
    /// レジスタ名が表にない
    #[error("unknown register '{0}'")]
    UnknownRegister(String),

    /// DWARFレジスタ番号に対応するレジスタがない
    #[error("no register with DWARF number {0}")]
    UnknownDebugRegister(i32),

    /// プロセスは終了済み
    #[error("process has exited")]
    ProcessExited,

    /// トレースは解除済み
    #[error("process has been detached")]
    Detached,

    /// 想定外の waitpid の結果
    #[error("unexpected wait status: {0}")]
    UnexpectedWaitStatus(String),

    /// ptrace / waitpid などのシステムコールエラー
    #[error("OS error: {0}")]
    Os(#[from] nix::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// ターゲット制御の結果型
pub type Result<T> = std::result::Result<T, TargetError>;
