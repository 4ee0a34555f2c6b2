//! Suzume ターゲットプロセス制御
//!
//! このクレートは、デバッグ対象のプロセスを制御するための低レベル機能を提供します。
//! ptrace、レジスタアクセス、メモリアクセス、INT3 の埋め込み、停止原因の分類などを行います。

pub mod breakpoint;
pub mod error;
pub mod memory;
pub mod process;
pub mod registers;
pub mod tracee;

pub use breakpoint::{SoftwareBreakpoint, INT3_LEN, INT3_OPCODE};
pub use error::{Result, TargetError};
pub use memory::{Memory, MemoryMapping};
pub use process::{Process, ProcessState, StopReason};
pub use registers::{Reg, RegisterDescriptor, Registers, REGISTERS};
pub use tracee::{PtraceTracee, TraceEvent, Tracee};

// 利用側が nix に直接依存しなくて済むように再エクスポート
pub use nix::libc::user_regs_struct;
pub use nix::sys::signal::Signal;
