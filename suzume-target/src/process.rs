//! プロセス制御機能
//!
//! デバッグ対象の状態遷移 `Stopped ⇄ Running → Stopped | Exited`（と `Detached`）を管理し、
//! 停止のたびに原因を分類します。

use crate::breakpoint::INT3_LEN;
use crate::memory::Memory;
use crate::registers::Registers;
use crate::tracee::{PtraceTracee, TraceEvent, Tracee};
use crate::{Result, TargetError};
use nix::sys::signal::Signal;
use std::ffi::CString;
use std::path::Path;
use tracing::{debug, info, warn};

/// SIGTRAP の si_code: INT3 などカーネルが送ったトラップ
pub const SI_KERNEL: i32 = 0x80;
/// SIGTRAP の si_code: x86-64 では syscall 命令をシングルステップしたときに届く。INT3 ではない
pub const TRAP_BRKPT: i32 = 1;
/// SIGTRAP の si_code: シングルステップ完了
pub const TRAP_TRACE: i32 = 2;

/// デバッグ対象の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// アタッチ（または起動）直後の停止状態
    Attached,
    Stopped,
    Running,
    Exited,
    Signaled,
    /// トレースを解除した。プロセスは動き続けているが操作はできない
    Detached,
}

/// 停止イベントの種類
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// ブレークポイントヒット。アドレスはINT3を置いた位置（PCも巻き戻し済み）
    HitBreakpoint(u64),
    /// ステップ実行完了
    StepCompleted,
    /// SIGSEGV などのフォールト。プロセスは停止したまま調べられる
    Fault { signal: Signal, code: i32 },
    /// その他のシグナル受信
    OtherSignal(Signal),
    /// プロセス終了
    Exited(i32),
    /// シグナルによるプロセス終了
    Signaled(Signal),
}

impl StopReason {
    /// この停止でプロセスが終了したか
    pub fn is_terminal(&self) -> bool {
        matches!(self, StopReason::Exited(_) | StopReason::Signaled(_))
    }
}

/// デバッグ対象のプロセス
pub struct Process<T: Tracee = PtraceTracee> {
    tracee: T,
    state: ProcessState,
}

impl<T: Tracee> Process<T> {
    /// 停止中のトレース対象からプロセスを作る
    pub fn from_tracee(tracee: T) -> Self {
        Self {
            tracee,
            state: ProcessState::Attached,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// まだ操作できる状態か
    pub fn is_alive(&self) -> bool {
        !matches!(
            self.state,
            ProcessState::Exited | ProcessState::Signaled | ProcessState::Detached
        )
    }

    /// 終了済み・解除済みなら OS を呼ばずに失敗する
    fn ensure_alive(&self) -> Result<&T> {
        match self.state {
            ProcessState::Exited | ProcessState::Signaled => Err(TargetError::ProcessExited),
            ProcessState::Detached => Err(TargetError::Detached),
            _ => Ok(&self.tracee),
        }
    }

    /// レジスタアクセスを取得する
    pub fn registers(&self) -> Result<Registers<'_, T>> {
        Ok(Registers::new(self.ensure_alive()?))
    }

    /// メモリアクセスを取得する
    pub fn memory(&self) -> Result<Memory<'_, T>> {
        Ok(Memory::new(self.ensure_alive()?))
    }

    /// プログラムカウンタを取得する
    pub fn get_pc(&self) -> Result<u64> {
        self.registers()?.get_pc()
    }

    /// プロセスを実行継続して停止イベントを待機する
    pub fn resume(&mut self) -> Result<StopReason> {
        self.ensure_alive()?;
        self.tracee.cont()?;
        self.state = ProcessState::Running;
        self.wait_for_stop(false)
    }

    /// 1命令だけ実行して停止する
    pub fn single_step(&mut self) -> Result<StopReason> {
        self.ensure_alive()?;
        self.tracee.step()?;
        self.state = ProcessState::Running;
        self.wait_for_stop(true)
    }

    /// トレースを解除する
    pub fn detach(&mut self) -> Result<()> {
        self.ensure_alive()?;
        self.tracee.detach()?;
        self.state = ProcessState::Detached;
        Ok(())
    }

    /// 次の状態変化を待ち、停止原因を分類する
    fn wait_for_stop(&mut self, stepping: bool) -> Result<StopReason> {
        let (signal, code) = match self.tracee.wait()? {
            TraceEvent::Exited(code) => {
                self.state = ProcessState::Exited;
                info!("process exited with status {}", code);
                return Ok(StopReason::Exited(code));
            }
            TraceEvent::Signaled(signal) => {
                self.state = ProcessState::Signaled;
                info!("process terminated by {}", signal.as_str());
                return Ok(StopReason::Signaled(signal));
            }
            TraceEvent::Stopped { signal, code } => (signal, code),
        };
        self.state = ProcessState::Stopped;

        // INT3 の実行でRIPは1バイト進んでいるので、ブレークポイントのアドレスに戻す
        if is_breakpoint_trap(signal, code) {
            let registers = self.registers()?;
            let pc = registers.get_pc()? - INT3_LEN;
            registers.set_pc(pc)?;
            debug!("hit breakpoint at 0x{:x}", pc);
            return Ok(StopReason::HitBreakpoint(pc));
        }

        let reason = classify(signal, code, stepping);
        match &reason {
            StopReason::Fault { signal, code } => {
                warn!("process received {} (si_code={})", signal.as_str(), code)
            }
            StopReason::OtherSignal(signal) => debug!("process received {}", signal.as_str()),
            _ => {}
        }
        Ok(reason)
    }
}

/// INT3 の実行による SIGTRAP か
fn is_breakpoint_trap(signal: Signal, code: i32) -> bool {
    signal == Signal::SIGTRAP && code == SI_KERNEL
}

/// ブレークポイント以外の停止シグナルを分類する
fn classify(signal: Signal, code: i32, stepping: bool) -> StopReason {
    match signal {
        Signal::SIGTRAP if stepping || code == TRAP_TRACE => StopReason::StepCompleted,
        Signal::SIGSEGV | Signal::SIGBUS | Signal::SIGFPE | Signal::SIGILL => {
            StopReason::Fault { signal, code }
        }
        other => StopReason::OtherSignal(other),
    }
}

impl Process<PtraceTracee> {
    /// 実行可能ファイルを起動してデバッグ対象プロセスを開始する
    ///
    /// 新しいプロセスをforkして起動し、PTRACE_TRACEMEを設定してから
    /// 指定された実行可能ファイルをexecveで実行します。
    /// プロセスはexecve直後に停止した状態で返されます。
    pub fn spawn<P: AsRef<Path>>(program: P, args: &[String]) -> anyhow::Result<Self> {
        use nix::sys::ptrace;
        use nix::sys::wait::{waitpid, WaitStatus};
        use nix::unistd::{execve, fork, ForkResult};

        let program_path = program
            .as_ref()
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid program path"))?;
        let program_cstring = CString::new(program_path)?;

        let mut cstring_args = vec![program_cstring.clone()];
        for arg in args {
            cstring_args.push(CString::new(arg.as_str())?);
        }

        // 環境変数は親プロセスから継承
        let env: Vec<CString> = std::env::vars()
            .map(|(key, val)| CString::new(format!("{}={}", key, val)).map_err(anyhow::Error::from))
            .collect::<anyhow::Result<Vec<_>>>()?;

        match unsafe { fork()? } {
            ForkResult::Parent { child } => match waitpid(child, None)? {
                WaitStatus::Stopped(_, _) => {
                    let tracee = PtraceTracee::new(child);
                    tracee.set_options()?;
                    info!("spawned {} as pid {}", program_path, child);
                    Ok(Self::from_tracee(tracee))
                }
                status => Err(anyhow::anyhow!("Unexpected wait status after execve: {:?}", status)),
            },
            ForkResult::Child => {
                ptrace::traceme()?;

                // execveを実行（成功すると戻ってこない）
                execve(&program_cstring, &cstring_args, &env)?;

                unreachable!("execve failed");
            }
        }
    }

    /// 既存のプロセスにアタッチする
    ///
    /// PTRACE_ATTACH が送る SIGSTOP で停止するまで待ちます。
    pub fn attach(pid: i32) -> anyhow::Result<Self> {
        use nix::sys::wait::{waitpid, WaitStatus};

        let pid = nix::unistd::Pid::from_raw(pid);
        nix::sys::ptrace::attach(pid)?;

        match waitpid(pid, None)? {
            WaitStatus::Stopped(_, _) => {
                let tracee = PtraceTracee::new(pid);
                tracee.set_options()?;
                info!("attached to pid {}", pid);
                Ok(Self::from_tracee(tracee))
            }
            status => Err(anyhow::anyhow!("Unexpected wait status after attach: {:?}", status)),
        }
    }

    /// プロセスIDを取得する
    pub fn pid(&self) -> i32 {
        self.tracee.pid().as_raw()
    }

    /// プロセスを強制終了する
    pub fn kill(&mut self) -> Result<()> {
        self.ensure_alive()?.kill()?;
        self.wait_for_stop(false).map(|_| ())
    }
}

impl<T: Tracee> Drop for Process<T> {
    fn drop(&mut self) {
        if self.is_alive() {
            let _ = self.tracee.detach();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakpoint_trap() {
        assert!(is_breakpoint_trap(Signal::SIGTRAP, SI_KERNEL));
        // syscall 命令のシングルステップ
        assert!(!is_breakpoint_trap(Signal::SIGTRAP, TRAP_BRKPT));
        assert!(!is_breakpoint_trap(Signal::SIGTRAP, TRAP_TRACE));
        assert!(!is_breakpoint_trap(Signal::SIGSEGV, SI_KERNEL));
    }

    #[test]
    fn test_classify_step() {
        assert_eq!(classify(Signal::SIGTRAP, TRAP_TRACE, true), StopReason::StepCompleted);
        assert_eq!(classify(Signal::SIGTRAP, TRAP_TRACE, false), StopReason::StepCompleted);
        // ステップ中は si_code に関わらずステップ完了とみなす
        assert_eq!(classify(Signal::SIGTRAP, 0, true), StopReason::StepCompleted);
        assert_eq!(classify(Signal::SIGTRAP, TRAP_BRKPT, true), StopReason::StepCompleted);
    }

    #[test]
    fn test_classify_fault() {
        assert_eq!(
            classify(Signal::SIGSEGV, 1, false),
            StopReason::Fault {
                signal: Signal::SIGSEGV,
                code: 1
            }
        );
        assert!(matches!(classify(Signal::SIGFPE, 1, true), StopReason::Fault { .. }));
    }

    #[test]
    fn test_classify_other() {
        assert_eq!(classify(Signal::SIGINT, 0, false), StopReason::OtherSignal(Signal::SIGINT));
        assert_eq!(classify(Signal::SIGTRAP, 0, false), StopReason::OtherSignal(Signal::SIGTRAP));
    }
}
