//! OSのプロセス制御インターフェース
//!
//! デバッガのコアはこのトレイト越しにだけデバッグ対象を操作します。
//! Linux では [`PtraceTracee`] が ptrace(2) と waitpid(2) で実装します。

use crate::Result;
use nix::libc::user_regs_struct;
use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use tracing::trace;

/// waitpid で観測した状態変化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// シグナルで停止した（`code` は siginfo の si_code）
    Stopped { signal: Signal, code: i32 },
    /// 終了した
    Exited(i32),
    /// シグナルで終了した
    Signaled(Signal),
}

/// トレース対象プロセスへの操作
///
/// 実行制御（cont / step / wait）は `&mut self`、レジスタとメモリの読み書きは `&self` で行います。
pub trait Tracee {
    /// 実行を継続する
    fn cont(&mut self) -> Result<()>;
    /// 1命令だけ実行する
    fn step(&mut self) -> Result<()>;
    /// 次の状態変化までブロックする
    fn wait(&mut self) -> Result<TraceEvent>;
    /// トレースを解除する
    fn detach(&mut self) -> Result<()>;

    fn get_regs(&self) -> Result<user_regs_struct>;
    fn set_regs(&self, regs: user_regs_struct) -> Result<()>;
    /// アドレスから1ワード（8バイト）読み取る
    fn peek(&self, addr: u64) -> Result<u64>;
    /// アドレスに1ワード（8バイト）書き込む
    fn poke(&self, addr: u64, word: u64) -> Result<()>;
}

/// ptrace によるトレース対象
#[derive(Debug)]
pub struct PtraceTracee {
    pid: Pid,
}

impl PtraceTracee {
    /// 既に ptrace で停止しているプロセスを包む
    pub fn new(pid: Pid) -> Self {
        Self { pid }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// プロセス終了時に一緒に終了させるなどのトレースオプションを設定する
    pub fn set_options(&self) -> Result<()> {
        ptrace::setoptions(self.pid, ptrace::Options::PTRACE_O_EXITKILL)?;
        Ok(())
    }

    /// プロセスを強制終了する
    pub fn kill(&self) -> Result<()> {
        ptrace::kill(self.pid)?;
        Ok(())
    }
}

impl Tracee for PtraceTracee {
    fn cont(&mut self) -> Result<()> {
        ptrace::cont(self.pid, None)?;
        Ok(())
    }

    fn step(&mut self) -> Result<()> {
        ptrace::step(self.pid, None)?;
        Ok(())
    }

    fn wait(&mut self) -> Result<TraceEvent> {
        match waitpid(self.pid, None)? {
            WaitStatus::Stopped(_, signal) => {
                let siginfo = ptrace::getsiginfo(self.pid)?;
                trace!("stopped by {} (si_code={})", signal.as_str(), siginfo.si_code);
                Ok(TraceEvent::Stopped {
                    signal,
                    code: siginfo.si_code,
                })
            }
            WaitStatus::Exited(_, code) => Ok(TraceEvent::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Ok(TraceEvent::Signaled(signal)),
            status => Err(crate::TargetError::UnexpectedWaitStatus(format!("{:?}", status))),
        }
    }

    fn detach(&mut self) -> Result<()> {
        ptrace::detach(self.pid, None)?;
        Ok(())
    }

    fn get_regs(&self) -> Result<user_regs_struct> {
        Ok(ptrace::getregs(self.pid)?)
    }

    fn set_regs(&self, regs: user_regs_struct) -> Result<()> {
        ptrace::setregs(self.pid, regs)?;
        Ok(())
    }

    fn peek(&self, addr: u64) -> Result<u64> {
        let word = ptrace::read(self.pid, addr as ptrace::AddressType)?;
        Ok(word as u64)
    }

    fn poke(&self, addr: u64, word: u64) -> Result<()> {
        ptrace::write(self.pid, addr as ptrace::AddressType, word as nix::libc::c_long)?;
        Ok(())
    }
}
