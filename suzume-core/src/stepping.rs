//! ステップ実行
//!
//! 命令単位のステップと、行単位のステップ（step in / step over / step out）を提供します。
//! 行単位のステップは一時ブレークポイントを使い、どの経路で終わっても後片付けします。

use crate::{DebugError, Debugger, Result};
use suzume_dwarf::LineRow;
use suzume_target::{Reg, StopReason, Tracee};
use tracing::{debug, trace};

/// ステップ実行を続けられない停止をエラーにする
fn expect_step(reason: StopReason) -> Result<()> {
    match reason {
        StopReason::StepCompleted => Ok(()),
        StopReason::Fault { signal, code } => Err(DebugError::Fault { signal, code }),
        StopReason::Exited(_) | StopReason::Signaled(_) => Err(DebugError::ProcessExited),
        StopReason::HitBreakpoint(address) => {
            Err(DebugError::Interrupted(format!("trap at 0x{:x}", address)))
        }
        StopReason::OtherSignal(signal) => {
            Err(DebugError::Interrupted(format!("received {}", signal.as_str())))
        }
    }
}

impl<T: Tracee> Debugger<T> {
    /// 1命令だけ実行し、停止原因をそのまま返す
    ///
    /// PCにブレークポイントがあれば外してから実行します。
    pub fn single_step_instruction(&mut self) -> Result<StopReason> {
        let pc = self.get_pc()?;
        let process = self.process.as_mut().ok_or(DebugError::NotAttached)?;
        match self.breakpoints.step_over_breakpoint(process, pc)? {
            Some(reason) => Ok(reason),
            None => Ok(process.single_step()?),
        }
    }

    /// 1命令だけ実行し、新しいPCの行を返す
    pub fn step_instruction(&mut self) -> Result<LineRow> {
        expect_step(self.single_step_instruction()?)?;
        self.current_line()
    }

    /// 行が変わるまで命令単位でステップする（呼び出し先にも入る）
    pub fn step_in(&mut self) -> Result<LineRow> {
        let start = self.current_line()?;
        debug!("step in from {}:{}", start.file, start.line);
        loop {
            let row = self.step_instruction()?;
            if row.line != start.line || row.file != start.file {
                return Ok(row);
            }
        }
    }

    /// 現在の関数から戻るまで実行する
    pub fn step_out(&mut self) -> Result<StopReason> {
        let return_address = self.return_address()?;
        debug!("step out to 0x{:x}", return_address);
        self.install_temporaries([return_address])?;
        self.resume_and_clean()
    }

    /// 呼び出しには入らずに次の行まで実行する
    ///
    /// 関数内の他の行すべてと戻りアドレスに一時ブレークポイントを置いて、1回だけ実行継続します。
    /// 分岐先を解析しないため、再帰呼び出しの中で同じ関数の行に止まることがあります。
    pub fn step_over(&mut self) -> Result<StopReason> {
        let pc = self.get_pc()?;
        let start = self.line_at(pc)?;

        let targets: Vec<u64> = {
            let function = self.function_at(pc)?;
            let start_address = self.to_dwarf(start.address);
            self.require_resolver()?
                .line_rows_in(function)
                .filter(|row| row.address != start_address)
                .map(|row| self.to_runtime(row.address))
                .collect()
        };
        let return_address = self.return_address()?;
        debug!(
            "step over {}:{} with {} line targets, return to 0x{:x}",
            start.file,
            start.line,
            targets.len(),
            return_address
        );

        self.install_temporaries(targets.into_iter().chain(Some(return_address)))?;
        self.resume_and_clean()
    }

    /// フレームポインタから戻りアドレス `[rbp + 8]` を読む
    fn return_address(&self) -> Result<u64> {
        let process = self.require_process()?;
        let frame_pointer = process.registers()?.get(Reg::Rbp)?;
        Ok(process.memory()?.read_u64(frame_pointer.wrapping_add(8))?)
    }

    /// ブレークポイントがまだないアドレスにだけ一時ブレークポイントを置く
    ///
    /// 途中で失敗した場合は、それまでに置いたものを削除してからエラーを返します。
    fn install_temporaries(&mut self, addresses: impl IntoIterator<Item = u64>) -> Result<()> {
        let process = self.process.as_ref().ok_or(DebugError::NotAttached)?;
        for address in addresses {
            if self.breakpoints.contains(address) {
                continue;
            }
            let installed = process
                .memory()
                .map_err(DebugError::from)
                .and_then(|memory| self.breakpoints.set_temporary(address, &memory));
            if let Err(e) = installed {
                let _ = self.breakpoints.clear_temporaries(process);
                return Err(e);
            }
        }
        trace!("{} breakpoints installed", self.breakpoints.count());
        Ok(())
    }

    /// 実行継続し、結果に関わらず一時ブレークポイントを削除する
    fn resume_and_clean(&mut self) -> Result<StopReason> {
        let result = self.continue_execution();
        let process = self.process.as_ref().ok_or(DebugError::NotAttached)?;
        let cleaned = self.breakpoints.clear_temporaries(process);
        let reason = result?;
        cleaned?;
        Ok(reason)
    }
}
