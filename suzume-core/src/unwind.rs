//! フレームポインタによるスタック巻き戻し

use crate::{DebugError, Debugger, Result};
use suzume_target::{Reg, Tracee};
use tracing::trace;

/// スタックフレーム
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub index: usize,
    pub function_name: String,
    /// フレーム0では現在のPC、それ以外では呼び出し元への戻りアドレス
    pub return_address: u64,
}

impl<T: Tracee> Debugger<T> {
    /// バックトレースを取得する
    ///
    /// `[rbp + 8]` を戻りアドレス、`[rbp]` を呼び出し元の rbp として辿り、
    /// エントリ関数のフレームで止まります。フレームポインタを省略した関数があると
    /// 呼び出し元を飛ばします。
    pub fn backtrace(&self) -> Result<Vec<StackFrame>> {
        let process = self.require_process()?;
        let memory = process.memory()?;
        let registers = process.registers()?;

        let pc = registers.get_pc()?;
        let mut function = self.function_at(pc)?;
        let mut frames = vec![StackFrame {
            index: 0,
            function_name: function.name.clone(),
            return_address: pc,
        }];

        let mut frame_pointer = registers.get(Reg::Rbp)?;
        while function.name != self.config.entry_function {
            if frames.len() >= self.config.max_frames {
                return Err(DebugError::UnwindLimit(self.config.max_frames));
            }

            let return_address = memory.read_u64(frame_pointer.wrapping_add(8))?;
            // 戻りアドレスは call の直後を指すので、1バイト手前で関数を引く
            function = self.function_at(return_address.wrapping_sub(1))?;
            trace!(
                "frame #{}: {} (fp=0x{:x}, ret=0x{:x})",
                frames.len(),
                function.name,
                frame_pointer,
                return_address
            );
            frames.push(StackFrame {
                index: frames.len(),
                function_name: function.name.clone(),
                return_address,
            });
            frame_pointer = memory.read_u64(frame_pointer)?;
        }

        Ok(frames)
    }
}
