//! テスト用の小さな x86-64 風マシン
//!
//! 命令はすべて4バイト固定長で、メモリ上には各命令の先頭バイトだけが意味を持つ
//! オペコードとして置かれます。先頭バイトが 0xCC なら本物の CPU と同じく
//! INT3 として扱い、PCを1バイト進めて SIGTRAP (SI_KERNEL) で停止します。
//! `Syscall` をシングルステップすると、Linux と同じく TRAP_BRKPT が届きます。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use suzume_target::{user_regs_struct, Result, Signal, TargetError, TraceEvent, Tracee};

pub const INSN_LEN: u64 = 4;
pub const MEMORY_SIZE: u64 = 0x10000;

const SI_KERNEL: i32 = 0x80;
const TRAP_BRKPT: i32 = 1;
const TRAP_TRACE: i32 = 2;
const SEGV_MAPERR: i32 = 1;
const ILL_ILLOPC: i32 = 1;

/// 継続実行で止まらないときの命令数の上限
const MAX_RUN: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insn {
    Nop,
    PushRbp,
    MovRbpRsp,
    Call(u64),
    Ret,
    Leave,
    Jmp(u64),
    /// 何もしないシステムコール
    Syscall,
    /// 不正なメモリアクセス（PCは進まない）
    Fault,
    Exit(i32),
}

impl Insn {
    fn opcode(self) -> u8 {
        match self {
            Insn::Nop => 0x90,
            Insn::PushRbp => 0x55,
            Insn::MovRbpRsp => 0x48,
            Insn::Call(_) => 0xe8,
            Insn::Ret => 0xc3,
            Insn::Leave => 0xc9,
            Insn::Jmp(_) => 0xe9,
            Insn::Syscall => 0x0f,
            Insn::Fault => 0x8b,
            Insn::Exit(_) => 0xf4,
        }
    }
}

struct State {
    regs: RefCell<user_regs_struct>,
    memory: RefCell<Vec<u8>>,
    program: RefCell<HashMap<u64, Insn>>,
    os_calls: Cell<usize>,
    exited: Cell<bool>,
    /// 直前に実行した命令が syscall だったか
    after_syscall: Cell<bool>,
    /// 書き込みを失敗させる
    read_only: Cell<bool>,
}

/// マシンへのハンドル。トレース対象と状態を共有する
#[derive(Clone)]
pub struct Machine {
    state: Rc<State>,
}

impl Machine {
    pub fn new() -> Self {
        // SAFETY: user_regs_struct はu64のみからなるため全ビット0は有効な値
        let regs: user_regs_struct = unsafe { std::mem::zeroed() };
        Self {
            state: Rc::new(State {
                regs: RefCell::new(regs),
                memory: RefCell::new(vec![0; MEMORY_SIZE as usize]),
                program: RefCell::new(HashMap::new()),
                os_calls: Cell::new(0),
                exited: Cell::new(false),
                after_syscall: Cell::new(false),
                read_only: Cell::new(false),
            }),
        }
    }

    /// `address` から命令列を配置する
    pub fn load(&self, address: u64, program: &[Insn]) {
        for (i, insn) in program.iter().enumerate() {
            let at = address + i as u64 * INSN_LEN;
            self.state.program.borrow_mut().insert(at, *insn);
            let mut memory = self.state.memory.borrow_mut();
            memory[at as usize] = insn.opcode();
            for pad in 1..INSN_LEN {
                memory[(at + pad) as usize] = 0x90;
            }
        }
    }

    pub fn regs(&self) -> user_regs_struct {
        *self.state.regs.borrow()
    }

    pub fn update_regs(&self, f: impl FnOnce(&mut user_regs_struct)) {
        f(&mut *self.state.regs.borrow_mut());
    }

    pub fn byte(&self, address: u64) -> u8 {
        self.state.memory.borrow()[address as usize]
    }

    pub fn word(&self, address: u64) -> Option<u64> {
        let memory = self.state.memory.borrow();
        let start = address as usize;
        let bytes = memory.get(start..start.checked_add(8)?)?;
        Some(u64::from_le_bytes(bytes.try_into().ok()?))
    }

    pub fn set_word(&self, address: u64, value: u64) -> bool {
        let mut memory = self.state.memory.borrow_mut();
        let start = address as usize;
        match start.checked_add(8).and_then(|end| memory.get_mut(start..end)) {
            Some(bytes) => {
                bytes.copy_from_slice(&value.to_le_bytes());
                true
            }
            None => false,
        }
    }

    /// 以降の書き込み（poke）をすべて失敗させる
    pub fn set_read_only(&self, read_only: bool) {
        self.state.read_only.set(read_only);
    }

    /// トレース対象に対して行われた操作の回数
    pub fn os_calls(&self) -> usize {
        self.state.os_calls.get()
    }

    pub fn tracee(&self) -> FakeTracee {
        FakeTracee {
            machine: self.clone(),
            pending: None,
        }
    }

    fn push(&self, regs: &mut user_regs_struct, value: u64) -> bool {
        regs.rsp = regs.rsp.wrapping_sub(8);
        self.set_word(regs.rsp, value)
    }

    fn pop(&self, regs: &mut user_regs_struct) -> Option<u64> {
        let value = self.word(regs.rsp)?;
        regs.rsp = regs.rsp.wrapping_add(8);
        Some(value)
    }

    /// 1命令実行する。停止すべきときはそのイベントを返す
    fn execute(&self) -> Option<TraceEvent> {
        let mut guard = self.state.regs.borrow_mut();
        let regs = &mut *guard;
        let pc = regs.rip;
        self.state.after_syscall.set(false);

        if pc < MEMORY_SIZE && self.byte(pc) == 0xcc {
            regs.rip = pc + 1;
            return Some(TraceEvent::Stopped {
                signal: Signal::SIGTRAP,
                code: SI_KERNEL,
            });
        }

        let insn = match self.state.program.borrow().get(&pc) {
            Some(insn) => *insn,
            None => {
                return Some(TraceEvent::Stopped {
                    signal: Signal::SIGILL,
                    code: ILL_ILLOPC,
                })
            }
        };
        let next = pc + INSN_LEN;
        let segv = TraceEvent::Stopped {
            signal: Signal::SIGSEGV,
            code: SEGV_MAPERR,
        };

        match insn {
            Insn::Nop => regs.rip = next,
            Insn::PushRbp => {
                let rbp = regs.rbp;
                if !self.push(regs, rbp) {
                    return Some(segv);
                }
                regs.rip = next;
            }
            Insn::MovRbpRsp => {
                regs.rbp = regs.rsp;
                regs.rip = next;
            }
            Insn::Call(target) => {
                if !self.push(regs, next) {
                    return Some(segv);
                }
                regs.rip = target;
            }
            Insn::Ret => match self.pop(regs) {
                Some(ret) => regs.rip = ret,
                None => return Some(segv),
            },
            Insn::Leave => {
                regs.rsp = regs.rbp;
                match self.pop(regs) {
                    Some(rbp) => regs.rbp = rbp,
                    None => return Some(segv),
                }
                regs.rip = next;
            }
            Insn::Jmp(target) => regs.rip = target,
            Insn::Syscall => {
                self.state.after_syscall.set(true);
                regs.rip = next;
            }
            Insn::Fault => return Some(segv),
            Insn::Exit(code) => {
                self.state.exited.set(true);
                return Some(TraceEvent::Exited(code));
            }
        }
        None
    }
}

enum Mode {
    Step,
    Continue,
}

/// [`Machine`] を操作するトレース対象
pub struct FakeTracee {
    machine: Machine,
    pending: Option<Mode>,
}

impl FakeTracee {
    fn syscall(&self) -> Result<()> {
        let state = &self.machine.state;
        state.os_calls.set(state.os_calls.get() + 1);
        if state.exited.get() {
            return Err(TargetError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such process",
            )));
        }
        Ok(())
    }

    fn fault(address: u64) -> TargetError {
        TargetError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("cannot access 0x{:x}", address),
        ))
    }
}

impl Tracee for FakeTracee {
    fn cont(&mut self) -> Result<()> {
        self.syscall()?;
        self.pending = Some(Mode::Continue);
        Ok(())
    }

    fn step(&mut self) -> Result<()> {
        self.syscall()?;
        self.pending = Some(Mode::Step);
        Ok(())
    }

    fn wait(&mut self) -> Result<TraceEvent> {
        self.syscall()?;
        match self.pending.take() {
            Some(Mode::Step) => Ok(self.machine.execute().unwrap_or_else(|| {
                let code = if self.machine.state.after_syscall.get() {
                    TRAP_BRKPT
                } else {
                    TRAP_TRACE
                };
                TraceEvent::Stopped {
                    signal: Signal::SIGTRAP,
                    code,
                }
            })),
            Some(Mode::Continue) => {
                for _ in 0..MAX_RUN {
                    if let Some(event) = self.machine.execute() {
                        return Ok(event);
                    }
                }
                Ok(TraceEvent::Stopped {
                    signal: Signal::SIGSTOP,
                    code: 0,
                })
            }
            None => Err(TargetError::UnexpectedWaitStatus("not running".to_string())),
        }
    }

    fn detach(&mut self) -> Result<()> {
        self.syscall()
    }

    fn get_regs(&self) -> Result<user_regs_struct> {
        self.syscall()?;
        Ok(self.machine.regs())
    }

    fn set_regs(&self, regs: user_regs_struct) -> Result<()> {
        self.syscall()?;
        self.machine.update_regs(|r| *r = regs);
        Ok(())
    }

    fn peek(&self, addr: u64) -> Result<u64> {
        self.syscall()?;
        self.machine.word(addr).ok_or_else(|| Self::fault(addr))
    }

    fn poke(&self, addr: u64, word: u64) -> Result<()> {
        self.syscall()?;
        if self.machine.state.read_only.get() {
            return Err(Self::fault(addr));
        }
        if self.machine.set_word(addr, word) {
            Ok(())
        } else {
            Err(Self::fault(addr))
        }
    }
}
