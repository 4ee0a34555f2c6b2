//! 統合テスト共通のフィクスチャ
#![allow(dead_code)]

pub mod machine;

use machine::{FakeTracee, Insn, Machine};
use suzume_core::{Debugger, DebuggerConfig};
use suzume_dwarf::{
    CompileUnit, DebugInfo, Function, LineRow, LineTable, LocationExpr, SymbolResolver, Variable,
    VariableLocation,
};
use suzume_target::Process;

pub const FILE: &str = "/work/demo/src/main.rs";

pub const A: u64 = 0x1000;
pub const E: u64 = 0x1020;
pub const MAIN: u64 = 0x1040;
/// main の呼び出し元（関数の外）
pub const START: u64 = 0x2000;
pub const STACK_TOP: u64 = 0x8000;

/// `main → e → a` のプログラム
///
/// ```text
/// 10 fn a() {        0x1000 push rbp / mov rbp,rsp
/// 11     ...         0x1008 nop / nop
/// 12 }               0x1010 leave / ret
/// 20 fn e() {        0x1020 push rbp / mov rbp,rsp
/// 21     a();        0x1028 call a
/// 22     a();        0x102c call a
/// 23     ...         0x1030 nop
/// 24 }               0x1034 leave / ret
/// 30 fn main() {     0x1040 push rbp / mov rbp,rsp
/// 31     e();        0x1048 call e
/// 32     ...         0x104c nop
/// 33 }               0x1050 exit(0)
/// ```
pub fn demo_machine() -> Machine {
    let machine = Machine::new();
    machine.load(
        A,
        &[Insn::PushRbp, Insn::MovRbpRsp, Insn::Nop, Insn::Nop, Insn::Leave, Insn::Ret],
    );
    machine.load(
        E,
        &[
            Insn::PushRbp,
            Insn::MovRbpRsp,
            Insn::Call(A),
            Insn::Call(A),
            Insn::Nop,
            Insn::Leave,
            Insn::Ret,
        ],
    );
    machine.load(
        MAIN,
        &[Insn::PushRbp, Insn::MovRbpRsp, Insn::Call(E), Insn::Nop, Insn::Exit(0)],
    );
    machine.load(START, &[Insn::Exit(1)]);

    // main には START から呼ばれたものとして戻りアドレスを積んでおく
    machine.set_word(STACK_TOP, START);
    machine.update_regs(|regs| {
        regs.rip = MAIN;
        regs.rsp = STACK_TOP;
        regs.rbp = 0;
    });
    machine
}

fn encoding() -> gimli::Encoding {
    gimli::Encoding {
        format: gimli::Format::Dwarf32,
        version: 4,
        address_size: 8,
    }
}

pub fn expr(bytes: &[u8]) -> LocationExpr {
    LocationExpr::new(bytes.to_vec(), encoding())
}

/// [`demo_machine`] のデバッグ情報
///
/// a のフレームベースは rbp (DW_OP_reg6)。`x` は fbreg -8、`y` は rax に置かれる。
pub fn demo_debug_info() -> SymbolResolver {
    let lines = LineTable::new(vec![
        LineRow::new(FILE, 10, 0x1000),
        LineRow::new(FILE, 11, 0x1008),
        LineRow::new(FILE, 12, 0x1010),
        LineRow::new(FILE, 20, 0x1020),
        LineRow::new(FILE, 21, 0x1028),
        LineRow::new(FILE, 22, 0x102c),
        LineRow::new(FILE, 23, 0x1030),
        LineRow::new(FILE, 24, 0x1034),
        LineRow::new(FILE, 30, 0x1040),
        LineRow::new(FILE, 31, 0x1048),
        LineRow::new(FILE, 32, 0x104c),
        LineRow::new(FILE, 33, 0x1050),
        LineRow::end_of_sequence(FILE, 0x1054),
    ]);

    let mut y = Variable::new("y", VariableLocation::Expr(expr(&[0x50])));
    y.is_parameter = true;
    let a = Function::new("a", A, 0x1018)
        .with_frame_base(expr(&[0x56]))
        .with_variable(Variable::new("x", VariableLocation::Expr(expr(&[0x91, 0x78]))))
        .with_variable(y);

    let unit = CompileUnit::new(
        FILE,
        Vec::new(),
        vec![a, Function::new("e", E, 0x103c), Function::new("main", MAIN, 0x1054)],
        lines,
    );
    SymbolResolver::new(DebugInfo::new(vec![unit]))
}

pub fn debugger_for(machine: &Machine, config: DebuggerConfig) -> Debugger<FakeTracee> {
    let mut debugger = Debugger::with_process(Process::from_tracee(machine.tracee()), config);
    debugger.set_debug_info(demo_debug_info());
    debugger
}

/// main の先頭で停止しているデバッガ
pub fn demo() -> (Machine, Debugger<FakeTracee>) {
    let machine = demo_machine();
    let debugger = debugger_for(&machine, DebuggerConfig::default());
    (machine, debugger)
}

/// a の 11 行目（e からの1回目の呼び出し）で停止しているデバッガ
pub fn stopped_in_a() -> (Machine, Debugger<FakeTracee>) {
    let (machine, mut debugger) = demo();
    debugger.set_breakpoint(0x1008).unwrap();
    let reason = debugger.continue_execution().unwrap();
    assert_eq!(reason, suzume_core::StopReason::HitBreakpoint(0x1008));
    (machine, debugger)
}
