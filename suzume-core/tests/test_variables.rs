//! ローカル変数の位置特定のテスト

mod common;

use common::*;
use suzume_core::{DebugError, DebuggerConfig, ValueLocation};
use suzume_dwarf::{
    CompileUnit, DebugInfo, Function, LineRow, LineTable, SymbolResolver, Variable,
    VariableLocation,
};

#[test]
fn test_locals_in_memory_and_register() {
    let (_machine, debugger) = stopped_in_a();
    let rbp = debugger.read_register("rbp").unwrap();
    debugger.write_memory(rbp - 8, 7).unwrap();
    debugger.write_register("rax", 3).unwrap();

    let locals: Vec<_> = debugger
        .locals()
        .unwrap()
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(locals.len(), 2);

    assert_eq!(locals[0].name, "x");
    assert_eq!(locals[0].location, ValueLocation::Memory(rbp - 8));
    assert_eq!(locals[0].value, 7);
    assert!(!locals[0].is_parameter);

    assert_eq!(locals[1].name, "y");
    assert_eq!(locals[1].location, ValueLocation::Register(0));
    assert_eq!(locals[1].value, 3);
    assert!(locals[1].is_parameter);
}

#[test]
fn test_function_without_variables() {
    let (_machine, mut debugger) = demo();
    debugger.set_breakpoint(0x104c).unwrap();
    debugger.continue_execution().unwrap();

    assert!(debugger.locals().unwrap().is_empty());
}

/// a だけを持ち、変数のロケーションを差し替えたデバッグ情報
fn resolver_with(variable: Variable) -> SymbolResolver {
    let lines = LineTable::new(vec![
        LineRow::new(FILE, 10, 0x1000),
        LineRow::new(FILE, 11, 0x1008),
        LineRow::end_of_sequence(FILE, 0x1018),
    ]);
    let a = Function::new("a", A, 0x1018)
        .with_frame_base(expr(&[0x9c]))
        .with_variable(variable);
    SymbolResolver::new(DebugInfo::new(vec![CompileUnit::new(FILE, Vec::new(), vec![a], lines)]))
}

#[test]
fn test_frame_base_from_cfa() {
    let (_machine, mut debugger) = stopped_in_a();
    // DW_OP_call_frame_cfa をフレームベースに、fbreg -24 は rbp + 16 - 24 = rbp - 8
    debugger.set_debug_info(resolver_with(Variable::new(
        "x",
        VariableLocation::Expr(expr(&[0x91, 0x68])),
    )));
    let rbp = debugger.read_register("rbp").unwrap();
    debugger.write_memory(rbp - 8, 99).unwrap();

    let locals = debugger.locals().unwrap();
    let x = locals[0].as_ref().unwrap();
    assert_eq!(x.location, ValueLocation::Memory(rbp - 8));
    assert_eq!(x.value, 99);
}

#[test]
fn test_unsupported_locations() {
    let (_machine, mut debugger) = stopped_in_a();

    // DW_OP_lit1 DW_OP_stack_value
    debugger.set_debug_info(resolver_with(Variable::new(
        "constant",
        VariableLocation::Expr(expr(&[0x31, 0x9f])),
    )));
    assert!(matches!(
        debugger.locals().unwrap().as_slice(),
        [Err(DebugError::UnsupportedVariableLocation(_))]
    ));

    debugger.set_debug_info(resolver_with(Variable::new("gone", VariableLocation::Missing)));
    assert!(matches!(
        debugger.locals().unwrap().as_slice(),
        [Err(DebugError::UnsupportedVariableLocation(_))]
    ));
}

#[test]
fn test_unknown_register_in_expression() {
    let machine = demo_machine();
    let mut debugger = debugger_for(&machine, DebuggerConfig::default());
    debugger.set_breakpoint(0x1008).unwrap();
    debugger.continue_execution().unwrap();

    // DW_OP_regx 16 (戻りアドレス列) に対応するレジスタはない
    debugger.set_debug_info(resolver_with(Variable::new(
        "ra",
        VariableLocation::Expr(expr(&[0x90, 0x10])),
    )));
    assert!(matches!(
        debugger.locals().unwrap().as_slice(),
        [Err(DebugError::UnknownDebugRegister(16))]
    ));
}

#[test]
fn test_one_bad_variable_keeps_the_rest() {
    let (_machine, mut debugger) = stopped_in_a();
    let lines = LineTable::new(vec![
        LineRow::new(FILE, 10, 0x1000),
        LineRow::new(FILE, 11, 0x1008),
        LineRow::end_of_sequence(FILE, 0x1018),
    ]);
    let a = Function::new("a", A, 0x1018)
        .with_frame_base(expr(&[0x56]))
        .with_variable(Variable::new("gone", VariableLocation::Missing))
        .with_variable(Variable::new("x", VariableLocation::Expr(expr(&[0x91, 0x78]))))
        .with_variable(Variable::new("list", VariableLocation::List));
    debugger.set_debug_info(SymbolResolver::new(DebugInfo::new(vec![CompileUnit::new(
        FILE,
        Vec::new(),
        vec![a],
        lines,
    )])));
    let rbp = debugger.read_register("rbp").unwrap();
    debugger.write_memory(rbp - 8, 5).unwrap();

    let locals = debugger.locals().unwrap();
    assert_eq!(locals.len(), 3);
    assert!(matches!(locals[0], Err(DebugError::UnsupportedVariableLocation(_))));
    let x = locals[1].as_ref().unwrap();
    assert_eq!((x.name.as_str(), x.value), ("x", 5));
    assert!(matches!(locals[2], Err(DebugError::UnsupportedVariableLocation(_))));
}

#[test]
fn test_locals_outside_any_function() {
    let (machine, debugger) = demo();
    machine.update_regs(|regs| regs.rip = START);

    assert!(matches!(
        debugger.locals(),
        Err(DebugError::NoEnclosingFunction(START))
    ));
}
