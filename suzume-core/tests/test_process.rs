//! 実プロセスに対するテスト
//!
//! ptrace の権限と、ビルド済みの hello_target が必要です:
//! `cargo build -p hello_target && cargo test -p suzume-core -- --ignored`

use suzume_core::{Debugger, StopReason};

const BINARY: &str = "../target/debug/hello_target";

fn launch() -> Debugger {
    let mut debugger = Debugger::new();
    debugger
        .load_binary(BINARY)
        .expect("Failed to load hello_target");
    debugger
        .spawn(BINARY, &[])
        .expect("Failed to spawn hello_target");
    debugger
}

#[test]
#[ignore]
fn test_break_in_a_and_backtrace() {
    let mut debugger = launch();

    let (_, address) = debugger.set_breakpoint_at_function("a").unwrap();
    println!("breakpoint at 0x{:x}", address);

    let reason = debugger.continue_execution().unwrap();
    assert_eq!(reason, StopReason::HitBreakpoint(address));
    assert_eq!(debugger.get_pc().unwrap(), address);

    let frames = debugger.backtrace().unwrap();
    for frame in &frames {
        println!("#{} {} 0x{:x}", frame.index, frame.function_name, frame.return_address);
    }
    let names: Vec<_> = frames.iter().map(|f| f.function_name.as_str()).collect();
    assert_eq!(names, ["a", "e", "main"]);

    let locals = debugger.locals().unwrap();
    assert!(locals.iter().flatten().any(|v| v.name == "x"));
}

#[test]
#[ignore]
fn test_step_over_and_run_to_exit() {
    let mut debugger = launch();
    debugger.set_breakpoint_at_line("hello_target/src/main.rs", 8).unwrap();
    debugger.continue_execution().unwrap();

    let before = debugger.breakpoint_addresses();
    debugger.step_over().unwrap();
    assert_eq!(debugger.breakpoint_addresses(), before);

    let address = before[0];
    debugger.remove_breakpoint(address).unwrap();
    assert_eq!(debugger.continue_execution().unwrap(), StopReason::Exited(0));
}
