//! Suzume CLI - コマンドラインインターフェース
//!
//! ネイティブプロセス用デバッガ suzume のREPLインターフェース

use anyhow::Result;
use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::ops::ControlFlow;
use suzume_core::{
    BreakLocation, BreakpointRef, Command, Debugger, DebuggerConfig, StopReason, Symbol,
    ValueLocation,
};
use tracing_subscriber::EnvFilter;

/// Suzume - native process debugger
#[derive(Parser)]
#[command(name = "suzume")]
#[command(version = "0.1.0")]
#[command(about = "Breakpoint and stepping debugger for x86-64 Linux processes", long_about = None)]
struct Cli {
    /// Function at which backtraces stop
    #[arg(long, global = true, default_value = "main")]
    entry_function: String,

    /// Maximum number of frames in a backtrace
    #[arg(long, global = true, default_value_t = 256)]
    max_frames: usize,

    #[command(subcommand)]
    command: DebugCommand,
}

#[derive(Subcommand)]
enum DebugCommand {
    /// Launch and debug an executable
    Run {
        /// Path to the executable binary
        binary: String,

        /// Arguments to pass to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Attach to an existing process
    Attach {
        /// Path to the executable binary
        binary: String,

        /// Process ID to attach to
        #[arg(short, long)]
        pid: i32,
    },
}

fn main() -> Result<()> {
    init_logging();

    println!("Suzume - native process debugger");
    println!("Version 0.1.0");
    println!();

    let cli = Cli::parse();
    let config = DebuggerConfig {
        entry_function: cli.entry_function,
        max_frames: cli.max_frames,
    };
    let mut debugger = init_debugger(cli.command, config)?;
    run_repl(&mut debugger)?;

    Ok(())
}

/// ログは標準エラーに出す（RUST_LOG がなければ warn）
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// デバッガを初期化してプロセスにアタッチまたは起動する
fn init_debugger(command: DebugCommand, config: DebuggerConfig) -> Result<Debugger> {
    let mut debugger = Debugger::with_config(config);

    match command {
        DebugCommand::Run { binary, args } => {
            println!("Loading binary: {}", binary);

            // バイナリからDWARF情報を読み込む
            debugger.load_binary(&binary)?;
            println!("Loaded DWARF information from {}", binary);

            // プロセスを起動
            debugger.spawn(&binary, &args)?;
            println!("Process {} spawned and stopped at first instruction", pid_of(&debugger));
            println!("Set breakpoints and use 'continue' to start execution");
            println!();
        }
        DebugCommand::Attach { binary, pid } => {
            println!("Loading binary: {}", binary);
            println!("Attaching to process: {}", pid);

            debugger.load_binary(&binary)?;
            println!("Loaded DWARF information from {}", binary);

            debugger.attach(pid)?;
            println!("Attached to process {}", pid);
            println!();
        }
    }

    if debugger.load_bias() != 0 {
        println!("PIE load bias: 0x{:x}", debugger.load_bias());
    }
    Ok(debugger)
}

fn pid_of(debugger: &Debugger) -> i32 {
    debugger.pid().unwrap_or_default()
}

/// REPLループを実行する
fn run_repl(debugger: &mut Debugger) -> Result<()> {
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("(suzume) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match handle_command(debugger, line) {
                    Ok(ControlFlow::Break(())) => break,
                    Ok(ControlFlow::Continue(())) => {}
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

fn handle_command(debugger: &mut Debugger, line: &str) -> Result<ControlFlow<()>> {
    let command = match Command::parse(line) {
        Some(command) => command,
        None => {
            handle_custom_command(debugger, line);
            return Ok(ControlFlow::Continue(()));
        }
    };

    match command {
        Command::Help => print_help(),
        Command::Quit => {
            println!("Goodbye!");
            return Ok(ControlFlow::Break(()));
        }
        Command::Break(location) => handle_break(debugger, location)?,
        Command::Delete(target) => {
            let address = resolve_breakpoint(debugger, target)?;
            debugger.remove_breakpoint(address)?;
            println!("Deleted breakpoint at 0x{:x}", address);
        }
        Command::Enable(target) => {
            let address = resolve_breakpoint(debugger, target)?;
            debugger.enable_breakpoint(address)?;
        }
        Command::Disable(target) => {
            let address = resolve_breakpoint(debugger, target)?;
            debugger.disable_breakpoint(address)?;
        }
        Command::Continue => {
            let reason = debugger.continue_execution()?;
            report_stop(debugger, &reason);
        }
        Command::StepInstruction => {
            let reason = debugger.single_step_instruction()?;
            report_stop(debugger, &reason);
        }
        Command::Step => {
            let row = debugger.step_in()?;
            println!("{}:{} (0x{:x})", row.file, row.line, debugger.get_pc()?);
        }
        Command::Next => {
            let reason = debugger.step_over()?;
            report_stop(debugger, &reason);
        }
        Command::Finish => {
            let reason = debugger.step_out()?;
            report_stop(debugger, &reason);
        }
        Command::RegisterRead(name) => {
            println!("{} = 0x{:x}", name, debugger.read_register(&name)?);
        }
        Command::RegisterWrite(name, value) => debugger.write_register(&name, value)?,
        Command::RegisterDump => {
            for (name, value) in debugger.dump_registers()? {
                println!("  {:<8} 0x{:016x}", name, value);
            }
        }
        Command::MemoryRead(address) => {
            let bytes = debugger.read_bytes(address, 8)?;
            let hex: Vec<String> = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            println!("0x{:x}: 0x{:016x}  [{}]", address, debugger.read_memory(address)?, hex.join(" "));
        }
        Command::MemoryWrite(address, value) => debugger.write_memory(address, value)?,
        Command::Backtrace => {
            for frame in debugger.backtrace()? {
                println!(
                    "#{:<2} 0x{:016x} in {}",
                    frame.index, frame.return_address, frame.function_name
                );
            }
        }
        Command::Locals => handle_locals(debugger)?,
        Command::Breakpoints => {
            let breakpoints = debugger.breakpoints();
            if breakpoints.is_empty() {
                println!("No breakpoints");
            }
            for bp in breakpoints {
                let state = if bp.enabled { "enabled" } else { "disabled" };
                println!("  {}. 0x{:x} ({}) {}", bp.id, bp.address, state, describe(debugger, bp.address));
            }
        }
    }

    Ok(ControlFlow::Continue(()))
}

/// Breakコマンドを処理する
fn handle_break(debugger: &mut Debugger, location: BreakLocation) -> Result<()> {
    let (id, address) = match location {
        BreakLocation::Address(address) => (debugger.set_breakpoint(address)?, address),
        BreakLocation::Line { file, line } => debugger.set_breakpoint_at_line(&file, line)?,
        BreakLocation::Function(name) => debugger.set_breakpoint_at_function(&name)?,
    };
    println!("Breakpoint {} set at 0x{:x} {}", id, address, describe(debugger, address));
    Ok(())
}

fn resolve_breakpoint(debugger: &Debugger, target: BreakpointRef) -> Result<u64> {
    Ok(match target {
        BreakpointRef::Id(id) => debugger.breakpoint_address(id)?,
        BreakpointRef::Address(address) => address,
    })
}

fn handle_locals(debugger: &Debugger) -> Result<()> {
    let locals = debugger.locals()?;
    if locals.is_empty() {
        println!("No locals");
    }
    for var in locals {
        let var = match var {
            Ok(var) => var,
            Err(e) => {
                println!("  <{}>", e);
                continue;
            }
        };
        let location = match var.location {
            ValueLocation::Memory(address) => format!("at 0x{:x}", address),
            ValueLocation::Register(number) => format!("in DWARF register {}", number),
        };
        let kind = if var.is_parameter { "arg" } else { "var" };
        println!("  {} {} = {} (0x{:x}) {}", kind, var.name, var.value as i64, var.value, location);
    }
    Ok(())
}

/// 停止理由と停止位置を表示する
fn report_stop(debugger: &Debugger, reason: &StopReason) {
    match reason {
        StopReason::HitBreakpoint(address) => {
            println!("Breakpoint hit at 0x{:x} {}", address, describe(debugger, *address));
        }
        StopReason::StepCompleted => {
            if let Ok(pc) = debugger.get_pc() {
                println!("0x{:x} {}", pc, describe(debugger, pc));
            }
        }
        StopReason::Fault { signal, code } => {
            println!("Program received {} (si_code={})", signal.as_str(), code);
            if let Ok(pc) = debugger.get_pc() {
                println!("Stopped at 0x{:x} {}", pc, describe(debugger, pc));
            }
        }
        StopReason::OtherSignal(signal) => println!("Program received {}", signal.as_str()),
        StopReason::Exited(code) => println!("Process exited with code {}", code),
        StopReason::Signaled(signal) => println!("Process terminated by {}", signal.as_str()),
    }
}

/// アドレスを「関数 (ファイル:行)」の形で表す
fn describe(debugger: &Debugger, address: u64) -> String {
    let function = debugger
        .function_at(address)
        .map(|f| f.name.clone())
        .ok()
        .or_else(|| debugger.reverse_resolve(address).map(|s| s.display_name().to_string()));
    let line = debugger.line_at(address).ok();

    match (function, line) {
        (Some(function), Some(row)) => format!("in {} ({}:{})", function, row.file, row.line),
        (Some(function), None) => format!("in {}", function),
        (None, Some(row)) => format!("at {}:{}", row.file, row.line),
        (None, None) => String::new(),
    }
}

/// シンボルリストを表示するヘルパー関数
fn print_symbol_list(title: &str, symbols: &[&Symbol], limit: Option<usize>) {
    if symbols.is_empty() {
        println!("No {} found", title);
        return;
    }

    let display_limit = limit.unwrap_or(symbols.len());
    println!("{} ({} found):", title, symbols.len());

    for (i, sym) in symbols.iter().take(display_limit).enumerate() {
        if sym.size > 0 {
            println!("  {}. {} @ 0x{:x} (size: {})", i + 1, sym.display_name(), sym.address, sym.size);
        } else {
            println!("  {}. {} @ 0x{:x}", i + 1, sym.display_name(), sym.address);
        }
    }

    if symbols.len() > display_limit {
        println!("  ... and {} more", symbols.len() - display_limit);
    }
}

/// Commandにないコマンドを処理する
fn handle_custom_command(debugger: &Debugger, line: &str) {
    if let Some(pattern) = line.strip_prefix("find ") {
        let symbols = debugger.find_symbols(pattern.trim());
        let title = format!("Symbols matching '{}'", pattern.trim());
        print_symbol_list(&title, &symbols, Some(10));
    } else {
        println!("Unknown command: {}", line);
        println!("Type 'help' for available commands.");
    }
}

fn print_help() {
    println!("Available commands:");
    println!();
    println!("  help                        - Show this help message");
    println!("  quit/exit/q                 - Exit the debugger");
    println!();
    println!("Breakpoints:");
    println!("  break <addr|file:line|fn>   - Set breakpoint");
    println!("  delete|enable|disable <id|addr>");
    println!("  breakpoints                 - List breakpoints");
    println!();
    println!("Execution:");
    println!("  continue (c)                - Continue execution");
    println!("  stepi (si)                  - Execute one instruction");
    println!("  step (s)                    - Step to the next line, entering calls");
    println!("  next (n)                    - Step to the next line, over calls");
    println!("  finish (f)                  - Run until the current function returns");
    println!();
    println!("Inspection:");
    println!("  register read <name> | write <name> <value> | dump");
    println!("  memory read <addr> | write <addr> <value>");
    println!("  backtrace (bt)              - Show call stack");
    println!("  locals (l)                  - Show local variables");
    println!("  find <pattern>              - Find symbols matching pattern");
    println!();
    println!("Examples:");
    println!("  break main");
    println!("  break src/main.rs:8");
    println!("  break 0x401136");
    println!("  register write rax 42");
}
