//! デバッガコマンド

use crate::breakpoint::BreakpointId;
use crate::parse::{parse_address, parse_location, BreakLocation};

/// ブレークポイントの指定（IDまたはアドレス）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointRef {
    Id(BreakpointId),
    Address(u64),
}

impl BreakpointRef {
    fn parse(s: &str) -> Option<Self> {
        if s.starts_with("0x") || s.starts_with("0X") {
            parse_address(s).ok().map(BreakpointRef::Address)
        } else {
            s.parse().ok().map(BreakpointRef::Id)
        }
    }
}

/// デバッガコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// ブレークポイントを設定
    Break(BreakLocation),
    /// ブレークポイントを削除
    Delete(BreakpointRef),
    Enable(BreakpointRef),
    Disable(BreakpointRef),
    /// 実行継続
    Continue,
    /// 1命令ステップ
    StepInstruction,
    /// ステップ実行
    Step,
    /// 次の行へ
    Next,
    /// 現在の関数から抜けるまで実行
    Finish,
    RegisterRead(String),
    RegisterWrite(String, u64),
    RegisterDump,
    MemoryRead(u64),
    MemoryWrite(u64, u64),
    /// バックトレース表示
    Backtrace,
    /// ローカル変数表示
    Locals,
    /// ブレークポイント一覧
    Breakpoints,
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }

        match (parts[0], &parts[1..]) {
            ("break" | "b", [location]) => parse_location(location).ok().map(Command::Break),
            ("delete" | "d", [target]) => BreakpointRef::parse(target).map(Command::Delete),
            ("enable", [target]) => BreakpointRef::parse(target).map(Command::Enable),
            ("disable", [target]) => BreakpointRef::parse(target).map(Command::Disable),
            ("continue" | "c", []) => Some(Command::Continue),
            ("stepi" | "si", []) => Some(Command::StepInstruction),
            ("step" | "s", []) => Some(Command::Step),
            ("next" | "n", []) => Some(Command::Next),
            ("finish" | "f", []) => Some(Command::Finish),
            ("register" | "reg", rest) => match rest {
                ["read", name] => Some(Command::RegisterRead(name.to_string())),
                ["write", name, value] => parse_address(value)
                    .ok()
                    .map(|value| Command::RegisterWrite(name.to_string(), value)),
                ["dump"] => Some(Command::RegisterDump),
                _ => None,
            },
            ("memory" | "mem", rest) => match rest {
                ["read", address] => parse_address(address).ok().map(Command::MemoryRead),
                ["write", address, value] => {
                    let address = parse_address(address).ok()?;
                    let value = parse_address(value).ok()?;
                    Some(Command::MemoryWrite(address, value))
                }
                _ => None,
            },
            ("backtrace" | "bt", []) => Some(Command::Backtrace),
            ("locals" | "l", []) => Some(Command::Locals),
            ("breakpoints" | "info", []) => Some(Command::Breakpoints),
            ("help" | "h" | "?", _) => Some(Command::Help),
            ("quit" | "q" | "exit", _) => Some(Command::Quit),
            _ => None,
        }
    }
}
