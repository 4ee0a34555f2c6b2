//! デバッガのメインロジック

use crate::breakpoint::{Breakpoint, BreakpointId, BreakpointManager};
use crate::config::DebuggerConfig;
use crate::{DebugError, Result};
use std::path::{Path, PathBuf};
use suzume_dwarf::{DwarfLoader, Function, LineRow, Symbol, SymbolResolver, SymbolTable};
use suzume_target::memory::{load_base, mappings};
use suzume_target::{Process, ProcessState, PtraceTracee, StopReason, Tracee};
use tracing::{debug, info};

/// デバッガ
///
/// デバッグ情報のアドレスはリンク時のもので、実行時のアドレスとは `load_bias`
/// だけずれています（PIE 以外では 0）。公開APIはすべて実行時のアドレスで扱います。
pub struct Debugger<T: Tracee = PtraceTracee> {
    /// デバッグ対象プロセス
    pub(crate) process: Option<Process<T>>,
    /// 行・関数の解決器
    pub(crate) resolver: Option<SymbolResolver>,
    /// ELFシンボルテーブル（DWARFのない関数用）
    pub(crate) symbols: Option<SymbolTable>,
    /// ブレークポイント管理
    pub(crate) breakpoints: BreakpointManager,
    pub(crate) load_bias: u64,
    pub(crate) config: DebuggerConfig,
    binary: Option<PathBuf>,
    is_pie: bool,
}

impl Debugger {
    /// 新しいデバッガを作成する
    pub fn new() -> Self {
        Self::with_config(DebuggerConfig::default())
    }

    pub fn with_config(config: DebuggerConfig) -> Self {
        Self::empty(None, config)
    }

    /// ELFバイナリからDWARF情報とシンボルテーブルを読み込む
    pub fn load_binary<P: AsRef<Path>>(&mut self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let loader = DwarfLoader::load(path)?;
        let info = loader.debug_info()?;
        self.symbols = Some(SymbolTable::new(&loader)?);
        self.resolver = Some(SymbolResolver::new(info));
        self.is_pie = loader.is_pie();
        self.binary = Some(std::fs::canonicalize(path)?);
        info!("loaded debug info from {} (pie: {})", path.display(), self.is_pie);
        Ok(())
    }

    /// 実行可能ファイルを起動してデバッグを開始する
    ///
    /// プロセスはexecve直後に停止状態で開始されます。
    /// ユーザーは continue コマンドでプロセスを実行開始できます。
    pub fn spawn<P: AsRef<Path>>(&mut self, program: P, args: &[String]) -> anyhow::Result<()> {
        let process = Process::spawn(program, args)?;
        self.process = Some(process);
        self.update_load_bias()
    }

    /// 既存のプロセスにアタッチする
    pub fn attach(&mut self, pid: i32) -> anyhow::Result<()> {
        let process = Process::attach(pid)?;
        self.process = Some(process);
        self.update_load_bias()
    }

    /// PIE のロードベースを /proc/pid/maps から求める
    fn update_load_bias(&mut self) -> anyhow::Result<()> {
        self.load_bias = match (&self.process, &self.binary) {
            (Some(process), Some(binary)) if self.is_pie => {
                let maps = mappings(process.pid())?;
                let path = binary.to_string_lossy();
                load_base(&maps, &path)
                    .or_else(|| maps.first().map(|m| m.start))
                    .unwrap_or(0)
            }
            _ => 0,
        };
        debug!("load bias: 0x{:x}", self.load_bias);
        Ok(())
    }

    /// プロセスIDを取得する
    pub fn pid(&self) -> Option<i32> {
        self.process.as_ref().map(|p| p.pid())
    }

    /// デバッグ対象を強制終了する
    pub fn kill(&mut self) -> Result<()> {
        self.require_process_mut()?.kill()?;
        Ok(())
    }
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Tracee> Debugger<T> {
    fn empty(process: Option<Process<T>>, config: DebuggerConfig) -> Self {
        Self {
            process,
            resolver: None,
            symbols: None,
            breakpoints: BreakpointManager::new(),
            load_bias: 0,
            config,
            binary: None,
            is_pie: false,
        }
    }

    /// 停止中のプロセスを操作するデバッガを作成する
    pub fn with_process(process: Process<T>, config: DebuggerConfig) -> Self {
        Self::empty(Some(process), config)
    }

    /// 解析済みのデバッグ情報を設定する
    pub fn set_debug_info(&mut self, resolver: SymbolResolver) {
        self.resolver = Some(resolver);
    }

    pub fn set_symbol_table(&mut self, symbols: SymbolTable) {
        self.symbols = Some(symbols);
    }

    pub fn set_load_bias(&mut self, bias: u64) {
        self.load_bias = bias;
    }

    pub fn load_bias(&self) -> u64 {
        self.load_bias
    }

    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    pub(crate) fn require_process(&self) -> Result<&Process<T>> {
        self.process.as_ref().ok_or(DebugError::NotAttached)
    }

    pub(crate) fn require_process_mut(&mut self) -> Result<&mut Process<T>> {
        self.process.as_mut().ok_or(DebugError::NotAttached)
    }

    pub(crate) fn require_resolver(&self) -> Result<&SymbolResolver> {
        self.resolver.as_ref().ok_or(DebugError::NoDebugInfo)
    }

    /// デバッグ対象の状態（プロセスがなければ None）
    pub fn process_state(&self) -> Option<ProcessState> {
        self.process.as_ref().map(|p| p.state())
    }

    pub fn is_alive(&self) -> bool {
        self.process.as_ref().is_some_and(|p| p.is_alive())
    }

    // ---- アドレス変換 ----

    /// 実行時アドレスをDWARF上のアドレスに変換する
    pub(crate) fn to_dwarf(&self, address: u64) -> u64 {
        address.wrapping_sub(self.load_bias)
    }

    /// DWARF上のアドレスを実行時アドレスに変換する
    pub(crate) fn to_runtime(&self, address: u64) -> u64 {
        address.wrapping_add(self.load_bias)
    }

    /// 実行時アドレスを含む関数を返す
    pub fn function_at(&self, address: u64) -> Result<&Function> {
        self.require_resolver()?
            .function_containing(self.to_dwarf(address))
            .map_err(|_| DebugError::NoEnclosingFunction(address))
    }

    /// 実行時アドレスを含む行を返す（アドレスは実行時のものに直して返す）
    pub fn line_at(&self, address: u64) -> Result<LineRow> {
        let row = self
            .require_resolver()?
            .line_containing(self.to_dwarf(address))
            .map_err(|_| DebugError::NoLineInfo(address))?;
        let mut row = row.clone();
        row.address = self.to_runtime(row.address);
        Ok(row)
    }

    /// 現在のPCの行
    pub fn current_line(&self) -> Result<LineRow> {
        self.line_at(self.get_pc()?)
    }

    /// ELFシンボルテーブルでアドレスを逆引きする
    pub fn reverse_resolve(&self, address: u64) -> Option<&Symbol> {
        self.symbols.as_ref()?.reverse_resolve(self.to_dwarf(address))
    }

    /// パターンにマッチするシンボルを検索する
    pub fn find_symbols(&self, pattern: &str) -> Vec<&Symbol> {
        self.symbols
            .as_ref()
            .map(|s| s.find_symbols(pattern))
            .unwrap_or_default()
    }

    // ---- レジスタ・メモリ ----

    pub fn read_register(&self, name: &str) -> Result<u64> {
        Ok(self.require_process()?.registers()?.read(name)?)
    }

    pub fn write_register(&self, name: &str, value: u64) -> Result<()> {
        self.require_process()?.registers()?.write(name, value)?;
        Ok(())
    }

    /// DWARFレジスタ番号でレジスタを読み取る
    pub fn register_by_debug_number(&self, number: i32) -> Result<u64> {
        Ok(self.require_process()?.registers()?.read_by_dwarf_number(number)?)
    }

    /// 全レジスタを表の順に読み取る
    pub fn dump_registers(&self) -> Result<Vec<(&'static str, u64)>> {
        Ok(self.require_process()?.registers()?.dump()?)
    }

    /// プログラムカウンタを取得する
    pub fn get_pc(&self) -> Result<u64> {
        Ok(self.require_process()?.get_pc()?)
    }

    pub fn read_memory(&self, address: u64) -> Result<u64> {
        Ok(self.require_process()?.memory()?.read_u64(address)?)
    }

    /// 連続したバイト列を読み取る（ブレークポイントの 0xCC もそのまま見える）
    pub fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        Ok(self.require_process()?.memory()?.read_bytes(address, len)?)
    }

    pub fn write_memory(&self, address: u64, value: u64) -> Result<()> {
        self.require_process()?.memory()?.write_u64(address, value)?;
        Ok(())
    }

    // ---- ブレークポイント ----

    /// 実行時アドレスにブレークポイントを設定する
    pub fn set_breakpoint(&mut self, address: u64) -> Result<BreakpointId> {
        let process = self.process.as_ref().ok_or(DebugError::NotAttached)?;
        self.breakpoints.set(address, &process.memory()?)
    }

    /// ソース行にブレークポイントを設定する
    pub fn set_breakpoint_at_line(&mut self, file: &str, line: u64) -> Result<(BreakpointId, u64)> {
        let address = self.require_resolver()?.address_for_source_line(file, line)?;
        let address = self.to_runtime(address);
        Ok((self.set_breakpoint(address)?, address))
    }

    /// 関数のプロローグ後の最初の行にブレークポイントを設定する
    pub fn set_breakpoint_at_function(&mut self, name: &str) -> Result<(BreakpointId, u64)> {
        let address = self.function_entry(name)?;
        Ok((self.set_breakpoint(address)?, address))
    }

    /// 関数名からブレークポイントを置くアドレスを求める
    ///
    /// DWARFに関数がなければELFシンボルのアドレスを使います。
    fn function_entry(&self, name: &str) -> Result<u64> {
        let from_dwarf = self.require_resolver().and_then(|resolver| {
            let function = resolver.function_by_name(name)?;
            Ok(resolver.first_user_line(function)?.address)
        });

        match from_dwarf {
            Ok(address) => Ok(self.to_runtime(address)),
            Err(DebugError::NoSuchFunction(_)) | Err(DebugError::NoDebugInfo) => self
                .symbols
                .as_ref()
                .and_then(|s| s.resolve(name))
                .map(|address| self.to_runtime(address))
                .ok_or_else(|| DebugError::NoSuchFunction(name.to_string())),
            Err(e) => Err(e),
        }
    }

    /// ブレークポイントを削除する
    pub fn remove_breakpoint(&mut self, address: u64) -> Result<()> {
        let process = self.process.as_ref().ok_or(DebugError::NotAttached)?;
        self.breakpoints.remove(address, &process.memory()?)
    }

    pub fn enable_breakpoint(&mut self, address: u64) -> Result<()> {
        let process = self.process.as_ref().ok_or(DebugError::NotAttached)?;
        self.breakpoints.enable(address, &process.memory()?)
    }

    pub fn disable_breakpoint(&mut self, address: u64) -> Result<()> {
        let process = self.process.as_ref().ok_or(DebugError::NotAttached)?;
        self.breakpoints.disable(address, &process.memory()?)
    }

    /// IDからブレークポイントのアドレスを引く
    pub fn breakpoint_address(&self, id: BreakpointId) -> Result<u64> {
        self.breakpoints
            .address_of(id)
            .ok_or_else(|| DebugError::NoSuchBreakpoint(format!("#{}", id)))
    }

    /// ユーザーが設定したブレークポイントをID順に取得する
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.breakpoints.all()
    }

    pub fn breakpoint_at(&self, address: u64) -> Option<Breakpoint> {
        self.breakpoints.get(address)
    }

    /// 一時ブレークポイントを含む、設定中のすべてのアドレス
    pub fn breakpoint_addresses(&self) -> Vec<u64> {
        self.breakpoints.addresses()
    }

    // ---- 実行制御 ----

    /// プロセスを実行継続して次の停止を待つ
    ///
    /// PCにブレークポイントがあれば、先にそれを踏み越えます。
    pub fn continue_execution(&mut self) -> Result<StopReason> {
        let pc = self.get_pc()?;
        let process = self.process.as_mut().ok_or(DebugError::NotAttached)?;

        if let Some(reason) = self.breakpoints.step_over_breakpoint(process, pc)? {
            if reason != StopReason::StepCompleted {
                return Ok(reason);
            }
        }

        let reason = process.resume()?;
        debug!("stopped: {:?}", reason);
        Ok(reason)
    }

    /// ブレークポイントを外してからトレースを解除する
    pub fn detach(&mut self) -> Result<()> {
        let process = self.process.as_mut().ok_or(DebugError::NotAttached)?;
        for address in self.breakpoints.addresses() {
            self.breakpoints.remove(address, &process.memory()?)?;
        }
        process.detach()?;
        info!("detached");
        Ok(())
    }
}

impl<T: Tracee> Drop for Debugger<T> {
    fn drop(&mut self) {
        if let Some(process) = self.process.as_ref().filter(|p| p.is_alive()) {
            if let Ok(memory) = process.memory() {
                for address in self.breakpoints.addresses() {
                    let _ = self.breakpoints.remove(address, &memory);
                }
            }
        }
    }
}
