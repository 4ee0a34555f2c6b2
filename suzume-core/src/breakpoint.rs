//! ブレークポイント管理
//!
//! ブレークポイントはアドレスをキーに管理します。ユーザーが設定したものには
//! 1から始まるIDを振り、ステップ実行が一時的に設定するものには振りません。

use crate::{DebugError, Result};
use std::collections::HashMap;
use suzume_target::{Memory, Process, SoftwareBreakpoint, StopReason, Tracee};
use tracing::{debug, trace};

/// ブレークポイントID
pub type BreakpointId = usize;

/// ブレークポイント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    /// 一時ブレークポイントは 0
    pub id: BreakpointId,
    pub address: u64,
    pub enabled: bool,
    pub temporary: bool,
}

struct Entry {
    id: BreakpointId,
    temporary: bool,
    sw: SoftwareBreakpoint,
}

impl Entry {
    fn info(&self) -> Breakpoint {
        Breakpoint {
            id: self.id,
            address: self.sw.address(),
            enabled: self.sw.is_enabled(),
            temporary: self.temporary,
        }
    }
}

/// ブレークポイントマネージャ
///
/// 論理的なブレークポイント情報とソフトウェアブレークポイント（INT3）を
/// 一緒に管理します。
pub struct BreakpointManager {
    breakpoints: HashMap<u64, Entry>,
    next_id: BreakpointId,
}

impl BreakpointManager {
    /// 新しいブレークポイントマネージャを作成する
    pub fn new() -> Self {
        Self {
            breakpoints: HashMap::new(),
            next_id: 1,
        }
    }

    /// ブレークポイントを追加し、有効化する
    pub fn set<T: Tracee>(&mut self, address: u64, memory: &Memory<'_, T>) -> Result<BreakpointId> {
        let id = self.next_id;
        self.insert(address, id, false, memory)?;
        self.next_id += 1;
        debug!("breakpoint {} set at 0x{:x}", id, address);
        Ok(id)
    }

    /// ステップ実行用の一時ブレークポイントを追加する
    pub fn set_temporary<T: Tracee>(&mut self, address: u64, memory: &Memory<'_, T>) -> Result<()> {
        self.insert(address, 0, true, memory)?;
        trace!("temporary breakpoint at 0x{:x}", address);
        Ok(())
    }

    fn insert<T: Tracee>(
        &mut self,
        address: u64,
        id: BreakpointId,
        temporary: bool,
        memory: &Memory<'_, T>,
    ) -> Result<()> {
        if self.breakpoints.contains_key(&address) {
            return Err(DebugError::DuplicateBreakpoint(address));
        }

        let mut sw = SoftwareBreakpoint::new(address);
        sw.enable(memory)?;
        self.breakpoints.insert(address, Entry { id, temporary, sw });
        Ok(())
    }

    /// ブレークポイントを削除し、元のバイトを書き戻す
    ///
    /// 書き戻しに失敗したときは記録を残します（メモリには 0xCC が残っているため）。
    pub fn remove<T: Tracee>(&mut self, address: u64, memory: &Memory<'_, T>) -> Result<()> {
        self.entry_mut(address)?.sw.disable(memory)?;
        self.breakpoints.remove(&address);
        trace!("breakpoint at 0x{:x} removed", address);
        Ok(())
    }

    /// ブレークポイントを有効化する（既に有効なら何もしない）
    pub fn enable<T: Tracee>(&mut self, address: u64, memory: &Memory<'_, T>) -> Result<()> {
        self.entry_mut(address)?.sw.enable(memory)?;
        Ok(())
    }

    /// ブレークポイントを無効化する（既に無効なら何もしない）
    pub fn disable<T: Tracee>(&mut self, address: u64, memory: &Memory<'_, T>) -> Result<()> {
        self.entry_mut(address)?.sw.disable(memory)?;
        Ok(())
    }

    fn entry_mut(&mut self, address: u64) -> Result<&mut Entry> {
        self.breakpoints
            .get_mut(&address)
            .ok_or_else(|| DebugError::NoSuchBreakpoint(format!("at 0x{:x}", address)))
    }

    /// PCにある有効なブレークポイントを一時的に外して1命令実行する
    ///
    /// ブレークポイントがなければ何もせず `None` を返します。
    /// ステップがエラーになっても、プロセスが生きていれば必ず再度有効化します。
    pub fn step_over_breakpoint<T: Tracee>(
        &mut self,
        process: &mut Process<T>,
        pc: u64,
    ) -> Result<Option<StopReason>> {
        let entry = match self.breakpoints.get_mut(&pc) {
            Some(entry) if entry.sw.is_enabled() => entry,
            _ => return Ok(None),
        };

        trace!("stepping over breakpoint at 0x{:x}", pc);
        entry.sw.disable(&process.memory()?)?;
        let result = process.single_step();
        if process.is_alive() {
            entry.sw.enable(&process.memory()?)?;
        }
        Ok(Some(result?))
    }

    /// 一時ブレークポイントをすべて削除する
    ///
    /// プロセスが終了していればメモリには触らず、記録だけを消します。
    pub fn clear_temporaries<T: Tracee>(&mut self, process: &Process<T>) -> Result<()> {
        let temporaries: Vec<u64> = self
            .breakpoints
            .iter()
            .filter(|(_, e)| e.temporary)
            .map(|(addr, _)| *addr)
            .collect();

        for address in temporaries {
            if process.is_alive() {
                self.remove(address, &process.memory()?)?;
            } else {
                self.breakpoints.remove(&address);
            }
        }
        Ok(())
    }

    /// アドレスにブレークポイントがあるか
    pub fn contains(&self, address: u64) -> bool {
        self.breakpoints.contains_key(&address)
    }

    /// アドレスのブレークポイントを取得する
    pub fn get(&self, address: u64) -> Option<Breakpoint> {
        self.breakpoints.get(&address).map(Entry::info)
    }

    /// IDからアドレスを引く
    pub fn address_of(&self, id: BreakpointId) -> Option<u64> {
        self.breakpoints
            .iter()
            .find(|(_, e)| !e.temporary && e.id == id)
            .map(|(addr, _)| *addr)
    }

    /// ユーザーが設定したブレークポイントをID順に取得する
    pub fn all(&self) -> Vec<Breakpoint> {
        let mut list: Vec<Breakpoint> = self
            .breakpoints
            .values()
            .filter(|e| !e.temporary)
            .map(Entry::info)
            .collect();
        list.sort_by_key(|bp| bp.id);
        list
    }

    /// 一時ブレークポイントを含むすべてのアドレス
    pub fn addresses(&self) -> Vec<u64> {
        let mut addrs: Vec<u64> = self.breakpoints.keys().copied().collect();
        addrs.sort_unstable();
        addrs
    }

    /// ブレークポイントの数を取得する
    pub fn count(&self) -> usize {
        self.breakpoints.len()
    }
}

impl Default for BreakpointManager {
    fn default() -> Self {
        Self::new()
    }
}
