//! ソフトウェアブレークポイント（INT3命令の埋め込み）

use crate::memory::Memory;
use crate::tracee::Tracee;
use crate::Result;

/// INT3命令のオペコード
pub const INT3_OPCODE: u8 = 0xCC;

/// INT3命令の長さ。トラップ後のRIPはこの分だけ先に進んでいる
pub const INT3_LEN: u64 = 1;

/// ソフトウェアブレークポイント（INT3命令）
#[derive(Debug, Clone)]
pub struct SoftwareBreakpoint {
    address: u64,
    saved_byte: u8,
    enabled: bool,
}

impl SoftwareBreakpoint {
    /// 無効状態のブレークポイントを作成する
    pub fn new(address: u64) -> Self {
        Self {
            address,
            saved_byte: 0,
            enabled: false,
        }
    }

    /// ブレークポイントのアドレスを取得する
    pub fn address(&self) -> u64 {
        self.address
    }

    /// ブレークポイントが有効かどうか
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 元のバイトを取得する
    pub fn saved_byte(&self) -> u8 {
        self.saved_byte
    }

    /// ブレークポイントを設定する
    ///
    /// 指定されたアドレスの命令を0xCC（INT3）で置き換えます。
    pub fn enable<T: Tracee>(&mut self, memory: &Memory<'_, T>) -> Result<()> {
        if self.enabled {
            return Ok(());
        }

        self.saved_byte = memory.read_u8(self.address)?;
        memory.write_u8(self.address, INT3_OPCODE)?;

        self.enabled = true;
        Ok(())
    }

    /// ブレークポイントを解除する
    ///
    /// INT3命令を元のバイトで置き換えます。
    ///
    /// # Panics
    /// 有効なのにアドレスのバイトが0xCCでない場合。ブレークポイントの管理が壊れています。
    pub fn disable<T: Tracee>(&mut self, memory: &Memory<'_, T>) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let current = memory.read_u8(self.address)?;
        assert_eq!(
            current, INT3_OPCODE,
            "breakpoint at 0x{:x} is enabled but memory holds 0x{:02x}",
            self.address, current
        );
        memory.write_u8(self.address, self.saved_byte)?;

        self.enabled = false;
        Ok(())
    }
}
