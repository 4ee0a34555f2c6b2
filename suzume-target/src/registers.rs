//! レジスタアクセス機能
//!
//! x86-64 の汎用レジスタを名前・DWARFレジスタ番号で引くための表と、
//! それを使ったレジスタの読み書きを提供します。

use crate::tracee::Tracee;
use crate::{Result, TargetError};
use nix::libc::user_regs_struct;

/// x86-64 のレジスタ（`user_regs_struct` のフィールド順）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    R15,
    R14,
    R13,
    R12,
    Rbp,
    Rbx,
    R11,
    R10,
    R9,
    R8,
    Rax,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    OrigRax,
    Rip,
    Cs,
    Eflags,
    Rsp,
    Ss,
    FsBase,
    GsBase,
    Ds,
    Es,
    Fs,
    Gs,
}

/// レジスタ表の1行
#[derive(Debug, Clone, Copy)]
pub struct RegisterDescriptor {
    pub reg: Reg,
    pub name: &'static str,
    /// System V x86-64 ABI の DWARF レジスタ番号（対応がないものは None）
    pub dwarf_number: Option<u16>,
}

const fn desc(reg: Reg, name: &'static str, dwarf_number: Option<u16>) -> RegisterDescriptor {
    RegisterDescriptor {
        reg,
        name,
        dwarf_number,
    }
}

/// レジスタ表
pub static REGISTERS: [RegisterDescriptor; 27] = [
    desc(Reg::R15, "r15", Some(15)),
    desc(Reg::R14, "r14", Some(14)),
    desc(Reg::R13, "r13", Some(13)),
    desc(Reg::R12, "r12", Some(12)),
    desc(Reg::Rbp, "rbp", Some(6)),
    desc(Reg::Rbx, "rbx", Some(3)),
    desc(Reg::R11, "r11", Some(11)),
    desc(Reg::R10, "r10", Some(10)),
    desc(Reg::R9, "r9", Some(9)),
    desc(Reg::R8, "r8", Some(8)),
    desc(Reg::Rax, "rax", Some(0)),
    desc(Reg::Rcx, "rcx", Some(2)),
    desc(Reg::Rdx, "rdx", Some(1)),
    desc(Reg::Rsi, "rsi", Some(4)),
    desc(Reg::Rdi, "rdi", Some(5)),
    desc(Reg::OrigRax, "orig_rax", None),
    desc(Reg::Rip, "rip", None),
    desc(Reg::Cs, "cs", Some(51)),
    desc(Reg::Eflags, "eflags", Some(49)),
    desc(Reg::Rsp, "rsp", Some(7)),
    desc(Reg::Ss, "ss", Some(52)),
    desc(Reg::FsBase, "fs_base", Some(58)),
    desc(Reg::GsBase, "gs_base", Some(59)),
    desc(Reg::Ds, "ds", Some(53)),
    desc(Reg::Es, "es", Some(50)),
    desc(Reg::Fs, "fs", Some(54)),
    desc(Reg::Gs, "gs", Some(55)),
];

/// 名前からレジスタを引く
pub fn by_name(name: &str) -> Result<&'static RegisterDescriptor> {
    REGISTERS
        .iter()
        .find(|d| d.name == name)
        .ok_or_else(|| TargetError::UnknownRegister(name.to_string()))
}

/// DWARFレジスタ番号からレジスタを引く
///
/// 番号を持たないレジスタには決して一致しません。
pub fn by_dwarf_number(number: i32) -> Result<&'static RegisterDescriptor> {
    REGISTERS
        .iter()
        .find(|d| d.dwarf_number.is_some_and(|n| i32::from(n) == number))
        .ok_or(TargetError::UnknownDebugRegister(number))
}

impl Reg {
    /// スナップショットの該当フィールドを返す
    pub fn slot(self, regs: &mut user_regs_struct) -> &mut u64 {
        match self {
            Reg::R15 => &mut regs.r15,
            Reg::R14 => &mut regs.r14,
            Reg::R13 => &mut regs.r13,
            Reg::R12 => &mut regs.r12,
            Reg::Rbp => &mut regs.rbp,
            Reg::Rbx => &mut regs.rbx,
            Reg::R11 => &mut regs.r11,
            Reg::R10 => &mut regs.r10,
            Reg::R9 => &mut regs.r9,
            Reg::R8 => &mut regs.r8,
            Reg::Rax => &mut regs.rax,
            Reg::Rcx => &mut regs.rcx,
            Reg::Rdx => &mut regs.rdx,
            Reg::Rsi => &mut regs.rsi,
            Reg::Rdi => &mut regs.rdi,
            Reg::OrigRax => &mut regs.orig_rax,
            Reg::Rip => &mut regs.rip,
            Reg::Cs => &mut regs.cs,
            Reg::Eflags => &mut regs.eflags,
            Reg::Rsp => &mut regs.rsp,
            Reg::Ss => &mut regs.ss,
            Reg::FsBase => &mut regs.fs_base,
            Reg::GsBase => &mut regs.gs_base,
            Reg::Ds => &mut regs.ds,
            Reg::Es => &mut regs.es,
            Reg::Fs => &mut regs.fs,
            Reg::Gs => &mut regs.gs,
        }
    }

    pub fn get(self, regs: &user_regs_struct) -> u64 {
        let mut copy = *regs;
        *self.slot(&mut copy)
    }
}

/// レジスタアクセス
pub struct Registers<'a, T: Tracee> {
    tracee: &'a T,
}

impl<'a, T: Tracee> Registers<'a, T> {
    /// レジスタアクセスを作成する
    pub fn new(tracee: &'a T) -> Self {
        Self { tracee }
    }

    /// レジスタを読み取る
    pub fn get(&self, reg: Reg) -> Result<u64> {
        let regs = self.tracee.get_regs()?;
        Ok(reg.get(&regs))
    }

    /// レジスタに書き込む
    pub fn set(&self, reg: Reg, value: u64) -> Result<()> {
        let mut regs = self.tracee.get_regs()?;
        *reg.slot(&mut regs) = value;
        self.tracee.set_regs(regs)
    }

    /// 名前でレジスタを読み取る
    pub fn read(&self, name: &str) -> Result<u64> {
        self.get(by_name(name)?.reg)
    }

    /// 名前でレジスタに書き込む
    pub fn write(&self, name: &str, value: u64) -> Result<()> {
        self.set(by_name(name)?.reg, value)
    }

    /// DWARFレジスタ番号でレジスタを読み取る
    pub fn read_by_dwarf_number(&self, number: i32) -> Result<u64> {
        self.get(by_dwarf_number(number)?.reg)
    }

    /// 全レジスタを表の順に読み取る
    pub fn dump(&self) -> Result<Vec<(&'static str, u64)>> {
        let regs = self.tracee.get_regs()?;
        Ok(REGISTERS.iter().map(|d| (d.name, d.reg.get(&regs))).collect())
    }

    /// プログラムカウンタ（RIP）を取得する
    pub fn get_pc(&self) -> Result<u64> {
        self.get(Reg::Rip)
    }

    /// プログラムカウンタ（RIP）を設定する
    pub fn set_pc(&self, pc: u64) -> Result<()> {
        self.set(Reg::Rip, pc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_name() {
        assert_eq!(by_name("rax").unwrap().reg, Reg::Rax);
        assert_eq!(by_name("rip").unwrap().reg, Reg::Rip);
        assert!(matches!(by_name("xmm0"), Err(TargetError::UnknownRegister(_))));
    }

    #[test]
    fn test_by_dwarf_number() {
        assert_eq!(by_dwarf_number(0).unwrap().reg, Reg::Rax);
        assert_eq!(by_dwarf_number(6).unwrap().reg, Reg::Rbp);
        assert_eq!(by_dwarf_number(7).unwrap().reg, Reg::Rsp);
        assert_eq!(by_dwarf_number(49).unwrap().reg, Reg::Eflags);
    }

    #[test]
    fn test_unmapped_registers_never_match() {
        // orig_rax と rip は番号を持たない
        assert!(matches!(by_dwarf_number(-1), Err(TargetError::UnknownDebugRegister(-1))));
        assert!(matches!(by_dwarf_number(16), Err(TargetError::UnknownDebugRegister(16))));
    }

    #[test]
    fn test_table_is_unique() {
        for (i, a) in REGISTERS.iter().enumerate() {
            for b in &REGISTERS[i + 1..] {
                assert_ne!(a.name, b.name);
                if a.dwarf_number.is_some() {
                    assert_ne!(a.dwarf_number, b.dwarf_number);
                }
            }
        }
    }

    #[test]
    fn test_slot_round_trip() {
        // SAFETY: user_regs_struct はu64のみからなるため全ビット0は有効な値
        let mut regs: user_regs_struct = unsafe { std::mem::zeroed() };
        *Reg::Rax.slot(&mut regs) = 42;
        *Reg::Gs.slot(&mut regs) = 7;
        assert_eq!(regs.rax, 42);
        assert_eq!(regs.gs, 7);
        assert_eq!(Reg::Rax.get(&regs), 42);
    }
}
