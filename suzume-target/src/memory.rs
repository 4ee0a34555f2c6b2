//! メモリアクセス機能
//!
//! 読み書きはワード（8バイト）単位です。アラインメントや範囲のチェックは行わず、
//! 不正なアドレスは ptrace のエラーとして返ります。

use crate::tracee::Tracee;
use crate::Result;
use std::fs;

/// ワードサイズ（バイト数）
pub const WORD_SIZE: u64 = 8;

/// メモリアクセス
pub struct Memory<'a, T: Tracee> {
    tracee: &'a T,
}

impl<'a, T: Tracee> Memory<'a, T> {
    /// メモリアクセスを作成する
    pub fn new(tracee: &'a T) -> Self {
        Self { tracee }
    }

    /// u64値を読み取る（リトルエンディアン）
    pub fn read_u64(&self, addr: u64) -> Result<u64> {
        self.tracee.peek(addr)
    }

    /// u64値を書き込む（リトルエンディアン）
    pub fn write_u64(&self, addr: u64, value: u64) -> Result<()> {
        self.tracee.poke(addr, value)
    }

    /// u8値を読み取る
    pub fn read_u8(&self, addr: u64) -> Result<u8> {
        Ok(self.read_u64(addr)? as u8)
    }

    /// u8値を書き込む
    ///
    /// アドレスから始まるワードを読み、下位1バイトだけを置き換えて書き戻します。
    pub fn write_u8(&self, addr: u64, value: u8) -> Result<()> {
        let word = self.read_u64(addr)?;
        self.write_u64(addr, (word & !0xff) | u64::from(value))
    }

    /// 連続したバイト列を読み取る
    pub fn read_bytes(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(len);
        let mut offset = 0u64;
        while data.len() < len {
            let word = self.read_u64(addr + offset)?;
            let remaining = len - data.len();
            data.extend_from_slice(&word.to_le_bytes()[..remaining.min(WORD_SIZE as usize)]);
            offset += WORD_SIZE;
        }
        Ok(data)
    }
}

/// メモリマッピング情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMapping {
    pub start: u64,
    pub end: u64,
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    /// マッピング元ファイル内のオフセット
    pub offset: u64,
    pub path: Option<String>,
}

/// /proc/pid/maps を解析してメモリマッピング情報を取得する
pub fn mappings(pid: i32) -> Result<Vec<MemoryMapping>> {
    let maps = fs::read_to_string(format!("/proc/{}/maps", pid))?;
    Ok(parse_maps(&maps))
}

/// maps形式のテキストを解析する
///
/// フォーマット: `"address perms offset dev inode pathname"`
pub fn parse_maps(text: &str) -> Vec<MemoryMapping> {
    text.lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 5 {
                return None;
            }
            let (start, end) = parts[0].split_once('-')?;
            let perms = parts[1].as_bytes();
            Some(MemoryMapping {
                start: u64::from_str_radix(start, 16).ok()?,
                end: u64::from_str_radix(end, 16).ok()?,
                readable: perms.first() == Some(&b'r'),
                writable: perms.get(1) == Some(&b'w'),
                executable: perms.get(2) == Some(&b'x'),
                offset: u64::from_str_radix(parts[2], 16).ok()?,
                path: parts.get(5).map(|p| p.to_string()),
            })
        })
        .collect()
}

/// 実行可能ファイルのロードベースを取得する
///
/// PIE の場合、実行時にランダムなアドレスにロードされます。`path` に一致する
/// 最初のマッピング（ファイルオフセット0）の開始アドレスを返します。
pub fn load_base(maps: &[MemoryMapping], path: &str) -> Option<u64> {
    maps.iter()
        .find(|m| m.path.as_deref() == Some(path) && m.offset == 0)
        .map(|m| m.start)
}
