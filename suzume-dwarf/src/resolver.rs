//! アドレスと関数・ソース行の相互変換
//!
//! すべての検索は [`DebugInfo`] への借用を返します。結果を保持したまま
//! デバッグ情報を差し替えることはできません。

use crate::lines::{is_path_suffix, LineRow};
use crate::unit::{CompileUnit, DebugInfo, Function};
use crate::DwarfError;
use tracing::trace;

/// シンボル解決器
pub struct SymbolResolver {
    info: DebugInfo,
}

impl SymbolResolver {
    pub fn new(info: DebugInfo) -> Self {
        Self { info }
    }

    pub fn debug_info(&self) -> &DebugInfo {
        &self.info
    }

    /// アドレス範囲にアドレスを含むコンパイルユニットを走査する
    fn units_containing(&self, address: u64) -> impl Iterator<Item = &CompileUnit> {
        self.info.units().iter().filter(move |cu| cu.contains(address))
    }

    /// アドレスを含む関数を返す
    ///
    /// インライン展開された関数は区別しません。
    pub fn function_containing(&self, address: u64) -> Result<&Function, DwarfError> {
        self.units_containing(address)
            .flat_map(|cu| cu.functions.iter())
            .find(|f| f.contains(address))
            .ok_or(DwarfError::NoEnclosingFunction(address))
    }

    /// アドレスを含む行テーブルの行を返す
    pub fn line_containing(&self, address: u64) -> Result<&LineRow, DwarfError> {
        self.units_containing(address)
            .find_map(|cu| cu.lines.row_containing(address))
            .ok_or(DwarfError::NoLineInfo(address))
    }

    /// 関数のプロローグを飛ばした最初の行を返す
    ///
    /// low_pc の行から1行進めた行を返します。プロローグ終端のマーカーは使わないため、
    /// プロローグが1行で終わらない関数では正確ではありません。
    pub fn first_user_line(&self, function: &Function) -> Result<&LineRow, DwarfError> {
        for cu in self.units_containing(function.low_pc) {
            if let Some(idx) = cu.lines.index_at(function.low_pc) {
                trace!("{}: entry row #{} at 0x{:x}", function.name, idx, function.low_pc);
                return cu
                    .lines
                    .next_row(idx)
                    .ok_or(DwarfError::NoLineInfo(function.low_pc));
            }
        }
        Err(DwarfError::NoLineInfo(function.low_pc))
    }

    /// ソースファイルと行番号から、その行の最初の文のアドレスを返す
    ///
    /// `file` はパス要素単位の接尾辞として比較します。
    pub fn address_for_source_line(&self, file: &str, line: u64) -> Result<u64, DwarfError> {
        self.info
            .units()
            .iter()
            .filter(|cu| {
                is_path_suffix(&cu.name, file)
                    || cu.lines.rows().iter().any(|row| is_path_suffix(&row.file, file))
            })
            .find_map(|cu| {
                cu.lines
                    .rows()
                    .iter()
                    .find(|row| {
                        row.is_stmt
                            && !row.end_sequence
                            && row.line == line
                            && (row.file.is_empty() || is_path_suffix(&row.file, file))
                    })
                    .map(|row| row.address)
            })
            .ok_or_else(|| DwarfError::NoSuchLine {
                file: file.to_string(),
                line,
            })
    }

    /// 名前から関数を返す
    pub fn function_by_name(&self, name: &str) -> Result<&Function, DwarfError> {
        self.info
            .functions()
            .find(|f| f.name == name)
            .ok_or_else(|| DwarfError::NoSuchFunction(name.to_string()))
    }

    /// 関数の範囲に含まれる行をすべて返す
    pub fn line_rows_in<'a>(&'a self, function: &Function) -> impl Iterator<Item = &'a LineRow> + 'a {
        let (low, high) = (function.low_pc, function.high_pc);
        self.units_containing(low)
            .flat_map(move |cu| cu.lines.rows_in(low, high))
    }
}
