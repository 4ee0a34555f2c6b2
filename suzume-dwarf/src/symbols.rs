//! ELFシンボルテーブル
//!
//! DWARFを持たない関数（libcの関数やアセンブリで書かれたエントリポイントなど）の
//! 名前解決に使います。

use crate::{DwarfLoader, Result};
use object::{Object, ObjectSymbol, SymbolKind};
use std::collections::HashMap;

/// シンボル情報
#[derive(Debug, Clone)]
pub struct Symbol {
    /// マングルされたシンボル名
    pub name: String,
    /// デマングルされたシンボル名（可読な形式）
    pub demangled_name: String,
    pub address: u64,
    pub size: u64,
}

impl Symbol {
    /// シンボルを作成し、デマングルされた名前を設定する
    pub fn new(name: String, address: u64, size: u64) -> Self {
        let demangled_name = demangle_symbol(&name);
        Self {
            name,
            demangled_name,
            address,
            size,
        }
    }

    /// 表示用の名前を取得（デマングル可能ならデマングル後、できなければマングル名）
    pub fn display_name(&self) -> &str {
        &self.demangled_name
    }
}

/// シンボル名をデマングルする
fn demangle_symbol(name: &str) -> String {
    if let Ok(demangled) = rustc_demangle::try_demangle(name) {
        return format!("{:#}", demangled);
    }
    name.to_string()
}

/// 関数シンボルのテーブル
pub struct SymbolTable {
    /// シンボル名 -> シンボル情報のマップ（マングル名とデマングル名の両方で引ける）
    symbols_by_name: HashMap<String, Symbol>,
    /// アドレス順にソートしたシンボル
    symbols_by_address: Vec<Symbol>,
}

impl SymbolTable {
    /// ELFのシンボルテーブルから関数シンボルを読み取る
    pub fn new(loader: &DwarfLoader) -> Result<Self> {
        let symbols = loader
            .object_file()
            .symbols()
            .filter(|symbol| symbol.kind() == SymbolKind::Text && symbol.address() != 0)
            .filter_map(|symbol| {
                let name = symbol.name().ok()?;
                (!name.is_empty()).then(|| Symbol::new(name.to_string(), symbol.address(), symbol.size()))
            })
            .collect();
        Ok(Self::from_symbols(symbols))
    }

    /// シンボルの一覧からテーブルを作る
    pub fn from_symbols(mut symbols: Vec<Symbol>) -> Self {
        let mut symbols_by_name = HashMap::new();
        for sym in &symbols {
            symbols_by_name.insert(sym.name.clone(), sym.clone());
            symbols_by_name
                .entry(sym.demangled_name.clone())
                .or_insert_with(|| sym.clone());
        }
        symbols.sort_by_key(|s| s.address);

        Self {
            symbols_by_name,
            symbols_by_address: symbols,
        }
    }

    /// シンボル名からアドレスを解決する
    pub fn resolve(&self, name: &str) -> Option<u64> {
        self.symbols_by_name.get(name).map(|s| s.address)
    }

    /// アドレスを範囲に含むシンボルを返す
    pub fn reverse_resolve(&self, addr: u64) -> Option<&Symbol> {
        let idx = self.symbols_by_address.partition_point(|s| s.address <= addr);
        let sym = self.symbols_by_address.get(idx.checked_sub(1)?)?;
        // サイズ情報がないシンボルは先頭アドレスにだけ一致させる
        if addr < sym.address + sym.size.max(1) {
            Some(sym)
        } else {
            None
        }
    }

    /// パターンを含むシンボルを検索する
    pub fn find_symbols(&self, pattern: &str) -> Vec<&Symbol> {
        let mut found: Vec<&Symbol> = self
            .symbols_by_address
            .iter()
            .filter(|s| s.name.contains(pattern) || s.demangled_name.contains(pattern))
            .collect();
        found.dedup_by_key(|s| s.address);
        found
    }
}
