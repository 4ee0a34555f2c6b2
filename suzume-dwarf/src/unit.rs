//! コンパイルユニットと関数の記述子
//!
//! ELFから一度だけ読み込んだDWARF情報を、所有権を持つ平坦な構造に保持します。
//! 検索はすべてこの構造に対する借用で行われます。

use crate::lines::LineTable;
use crate::variables::{LocationExpr, Variable};
use std::ops::Range;

/// 関数記述子（DW_TAG_subprogram）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub low_pc: u64,
    /// 関数の終端（この値は含まない）
    pub high_pc: u64,
    /// DW_AT_frame_base
    pub frame_base: Option<LocationExpr>,
    pub variables: Vec<Variable>,
}

impl Function {
    pub fn new(name: impl Into<String>, low_pc: u64, high_pc: u64) -> Self {
        Self {
            name: name.into(),
            low_pc,
            high_pc,
            frame_base: None,
            variables: Vec::new(),
        }
    }

    pub fn with_frame_base(mut self, expr: LocationExpr) -> Self {
        self.frame_base = Some(expr);
        self
    }

    pub fn with_variable(mut self, variable: Variable) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn contains(&self, address: u64) -> bool {
        self.low_pc <= address && address < self.high_pc
    }
}

/// コンパイルユニット
#[derive(Debug, Clone)]
pub struct CompileUnit {
    /// DW_AT_name（通常はソースファイルのパス）
    pub name: String,
    pub ranges: Vec<Range<u64>>,
    pub functions: Vec<Function>,
    pub lines: LineTable,
}

impl CompileUnit {
    /// ユニットを作成する
    ///
    /// `ranges` が空の場合は関数の範囲から補完します。
    pub fn new(
        name: impl Into<String>,
        mut ranges: Vec<Range<u64>>,
        functions: Vec<Function>,
        lines: LineTable,
    ) -> Self {
        if ranges.is_empty() {
            ranges = functions.iter().map(|f| f.low_pc..f.high_pc).collect();
        }
        Self {
            name: name.into(),
            ranges,
            functions,
            lines,
        }
    }

    pub fn contains(&self, address: u64) -> bool {
        self.ranges.iter().any(|r| r.contains(&address))
    }
}

/// 読み込み済みのデバッグ情報全体
#[derive(Debug, Clone, Default)]
pub struct DebugInfo {
    units: Vec<CompileUnit>,
}

impl DebugInfo {
    pub fn new(units: Vec<CompileUnit>) -> Self {
        Self { units }
    }

    pub fn units(&self) -> &[CompileUnit] {
        &self.units
    }

    /// すべての関数を走査する
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.units.iter().flat_map(|u| u.functions.iter())
    }
}
