//! ローカル変数の位置と値

use crate::{DebugError, Debugger, Result};
use suzume_dwarf::{Loc, LocationEvaluator, LocationExpr, Variable, VariableLocation};
use suzume_target::{Reg, Tracee};
use tracing::trace;

/// 変数の格納場所
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueLocation {
    Memory(u64),
    /// DWARFレジスタ番号
    Register(u16),
}

/// 変数の値（先頭1ワード）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableValue {
    pub name: String,
    pub location: ValueLocation,
    pub value: u64,
    pub is_parameter: bool,
}

impl<T: Tracee> Debugger<T> {
    /// 現在のPCで見えるローカル変数と引数
    pub fn locals(&self) -> Result<Vec<Result<VariableValue>>> {
        self.variables_in_scope(self.get_pc()?)
    }

    /// `pc` を含む関数の変数を、現在のレジスタとメモリで評価する
    ///
    /// 関数やフレームベースが求まらなければ全体が失敗します。個々の変数の評価の
    /// 失敗（最適化で消えた、ロケーションリストなど）はその変数の要素だけに入ります。
    pub fn variables_in_scope(&self, pc: u64) -> Result<Vec<Result<VariableValue>>> {
        let function = self.function_at(pc)?;
        let process = self.require_process()?;
        let registers = process.registers()?;

        // フレームポインタ規約では CFA は呼び出し直前の rsp、つまり rbp + 16
        let cfa = registers.get(Reg::Rbp)?.wrapping_add(16);
        let frame_base = match &function.frame_base {
            Some(expr) => Some(match self.evaluate_location(expr, None, cfa)? {
                Loc::Addr(address) => address,
                Loc::Reg(number) => self.register_by_debug_number(i32::from(number))?,
            }),
            None => None,
        };
        trace!("{}: frame base {:x?}, cfa 0x{:x}", function.name, frame_base, cfa);

        Ok(function
            .variables
            .iter()
            .map(|variable| self.evaluate_variable(variable, frame_base, cfa))
            .collect())
    }

    fn evaluate_variable(
        &self,
        variable: &Variable,
        frame_base: Option<u64>,
        cfa: u64,
    ) -> Result<VariableValue> {
        let expr = match &variable.location {
            VariableLocation::Expr(expr) => expr,
            VariableLocation::List => {
                return Err(DebugError::UnsupportedVariableLocation(format!(
                    "{}: location list",
                    variable.name
                )))
            }
            VariableLocation::Missing => {
                return Err(DebugError::UnsupportedVariableLocation(format!(
                    "{}: optimized out",
                    variable.name
                )))
            }
        };

        let (location, value) = match self.evaluate_location(expr, frame_base, cfa)? {
            Loc::Addr(address) => (ValueLocation::Memory(address), self.read_memory(address)?),
            Loc::Reg(number) => (
                ValueLocation::Register(number),
                self.register_by_debug_number(i32::from(number))?,
            ),
        };
        Ok(VariableValue {
            name: variable.name.clone(),
            location,
            value,
            is_parameter: variable.is_parameter,
        })
    }

    fn evaluate_location(&self, expr: &LocationExpr, frame_base: Option<u64>, cfa: u64) -> Result<Loc> {
        LocationEvaluator::new(expr)
            .with_frame_base(frame_base)
            .with_call_frame_cfa(Some(cfa))
            .evaluate(
                |number| self.register_by_debug_number(i32::from(number)),
                |address| self.read_memory(address),
            )
    }
}
