//! DWARF ロケーション式評価
//!
//! DWARFのロケーション式を評価して、変数がメモリ上にあるのかレジスタにあるのかを特定します。

use crate::variables::LocationExpr;
use crate::DwarfError;
use gimli::{EvaluationResult, Location, Value};

/// ロケーション評価の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loc {
    /// メモリアドレス
    Addr(u64),
    /// レジスタ（DWARFレジスタ番号）
    Reg(u16),
}

/// ロケーション評価器
pub struct LocationEvaluator<'a> {
    expr: &'a LocationExpr,
    frame_base: Option<u64>,
    call_frame_cfa: Option<u64>,
}

impl<'a> LocationEvaluator<'a> {
    /// 新しいロケーション評価器を作成する
    pub fn new(expr: &'a LocationExpr) -> Self {
        Self {
            expr,
            frame_base: None,
            call_frame_cfa: None,
        }
    }

    /// DW_OP_fbreg で使うフレームベース
    pub fn with_frame_base(mut self, frame_base: Option<u64>) -> Self {
        self.frame_base = frame_base;
        self
    }

    /// DW_OP_call_frame_cfa で使うCFA
    pub fn with_call_frame_cfa(mut self, cfa: Option<u64>) -> Self {
        self.call_frame_cfa = cfa;
        self
    }

    /// ロケーション式を評価する
    ///
    /// # Arguments
    /// * `get_reg` - DWARFレジスタ番号からレジスタ値を取得するコールバック
    /// * `read_word` - アドレスから1ワード読み取るコールバック
    pub fn evaluate<F, G, E>(&self, mut get_reg: F, mut read_word: G) -> Result<Loc, E>
    where
        F: FnMut(u16) -> Result<u64, E>,
        G: FnMut(u64) -> Result<u64, E>,
        E: From<DwarfError>,
    {
        let mut eval = self.expr.expression().evaluation(self.expr.encoding());
        let mut state = eval.evaluate().map_err(DwarfError::from)?;

        loop {
            state = match state {
                EvaluationResult::Complete => break,
                EvaluationResult::RequiresRegister { register, .. } => {
                    let value = get_reg(register.0)?;
                    eval.resume_with_register(Value::Generic(value))
                        .map_err(DwarfError::from)?
                }
                EvaluationResult::RequiresFrameBase => {
                    let fb = self.frame_base.ok_or_else(|| {
                        DwarfError::UnsupportedVariableLocation("frame base is not available".into())
                    })?;
                    eval.resume_with_frame_base(fb).map_err(DwarfError::from)?
                }
                EvaluationResult::RequiresCallFrameCfa => {
                    let cfa = self.call_frame_cfa.ok_or_else(|| {
                        DwarfError::UnsupportedVariableLocation("call frame CFA is not available".into())
                    })?;
                    eval.resume_with_call_frame_cfa(cfa).map_err(DwarfError::from)?
                }
                EvaluationResult::RequiresMemory { address, size, .. } => {
                    let word = read_word(address)?;
                    let value = match size {
                        1 => word & 0xff,
                        2 => word & 0xffff,
                        4 => word & 0xffff_ffff,
                        _ => word,
                    };
                    eval.resume_with_memory(Value::Generic(value))
                        .map_err(DwarfError::from)?
                }
                other => {
                    return Err(DwarfError::UnsupportedVariableLocation(format!(
                        "expression needs {:?}",
                        other
                    ))
                    .into());
                }
            };
        }

        let pieces = eval.result();
        match pieces.as_slice() {
            [piece] => match &piece.location {
                Location::Address { address } => Ok(Loc::Addr(*address)),
                Location::Register { register } => Ok(Loc::Reg(register.0)),
                other => Err(DwarfError::UnsupportedVariableLocation(kind_of(other).to_string()).into()),
            },
            [] => Err(DwarfError::UnsupportedVariableLocation("empty location".into()).into()),
            _ => Err(DwarfError::UnsupportedVariableLocation(format!(
                "composite location with {} pieces",
                pieces.len()
            ))
            .into()),
        }
    }
}

fn kind_of<R: gimli::Reader>(location: &Location<R>) -> &'static str {
    match location {
        Location::Empty => "optimized out",
        Location::Register { .. } => "register",
        Location::Address { .. } => "address",
        Location::Value { .. } => "implicit value",
        Location::Bytes { .. } => "implicit bytes",
        Location::ImplicitPointer { .. } => "implicit pointer",
        #[allow(unreachable_patterns)]
        _ => "unknown",
    }
}
