//! DIE属性読み取りのユーティリティ関数

use crate::variables::{LocationExpr, VariableLocation};
use crate::Result;
use gimli::Reader;

/// DIEの属性を読み取るヘルパー
pub struct DieAttrs<'a, R: Reader> {
    dwarf: &'a gimli::Dwarf<R>,
    unit: &'a gimli::Unit<R>,
}

impl<'a, R: Reader<Offset = usize>> DieAttrs<'a, R> {
    pub fn new(dwarf: &'a gimli::Dwarf<R>, unit: &'a gimli::Unit<R>) -> Self {
        Self { dwarf, unit }
    }

    /// DW_AT_name を取得する
    ///
    /// 名前を持たない定義DIEは DW_AT_specification / DW_AT_abstract_origin の先を1段だけ辿ります。
    pub fn name(&self, entry: &gimli::DebuggingInformationEntry<R>) -> Result<Option<String>> {
        if let Some(value) = entry.attr_value(gimli::DW_AT_name)? {
            let name = self.dwarf.attr_string(self.unit, value)?;
            return Ok(Some(name.to_string_lossy()?.into_owned()));
        }

        for attr in [gimli::DW_AT_specification, gimli::DW_AT_abstract_origin] {
            if let Some(gimli::AttributeValue::UnitRef(offset)) = entry.attr_value(attr)? {
                let origin = self.unit.entry(offset)?;
                if let Some(value) = origin.attr_value(gimli::DW_AT_name)? {
                    let name = self.dwarf.attr_string(self.unit, value)?;
                    return Ok(Some(name.to_string_lossy()?.into_owned()));
                }
            }
        }

        Ok(None)
    }

    /// 関数のアドレス範囲 `[low_pc, high_pc)` を取得する
    ///
    /// DW_AT_low_pc を持たないDIE（宣言や DW_AT_ranges のみの関数）は None を返します。
    pub fn pc_range(&self, entry: &gimli::DebuggingInformationEntry<R>) -> Result<Option<(u64, u64)>> {
        let low_pc = match entry.attr_value(gimli::DW_AT_low_pc)? {
            Some(value) => match self.dwarf.attr_address(self.unit, value)? {
                Some(addr) => addr,
                None => return Ok(None),
            },
            None => return Ok(None),
        };

        let high_pc = match entry.attr_value(gimli::DW_AT_high_pc)? {
            Some(gimli::AttributeValue::Udata(offset)) => low_pc + offset,
            Some(value) => match self.dwarf.attr_address(self.unit, value)? {
                Some(addr) => addr,
                None => return Ok(None),
            },
            None => return Ok(None),
        };

        Ok(Some((low_pc, high_pc)))
    }

    /// 属性値がロケーション式ならバイト列として取り出す
    pub fn expr(&self, value: gimli::AttributeValue<R>) -> Result<Option<LocationExpr>> {
        match value {
            gimli::AttributeValue::Exprloc(expr) => {
                let bytes = expr.0.to_slice()?.into_owned();
                Ok(Some(LocationExpr::new(bytes, self.unit.encoding())))
            }
            _ => Ok(None),
        }
    }

    /// DW_AT_frame_base を取得する
    pub fn frame_base(&self, entry: &gimli::DebuggingInformationEntry<R>) -> Result<Option<LocationExpr>> {
        match entry.attr_value(gimli::DW_AT_frame_base)? {
            Some(value) => self.expr(value),
            None => Ok(None),
        }
    }

    /// DW_AT_location を取得する
    pub fn location(&self, entry: &gimli::DebuggingInformationEntry<R>) -> Result<VariableLocation> {
        let value = match entry.attr_value(gimli::DW_AT_location)? {
            Some(value) => value,
            None => return Ok(VariableLocation::Missing),
        };

        match value {
            gimli::AttributeValue::LocationListsRef(_) | gimli::AttributeValue::SecOffset(_) => {
                Ok(VariableLocation::List)
            }
            other => Ok(self
                .expr(other)?
                .map(VariableLocation::Expr)
                .unwrap_or(VariableLocation::Missing)),
        }
    }
}
