//! 変数とロケーション式

/// DWARFロケーション式（DW_FORM_exprloc のバイト列）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationExpr {
    bytes: Vec<u8>,
    encoding: gimli::Encoding,
}

impl LocationExpr {
    pub fn new(bytes: Vec<u8>, encoding: gimli::Encoding) -> Self {
        Self { bytes, encoding }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn encoding(&self) -> gimli::Encoding {
        self.encoding
    }

    /// gimli で評価できる式として借用する
    pub fn expression(&self) -> gimli::Expression<gimli::EndianSlice<'_, gimli::LittleEndian>> {
        gimli::Expression(gimli::EndianSlice::new(&self.bytes, gimli::LittleEndian))
    }
}

/// 変数の DW_AT_location 属性
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableLocation {
    /// 単一のロケーション式
    Expr(LocationExpr),
    /// ロケーションリスト（PCごとに位置が変わる）
    List,
    /// 属性なし（最適化により削除された）
    Missing,
}

/// 関数スコープ内の変数（DW_TAG_variable / DW_TAG_formal_parameter）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub location: VariableLocation,
    /// 仮引数かどうか
    pub is_parameter: bool,
}

impl Variable {
    pub fn new(name: impl Into<String>, location: VariableLocation) -> Self {
        Self {
            name: name.into(),
            location,
            is_parameter: false,
        }
    }
}
