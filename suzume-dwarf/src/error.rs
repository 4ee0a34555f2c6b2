//! デバッグ情報検索のエラー型

use thiserror::Error;

/// シンボル・行情報の検索で発生するエラー
///
/// 検索の失敗はいずれも回復可能で、呼び出し元の状態は変化しません。
#[derive(Debug, Error)]
pub enum DwarfError {
    /// アドレスを含む関数が見つからない
    #[error("no function contains address 0x{0:x}")]
    NoEnclosingFunction(u64),

    /// アドレスに対応するソース行がない
    #[error("no line information for address 0x{0:x}")]
    NoLineInfo(u64),

    /// ファイルと行番号に対応するアドレスがない
    #[error("no statement at {file}:{line}")]
    NoSuchLine { file: String, line: u64 },

    /// 関数名に一致する関数がない
    #[error("no function named '{0}'")]
    NoSuchFunction(String),

    /// 対応していないロケーション式の結果
    #[error("unsupported variable location: {0}")]
    UnsupportedVariableLocation(String),

    /// DWARFの読み取りエラー
    #[error("DWARF error: {0}")]
    Gimli(#[from] gimli::Error),
}
