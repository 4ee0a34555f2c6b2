//! パース関連のユーティリティ関数

use anyhow::Result;

/// アドレス文字列をu64にパース
///
/// 16進数（0xプレフィックス付き）または10進数をサポート
///
/// # Examples
/// ```
/// use suzume_core::parse::parse_address;
///
/// assert_eq!(parse_address("0x1234").unwrap(), 0x1234);
/// assert_eq!(parse_address("1234").unwrap(), 1234);
/// ```
pub fn parse_address(s: &str) -> Result<u64> {
    let s = s.trim();

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
            .map_err(|e| anyhow::anyhow!("Invalid hexadecimal address '{}': {}", s, e))
    } else {
        // 10進数でもダメなら16進数として解釈を試みる
        s.parse::<u64>()
            .or_else(|_| u64::from_str_radix(s, 16))
            .map_err(|e| anyhow::anyhow!("Invalid address '{}': {}", s, e))
    }
}

/// ブレークポイントの設定場所
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakLocation {
    Address(u64),
    Line { file: String, line: u64 },
    Function(String),
}

/// `break` の引数をパース
///
/// `0x` で始まればアドレス、`file:line` ならソース行、それ以外は関数名として扱います。
/// `crate::func` のような `::` を含む名前は関数名です。
pub fn parse_location(s: &str) -> Result<BreakLocation> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty location");
    }

    if s.starts_with("0x") || s.starts_with("0X") {
        return Ok(BreakLocation::Address(parse_address(s)?));
    }

    if let Some((file, line)) = s.rsplit_once(':') {
        if !file.is_empty() && !file.ends_with(':') {
            let line = line
                .parse::<u64>()
                .map_err(|e| anyhow::anyhow!("Invalid line number '{}': {}", line, e))?;
            return Ok(BreakLocation::Line {
                file: file.to_string(),
                line,
            });
        }
    }

    Ok(BreakLocation::Function(s.to_string()))
}
