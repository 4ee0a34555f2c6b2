//! ソース行情報

/// 行テーブルの1行
///
/// DWARFの行番号プログラムが生成する行をそのまま保持します。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRow {
    pub file: String,
    pub line: u64,
    pub address: u64,
    /// 文の境界（DW_LNS_negate_stmt で切り替わる is_stmt フラグ）
    pub is_stmt: bool,
    /// シーケンス終端。この行のアドレスは範囲の終わりを表すだけで、命令を指さない
    pub end_sequence: bool,
}

impl LineRow {
    /// 文の境界となる行を作成する
    pub fn new(file: impl Into<String>, line: u64, address: u64) -> Self {
        Self {
            file: file.into(),
            line,
            address,
            is_stmt: true,
            end_sequence: false,
        }
    }

    /// シーケンス終端の行を作成する
    pub fn end_of_sequence(file: impl Into<String>, address: u64) -> Self {
        Self {
            file: file.into(),
            line: 0,
            address,
            is_stmt: false,
            end_sequence: true,
        }
    }

    /// is_stmt フラグを変更する
    pub fn with_stmt(mut self, is_stmt: bool) -> Self {
        self.is_stmt = is_stmt;
        self
    }
}

/// コンパイルユニット1つ分の行テーブル
///
/// 行はシーケンスごとにアドレス昇順で並んでおり、各シーケンスは
/// `end_sequence` の行で終わります。
#[derive(Debug, Clone, Default)]
pub struct LineTable {
    rows: Vec<LineRow>,
}

impl LineTable {
    pub fn new(rows: Vec<LineRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[LineRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// アドレスを範囲 `[row.address, next.address)` に含む行のインデックスを返す
    pub fn index_containing(&self, address: u64) -> Option<usize> {
        self.rows.windows(2).position(|pair| {
            let (row, next) = (&pair[0], &pair[1]);
            !row.end_sequence && row.address <= address && address < next.address
        })
    }

    /// アドレスを含む行を返す
    pub fn row_containing(&self, address: u64) -> Option<&LineRow> {
        self.index_containing(address).map(|idx| &self.rows[idx])
    }

    /// 指定アドレスから始まる最初の行のインデックスを返す
    pub fn index_at(&self, address: u64) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| !row.end_sequence && row.address == address)
    }

    /// インデックスの次の行を返す（シーケンス終端は行として扱わない）
    pub fn next_row(&self, index: usize) -> Option<&LineRow> {
        self.rows.get(index + 1).filter(|row| !row.end_sequence)
    }

    /// `[low, high)` に含まれる行をすべて返す
    pub fn rows_in(&self, low: u64, high: u64) -> impl Iterator<Item = &LineRow> {
        self.rows
            .iter()
            .filter(move |row| !row.end_sequence && row.address >= low && row.address < high)
    }
}

/// `path` がパス要素単位で `suffix` で終わるか
///
/// `"/src/hello.cpp"` は `"hello.cpp"` や `"src/hello.cpp"` に一致しますが、
/// `"lo.cpp"` には一致しません。
pub fn is_path_suffix(path: &str, suffix: &str) -> bool {
    std::path::Path::new(path).ends_with(suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LineTable {
        LineTable::new(vec![
            LineRow::new("a.c", 1, 0x100),
            LineRow::new("a.c", 2, 0x104),
            LineRow::new("a.c", 2, 0x108).with_stmt(false),
            LineRow::new("a.c", 3, 0x10c),
            LineRow::end_of_sequence("a.c", 0x110),
            LineRow::new("a.c", 9, 0x200),
            LineRow::end_of_sequence("a.c", 0x208),
        ])
    }

    #[test]
    fn test_row_containing() {
        let t = table();
        assert_eq!(t.row_containing(0x100).unwrap().line, 1);
        assert_eq!(t.row_containing(0x103).unwrap().line, 1);
        assert_eq!(t.row_containing(0x10f).unwrap().line, 3);
        assert_eq!(t.row_containing(0x204).unwrap().line, 9);
    }

    #[test]
    fn test_row_containing_gap() {
        let t = table();
        // シーケンス終端からの範囲はどの行にも属さない
        assert!(t.row_containing(0x110).is_none());
        assert!(t.row_containing(0x1ff).is_none());
        assert!(t.row_containing(0x50).is_none());
    }

    #[test]
    fn test_next_row_stops_at_end_sequence() {
        let t = table();
        assert_eq!(t.next_row(0).unwrap().line, 2);
        assert!(t.next_row(3).is_none());
    }

    #[test]
    fn test_is_path_suffix() {
        assert!(is_path_suffix("/home/u/src/hello.cpp", "hello.cpp"));
        assert!(is_path_suffix("/home/u/src/hello.cpp", "src/hello.cpp"));
        assert!(!is_path_suffix("/home/u/src/hello.cpp", "lo.cpp"));
    }
}
