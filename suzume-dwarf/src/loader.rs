//! ELFとDWARFの読み込み機能

use crate::lines::{LineRow, LineTable};
use crate::unit::{CompileUnit, DebugInfo, Function};
use crate::utils::DieAttrs;
use crate::variables::Variable;
use crate::Result;
use object::{Object, ObjectSection};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::debug;

type Slice = gimli::EndianSlice<'static, gimli::RunTimeEndian>;

/// DWARFローダー
pub struct DwarfLoader {
    /// オブジェクトファイル
    object_file: Rc<object::File<'static>>,
    /// DWARFコンテキスト
    dwarf: gimli::Dwarf<Slice>,
}

impl DwarfLoader {
    /// ELFファイルからDWARF情報を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file_data = fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read file {:?}: {}", path, e))?;

        // セッション中はずっと参照するため、'staticライフタイムを得る
        let file_data: &'static [u8] = Box::leak(file_data.into_boxed_slice());

        let object_file = object::File::parse(file_data)
            .map_err(|e| anyhow::anyhow!("Failed to parse ELF file {:?}: {}", path, e))?;

        let endian = if object_file.is_little_endian() {
            gimli::RunTimeEndian::Little
        } else {
            gimli::RunTimeEndian::Big
        };

        let load_section = |id: gimli::SectionId| -> Result<Slice> {
            let data = object_file
                .section_by_name(id.name())
                .and_then(|section| section.data().ok())
                .unwrap_or(&[]);
            Ok(gimli::EndianSlice::new(data, endian))
        };

        let dwarf = gimli::Dwarf::load(load_section)
            .map_err(|e| anyhow::anyhow!("Failed to load DWARF sections: {}", e))?;

        Ok(Self {
            object_file: Rc::new(object_file),
            dwarf,
        })
    }

    /// DWARFコンテキストへの参照を取得
    pub fn dwarf(&self) -> &gimli::Dwarf<Slice> {
        &self.dwarf
    }

    /// オブジェクトファイルへの参照を取得
    pub fn object_file(&self) -> &object::File<'static> {
        &self.object_file
    }

    /// PIE（Position Independent Executable）かどうかを判定する
    ///
    /// PIE実行ファイルの場合、DWARFのアドレスはオフセットであり、
    /// 実行時ベースアドレスを加算する必要があります。
    pub fn is_pie(&self) -> bool {
        use object::ObjectKind;

        // ET_DYN = PIE実行ファイルまたは共有ライブラリ
        matches!(self.object_file.kind(), ObjectKind::Dynamic)
    }

    /// すべてのコンパイルユニットを読み取り、検索用の構造に変換する
    pub fn debug_info(&self) -> Result<DebugInfo> {
        let dwarf = &self.dwarf;
        let mut units = Vec::new();

        let mut iter = dwarf.units();
        while let Some(header) = iter.next()? {
            let unit = dwarf.unit(header)?;
            units.push(self.read_unit(&unit)?);
        }

        debug!(
            "Loaded {} compile units, {} functions",
            units.len(),
            units.iter().map(|u| u.functions.len()).sum::<usize>()
        );

        Ok(DebugInfo::new(units))
    }

    fn read_unit(&self, unit: &gimli::Unit<Slice>) -> Result<CompileUnit> {
        let dwarf = &self.dwarf;
        let attrs = DieAttrs::new(dwarf, unit);

        let name = match &unit.name {
            Some(name) => name.to_string_lossy().into_owned(),
            None => String::new(),
        };

        let mut ranges = Vec::new();
        let mut range_iter = dwarf.unit_ranges(unit)?;
        while let Some(range) = range_iter.next()? {
            if range.begin < range.end {
                ranges.push(range.begin..range.end);
            }
        }

        let mut functions = Vec::new();
        let mut tree = unit.entries_tree(None)?;
        let root = tree.root()?;
        collect_functions(&attrs, root, &mut functions)?;

        let lines = self.read_line_table(unit)?;

        Ok(CompileUnit::new(name, ranges, functions, lines))
    }

    /// 行番号プログラムを実行して行テーブルを作る
    fn read_line_table(&self, unit: &gimli::Unit<Slice>) -> Result<LineTable> {
        let program = match unit.line_program.clone() {
            Some(program) => program,
            None => return Ok(LineTable::default()),
        };

        let mut paths: HashMap<u64, String> = HashMap::new();
        let mut rows = Vec::new();
        let mut program_rows = program.rows();

        while let Some((header, row)) = program_rows.next_row()? {
            let file = match paths.get(&row.file_index()) {
                Some(path) => path.clone(),
                None => {
                    let path = match row.file(header) {
                        Some(entry) => self.file_path(unit, header, entry)?,
                        None => String::new(),
                    };
                    paths.insert(row.file_index(), path.clone());
                    path
                }
            };

            rows.push(LineRow {
                file,
                line: row.line().map(|l| l.get()).unwrap_or(0),
                address: row.address(),
                is_stmt: row.is_stmt(),
                end_sequence: row.end_sequence(),
            });
        }

        Ok(LineTable::new(rows))
    }

    fn file_path(
        &self,
        unit: &gimli::Unit<Slice>,
        header: &gimli::LineProgramHeader<Slice>,
        entry: &gimli::FileEntry<Slice>,
    ) -> Result<String> {
        let mut path = PathBuf::new();

        // 絶対パスがpushされた場合はそれまでの要素が置き換わる
        if let Some(comp_dir) = &unit.comp_dir {
            path.push(comp_dir.to_string_lossy().as_ref());
        }
        if let Some(dir) = entry.directory(header) {
            let dir = self.dwarf.attr_string(unit, dir)?;
            path.push(dir.to_string_lossy().as_ref());
        }
        let file = self.dwarf.attr_string(unit, entry.path_name())?;
        path.push(file.to_string_lossy().as_ref());

        Ok(path.to_string_lossy().into_owned())
    }
}

/// DIEツリーから関数を集める
///
/// 名前空間や型の中の関数も対象にしますが、関数の内側（インライン展開など）には降りません。
fn collect_functions<R: gimli::Reader<Offset = usize>>(
    attrs: &DieAttrs<'_, R>,
    node: gimli::EntriesTreeNode<'_, '_, '_, R>,
    out: &mut Vec<Function>,
) -> Result<()> {
    let mut children = node.children();
    while let Some(child) = children.next()? {
        if child.entry().tag() == gimli::DW_TAG_subprogram {
            if let Some(function) = read_function(attrs, child)? {
                out.push(function);
            }
        } else {
            collect_functions(attrs, child, out)?;
        }
    }
    Ok(())
}

fn read_function<R: gimli::Reader<Offset = usize>>(
    attrs: &DieAttrs<'_, R>,
    node: gimli::EntriesTreeNode<'_, '_, '_, R>,
) -> Result<Option<Function>> {
    let entry = node.entry();
    let (low_pc, high_pc) = match attrs.pc_range(entry)? {
        Some(range) => range,
        None => return Ok(None),
    };
    let name = attrs.name(entry)?.unwrap_or_else(|| format!("<0x{:x}>", low_pc));

    let mut function = Function::new(name, low_pc, high_pc);
    function.frame_base = attrs.frame_base(entry)?;
    collect_variables(attrs, node, &mut function.variables)?;

    Ok(Some(function))
}

/// 関数直下とレキシカルブロック内の変数を集める
fn collect_variables<R: gimli::Reader<Offset = usize>>(
    attrs: &DieAttrs<'_, R>,
    node: gimli::EntriesTreeNode<'_, '_, '_, R>,
    out: &mut Vec<Variable>,
) -> Result<()> {
    let mut children = node.children();
    while let Some(child) = children.next()? {
        let entry = child.entry();
        let tag = entry.tag();

        if tag == gimli::DW_TAG_variable || tag == gimli::DW_TAG_formal_parameter {
            if let Some(name) = attrs.name(entry)? {
                let mut variable = Variable::new(name, attrs.location(entry)?);
                variable.is_parameter = tag == gimli::DW_TAG_formal_parameter;
                out.push(variable);
            }
        } else if tag == gimli::DW_TAG_lexical_block {
            collect_variables(attrs, child, out)?;
        }
    }
    Ok(())
}
