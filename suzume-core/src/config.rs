//! デバッガの設定

/// デバッガの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggerConfig {
    /// バックトレースを打ち切る関数名
    pub entry_function: String,
    /// バックトレースのフレーム数の上限
    pub max_frames: usize,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            entry_function: "main".to_string(),
            max_frames: 256,
        }
    }
}
