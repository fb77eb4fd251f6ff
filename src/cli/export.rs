//! # export 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/export.rs`

use clap::Args;
use std::path::PathBuf;

/// export 子命令参数
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Directory of a finished VASP calculation
    #[arg(short, long, default_value = ".")]
    pub directory: PathBuf,

    /// Output JSON file
    #[arg(short, long, default_value = "vaspcalc.json")]
    pub output: PathBuf,
}
