//! # read 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/read.rs`

use clap::Args;
use std::path::PathBuf;

/// read 子命令参数
#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Directory of a finished VASP calculation
    #[arg(short, long, default_value = ".")]
    pub directory: PathBuf,

    /// Save the calculator state as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Save the results as CSV
    #[arg(long)]
    pub csv: Option<PathBuf>,
}
