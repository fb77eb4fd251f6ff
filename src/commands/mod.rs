//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `utils/` 与 vaspcalc 库
//! - 子模块: run, read, export, report

pub mod export;
pub mod read;
pub mod report;
pub mod run;

use crate::cli::Commands;
use vaspcalc::Result;

/// 执行命令
pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Run(args) => run::execute(args),
        Commands::Read(args) => read::execute(args),
        Commands::Export(args) => export::execute(args),
    }
}
