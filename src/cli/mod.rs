//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `run`: 运行一次 VASP 计算
//! - `read`: 从计算目录恢复结果
//! - `export`: 导出计算器状态
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: run, read, export

pub mod export;
pub mod read;
pub mod run;

use clap::{ArgAction, Parser, Subcommand};

/// vaspcalc - VASP 计算器
#[derive(Parser)]
#[command(name = "vaspcalc")]
#[command(author = "Changjiang Wu")]
#[command(version)]
#[command(about = "Write VASP inputs, run VASP and read back its results", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Silence all log output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Write inputs for a structure, run VASP and print the results
    Run(run::RunArgs),

    /// Read the results of a finished calculation directory
    Read(read::ReadArgs),

    /// Export the calculator state of a finished directory as JSON
    Export(export::ExportArgs),
}
