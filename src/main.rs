//! # vaspcalc 命令行
//!
//! ## 子命令
//! - `run`    - 写输入、运行 VASP 并打印结果
//! - `read`   - 从已完成的计算目录读取结果
//! - `export` - 把计算器状态导出为 JSON
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     └── vaspcalc 库 (计算器、解析器、数据模型)
//!   └── utils/      (输出、进度、日志)
//! ```

mod cli;
mod commands;
mod utils;

use clap::Parser;
use cli::Cli;

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();
    utils::logging::setup_logging(cli.verbose, cli.quiet);

    if let Err(e) = commands::run(cli.command) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}
