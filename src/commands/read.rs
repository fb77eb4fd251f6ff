//! # read 子命令实现
//!
//! 从已完成的计算目录恢复计算器并展示结果。
//!
//! ## 依赖关系
//! - 使用 `cli/read.rs` 定义的参数
//! - 使用 `commands/report.rs`, `utils/output.rs`

use crate::cli::read::ReadArgs;
use crate::commands::report;
use crate::utils::output;
use vaspcalc::{Result, Vasp};

/// 执行 read
pub fn execute(args: ReadArgs) -> Result<()> {
    output::print_info(&format!("Reading VASP outputs in '{}'", args.directory.display()));

    let mut calc = Vasp::new(&args.directory);
    calc.read()?;

    if let Some(structure) = calc.structure() {
        output::print_info(&format!("Structure: {} ({} atoms)", structure.formula(), structure.len()));
    }
    report::print_results(&calc);
    report::save_outputs(&calc, args.json.as_deref(), args.csv.as_deref())
}
