//! # export 子命令实现
//!
//! 恢复计算目录并把计算器状态写成 JSON。
//!
//! ## 依赖关系
//! - 使用 `cli/export.rs` 定义的参数
//! - 使用 `utils/output.rs`

use crate::cli::export::ExportArgs;
use crate::utils::output;
use vaspcalc::{Result, Vasp};

/// 执行 export
pub fn execute(args: ExportArgs) -> Result<()> {
    let mut calc = Vasp::new(&args.directory);
    calc.read()?;
    calc.to_state().write(&args.output)?;

    output::print_conversion(
        &args.directory.display().to_string(),
        &args.output.display().to_string(),
    );
    Ok(())
}
