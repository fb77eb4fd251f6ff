//! # run 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/run.rs`

use clap::Args;
use std::path::PathBuf;

/// run 子命令参数
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Input structure in POSCAR format
    #[arg(long)]
    pub poscar: PathBuf,

    /// Flat JSON object of VASP parameters, e.g. {"xc": "PBE", "encut": 400}
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// Working directory of the calculation
    #[arg(short, long, default_value = ".")]
    pub directory: PathBuf,

    /// Command that launches VASP (falls back to VASPCALC_COMMAND, VASP_COMMAND, VASP_SCRIPT)
    #[arg(long)]
    pub command: Option<String>,

    /// Where VASP writes stdout: a file in the working directory, '-' for stdout or 'none'
    #[arg(long, default_value = "vasp.out")]
    pub txt: String,

    /// Root of the pseudopotential library
    #[arg(long, env = "VASP_PP_PATH")]
    pub pp_path: Option<PathBuf>,

    /// Save the calculator state as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Save the results as CSV
    #[arg(long)]
    pub csv: Option<PathBuf>,
}
