//! # run 子命令实现
//!
//! 读取 POSCAR 与参数 JSON，运行一次 VASP 计算并展示结果。
//!
//! ## 依赖关系
//! - 使用 `cli/run.rs` 定义的参数
//! - 使用 `commands/report.rs`, `utils/output.rs`, `utils/progress.rs`

use crate::cli::run::RunArgs;
use crate::commands::report;
use crate::utils::{output, progress};

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use vaspcalc::error::VaspError;
use vaspcalc::parsers::parse_poscar_file;
use vaspcalc::{ParamValue, Result, TxtOutput, Vasp};

/// 读取扁平的参数 JSON 对象
fn load_params(path: &Path) -> Result<BTreeMap<String, ParamValue>> {
    let content = fs::read_to_string(path).map_err(|e| VaspError::read(path, e))?;
    Ok(serde_json::from_str(&content)?)
}

/// 执行 run
pub fn execute(args: RunArgs) -> Result<()> {
    output::print_header("Running VASP");

    let structure = parse_poscar_file(&args.poscar, None)?;
    output::print_info(&format!(
        "Loaded {} ({} atoms) from '{}'",
        structure.formula(),
        structure.len(),
        args.poscar.display()
    ));

    let txt = TxtOutput::from_arg(&args.txt);
    let streams_to_terminal = matches!(txt, TxtOutput::Stdout);

    let mut calc = Vasp::new(&args.directory).with_txt(txt);
    if let Some(command) = args.command {
        calc = calc.with_command(command);
    }
    if let Some(pp_path) = args.pp_path {
        calc = calc.with_pp_path(pp_path);
    }
    if let Some(path) = &args.params {
        let params = load_params(path)?;
        output::print_info(&format!("Loaded {} parameters from '{}'", params.len(), path.display()));
        calc.update_params(params)?;
    }

    let spinner = (!streams_to_terminal).then(|| {
        progress::create_spinner(&format!("VASP running in '{}'", args.directory.display()))
    });
    let outcome = calc.calculate(&structure).map(|_| ());
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    outcome?;

    output::print_done(&format!("VASP finished in '{}'", args.directory.display()));
    report::print_results(&calc);
    report::save_outputs(&calc, args.json.as_deref(), args.csv.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_params() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        fs::write(&path, r#"{"xc": "PBE", "encut": 520.0, "kpts": [4, 4, 4], "lwave": false}"#)
            .unwrap();

        let params = load_params(&path).unwrap();
        assert_eq!(params["encut"], ParamValue::Float(520.0));
        assert_eq!(params["kpts"], ParamValue::IntList(vec![4, 4, 4]));
        assert_eq!(params["lwave"], ParamValue::Bool(false));

        let mut calc = Vasp::new(dir.path());
        calc.update_params(params).unwrap();
        assert_eq!(calc.params().kpts(), Some([4, 4, 4]));
    }

    #[test]
    fn test_unknown_parameter_is_rejected() {
        let mut calc = Vasp::new("unused");
        let params = BTreeMap::from([("not_a_tag".to_string(), ParamValue::Int(1))]);
        assert!(matches!(calc.update_params(params), Err(VaspError::Setup(_))));
    }
}
