//! # 结果展示与保存
//!
//! 终端表格、CSV 与 JSON 输出，`run` 和 `read` 共用。
//!
//! ## 依赖关系
//! - 被 `commands/run.rs`, `commands/read.rs` 使用
//! - 使用 `utils/output.rs`

use crate::utils::output;
use std::path::Path;
use tabled::{Table, Tabled};
use vaspcalc::error::VaspError;
use vaspcalc::{CalcResults, Result, Vasp};

/// 结果表中的一行
#[derive(Debug, Clone, Tabled)]
struct ResultRow {
    #[tabled(rename = "Quantity")]
    quantity: &'static str,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Unit")]
    unit: &'static str,
}

fn vector(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{:.6}", v)).collect();
    format!("[{}]", parts.join(", "))
}

fn summary_rows(results: &CalcResults) -> Vec<ResultRow> {
    let mut rows = Vec::new();
    let mut push = |quantity: &'static str, value: Option<String>, unit: &'static str| {
        if let Some(value) = value {
            rows.push(ResultRow {
                quantity,
                value,
                unit,
            });
        }
    };

    push("Energy (sigma->0)", results.energy.map(|e| format!("{:.6}", e)), "eV");
    push("Free energy", results.free_energy.map(|e| format!("{:.6}", e)), "eV");
    push("Max force", results.max_force().map(|f| format!("{:.6}", f)), "eV/Å");
    push("Stress", results.stress.map(|s| vector(&s)), "eV/Å³");
    push("Fermi level", results.fermi.map(|e| format!("{:.6}", e)), "eV");
    push("Magnetic moment", results.magmom.map(|m| format!("{:.4}", m)), "μB");
    push("Dipole", results.dipole.map(|d| vector(&d)), "e·Å");
    push("Bands", results.nbands.map(|n| n.to_string()), "");
    push("Converged", results.converged.map(|c| c.to_string()), "");
    rows
}

/// 打印结果表与警告
pub fn print_results(calc: &Vasp) {
    let results = calc.results();
    output::print_header(&format!("VASP Results: {}", calc.directory().display()));

    if let Some(version) = calc.version() {
        output::print_info(&format!("VASP version {}", version));
    }
    println!("{}", Table::new(summary_rows(results)));

    for warning in calc.warnings() {
        output::print_warning(&warning.to_string());
    }
    match results.converged {
        Some(false) => output::print_warning("The calculation did not converge"),
        None => output::print_warning("Convergence could not be determined from OUTCAR"),
        Some(true) => {}
    }
}

/// 保存每个原子的受力与磁矩
pub fn save_results_csv(calc: &Vasp, output_path: &Path) -> Result<()> {
    let results = calc.results();
    let symbols: Vec<&str> = calc
        .structure()
        .map(|s| s.symbols())
        .unwrap_or_default();
    let forces = results.forces.as_deref().unwrap_or_default();
    let magmoms = results.magmoms.as_deref().unwrap_or_default();
    let natoms = symbols.len().max(forces.len()).max(magmoms.len());

    let mut wtr = csv::Writer::from_path(output_path)?;
    wtr.write_record(["index", "element", "fx_eV_A", "fy_eV_A", "fz_eV_A", "magmom_muB"])?;

    for i in 0..natoms {
        let force = forces.get(i);
        let mut record = vec![
            i.to_string(),
            symbols.get(i).copied().unwrap_or_default().to_string(),
        ];
        for k in 0..3 {
            record.push(force.map(|f| format!("{:.10}", f[k])).unwrap_or_default());
        }
        record.push(
            magmoms
                .get(i)
                .map(|m| format!("{:.6}", m))
                .unwrap_or_default(),
        );
        wtr.write_record(&record)?;
    }

    wtr.flush().map_err(|e| VaspError::write(output_path, e))?;
    Ok(())
}

/// 按命令行选项保存 JSON 与 CSV
pub fn save_outputs(calc: &Vasp, json: Option<&Path>, csv: Option<&Path>) -> Result<()> {
    if let Some(path) = json {
        calc.to_state().write(path)?;
        output::print_success(&format!("Calculator state saved to '{}'", path.display()));
    }
    if let Some(path) = csv {
        save_results_csv(calc, path)?;
        output::print_success(&format!("Per-atom results saved to '{}'", path.display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_skips_missing_quantities() {
        let results = CalcResults {
            energy: Some(-3.25),
            converged: Some(true),
            ..Default::default()
        };
        let rows = summary_rows(&results);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, "-3.250000");
        assert_eq!(rows[1].quantity, "Converged");
    }

    #[test]
    fn test_empty_results_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        save_results_csv(&Vasp::new(dir.path()), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("index,element"));
    }
}
