//! # VASP OUTCAR 解析器
//!
//! OUTCAR 是自由格式文本，这里每个物理量由一个独立的函数按行扫描提取。
//! 所有函数都是容错的：找不到匹配时返回 `None` 或默认值，而不是报错。
//!
//! 按原子索引的数组保持 VASP 内部（排序后）的顺序，
//! 由 `calculator/` 通过排序索引还原为调用方顺序。
//!
//! ## 依赖关系
//! - 被 `calculator/` 使用
//! - 使用 `models/params.rs` (LDA+U 参数), `models/results.rs` (单位换算)

use crate::error::{Result, VaspError};
use crate::models::results::GPA;
use crate::models::LdauSpec;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// 读取 OUTCAR 全文
pub fn load_outcar(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| VaspError::read(path, e))
}

/// 第 n 个空白分隔的字段，负数从末尾计
fn token(line: &str, index: isize) -> Option<&str> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let idx = if index < 0 {
        tokens.len().checked_sub(index.unsigned_abs())?
    } else {
        index as usize
    };
    tokens.get(idx).copied()
}

fn float_token(line: &str, index: isize) -> Option<f64> {
    token(line, index)?.parse().ok()
}

/// 第 `start` 到 `start + N` 个字段解析成定长数组
fn float_array<const N: usize>(line: &str, start: usize) -> Option<[f64; N]> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mut out = [0.0; N];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = tokens.get(start + i)?.parse().ok()?;
    }
    Some(out)
}

// ─────────────────────────────────────────────────────────────
// 版本与完成状态
// ─────────────────────────────────────────────────────────────

/// VASP 版本号（第一次出现的 ` vasp.` 行）
pub fn read_version(lines: &[&str]) -> Option<String> {
    const MARKER: &str = " vasp.";
    lines.iter().find_map(|line| {
        let pos = line.find(MARKER)?;
        line[pos + MARKER.len()..]
            .split_whitespace()
            .next()
            .map(str::to_string)
    })
}

/// 任务是否正常结束
pub fn read_finished(lines: &[&str]) -> bool {
    lines
        .iter()
        .any(|line| line.contains("General timing and accounting"))
}

// ─────────────────────────────────────────────────────────────
// 能量
// ─────────────────────────────────────────────────────────────

/// 所有离子步的自由能 TOTEN
pub fn read_free_energies(lines: &[&str]) -> Vec<f64> {
    lines
        .iter()
        .filter(|line| line.to_lowercase().starts_with("  free  energy   toten"))
        .filter_map(|line| float_token(line, -2))
        .collect()
}

/// 所有离子步的 energy(sigma->0)
pub fn read_zero_energies(lines: &[&str]) -> Vec<f64> {
    lines
        .iter()
        .filter(|line| line.starts_with("  energy  without entropy"))
        .filter_map(|line| float_token(line, -1))
        .collect()
}

/// 最后一步的 (自由能, energy(sigma->0))
pub fn read_energy(lines: &[&str]) -> (Option<f64>, Option<f64>) {
    (
        read_free_energies(lines).last().copied(),
        read_zero_energies(lines).last().copied(),
    )
}

// ─────────────────────────────────────────────────────────────
// 力、应力、偶极
// ─────────────────────────────────────────────────────────────

/// 所有 `TOTAL-FORCE` 块中的原子受力
pub fn read_all_forces(lines: &[&str], natoms: usize) -> Vec<Vec<[f64; 3]>> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.contains("TOTAL-FORCE"))
        .filter_map(|(n, _)| {
            (0..natoms)
                .map(|i| float_array::<3>(lines.get(n + 2 + i)?, 3))
                .collect::<Option<Vec<_>>>()
        })
        .collect()
}

/// 最后一个 `TOTAL-FORCE` 块
pub fn read_forces(lines: &[&str], natoms: usize) -> Option<Vec<[f64; 3]>> {
    read_all_forces(lines, natoms).pop()
}

/// 应力 (eV/Å³, Voigt 顺序)，来自最后一个 `in kB` 行
///
/// OUTCAR 的分量顺序是 XX YY ZZ XY YZ ZX，且符号与应力约定相反。
pub fn read_stress(lines: &[&str]) -> Option<[f64; 6]> {
    let raw = lines
        .iter()
        .filter(|line| line.contains(" in kB  "))
        .filter_map(|line| float_array::<6>(line, 2))
        .last()?;
    let scale = -0.1 * GPA;
    Some([0, 1, 2, 4, 5, 3].map(|i| raw[i] * scale))
}

/// 偶极矩，没有时为零
pub fn read_dipole(lines: &[&str]) -> [f64; 3] {
    lines
        .iter()
        .filter(|line| line.contains("dipolmoment"))
        .filter_map(|line| float_array::<3>(line, 1))
        .last()
        .unwrap_or([0.0; 3])
}

// ─────────────────────────────────────────────────────────────
// 电子结构
// ─────────────────────────────────────────────────────────────

/// 费米能级
pub fn read_fermi(lines: &[&str]) -> Option<f64> {
    lines
        .iter()
        .filter(|line| line.contains("E-fermi"))
        .filter_map(|line| float_token(line, 2))
        .last()
}

/// 能带数，跳过以 `|` 开头的警告框
pub fn read_nbands(lines: &[&str]) -> Option<usize> {
    lines
        .iter()
        .filter(|line| !line.starts_with('|'))
        .find(|line| line.contains("NBANDS"))
        .and_then(|line| token(line, -1)?.parse().ok())
}

/// 价电子总数
pub fn read_number_of_electrons(lines: &[&str]) -> Option<f64> {
    lines
        .iter()
        .find(|line| line.contains("total number of electrons"))
        .and_then(|line| line.split('=').nth(1)?.split_whitespace().next()?.parse().ok())
}

// ─────────────────────────────────────────────────────────────
// 磁矩
// ─────────────────────────────────────────────────────────────

/// 总磁矩（`number of electron` 行的最后一个字段）
pub fn read_magnetic_moment(lines: &[&str]) -> Option<f64> {
    lines
        .iter()
        .filter(|line| line.contains("number of electron  "))
        .filter_map(|line| float_token(line, -1))
        .last()
}

/// 原子磁矩，来自最后一个 `magnetization (x)` 块
///
/// 块不存在时返回 `None`。
pub fn read_magnetic_moments(lines: &[&str], natoms: usize) -> Option<Vec<f64>> {
    let nidx = lines
        .iter()
        .rposition(|line| line.contains("magnetization (x)"))?;
    (0..natoms)
        .map(|m| float_token(lines.get(nidx + m + 4)?, 4))
        .collect()
}

// ─────────────────────────────────────────────────────────────
// 收敛
// ─────────────────────────────────────────────────────────────

/// VASP 的默认 EDIFF
const DEFAULT_EDIFF: f64 = 1e-4;

/// 修复指数中丢失 `e` 的数字，例如 `0.2737684-111` → `0.2737684e-111`
///
/// 最后一个 `-` 被视为指数符号。
pub fn repair_glued_exponent(raw: &str) -> String {
    if raw.to_lowercase().contains('e') {
        return raw.to_string();
    }
    let mut parts: Vec<String> = raw.split('-').map(str::to_string).collect();
    if let Some(last) = parts.last_mut() {
        last.insert(0, 'e');
    }
    parts.join("-").replace("-e", "e-")
}

/// 电子步收敛判据
///
/// 以最后一个 `total energy-change` 行为准：两个能量变化的绝对值
/// 按字典序小于 (EDIFF, EDIFF) 时视为收敛。
pub fn read_electronic_convergence(lines: &[&str]) -> Option<bool> {
    let mut ediff = DEFAULT_EDIFF;
    let mut converged = None;

    for line in lines {
        if line.contains("EDIFF  ") {
            if let Some(value) = float_token(line, 2) {
                ediff = value;
            }
        }
        if !line.contains("total energy-change") || line.contains("MIXING") {
            continue;
        }
        let Some(changes) = line.split(':').nth(1) else {
            continue;
        };
        let Some((a, b)) = changes.split_once('(') else {
            continue;
        };
        let a: Option<f64> = a.trim().parse().ok();
        let b = repair_glued_exponent(b.trim().trim_end_matches(')').trim());
        if let (Some(a), Ok(b)) = (a, b.parse::<f64>()) {
            converged = Some((a.abs(), b.abs()) < (ediff, ediff));
        }
    }
    converged
}

/// 离子弛豫是否达到精度
pub fn read_relaxed(lines: &[&str]) -> bool {
    lines
        .iter()
        .any(|line| line.contains("reached required accuracy"))
}

/// 综合收敛判断
///
/// 要求离子弛豫（`IBRION` 为 1/2/3 且 `NSW` 不为 0）时，
/// 弛豫标记覆盖电子步结果。
pub fn read_convergence(lines: &[&str], ibrion: Option<i64>, nsw: Option<i64>) -> Option<bool> {
    let electronic = read_electronic_convergence(lines);
    let relaxation = matches!(ibrion, Some(1..=3)) && nsw != Some(0);
    if relaxation {
        Some(read_relaxed(lines))
    } else {
        electronic
    }
}

fn iteration_counts(lines: &[&str]) -> Option<(usize, usize)> {
    let digits = Regex::new(r"\d+").ok()?;
    lines
        .iter()
        .filter(|line| line.contains("- Iteration"))
        .filter_map(|line| {
            let numbers: Vec<usize> = digits
                .find_iter(line)
                .filter_map(|m| m.as_str().parse().ok())
                .collect();
            Some((*numbers.first()?, *numbers.get(1)?))
        })
        .last()
}

/// 最后一个离子步中的电子步数
pub fn read_number_of_iterations(lines: &[&str]) -> Option<usize> {
    iteration_counts(lines).map(|(_, electronic)| electronic)
}

/// 离子步数
pub fn read_number_of_ionic_steps(lines: &[&str]) -> Option<usize> {
    iteration_counts(lines).map(|(ionic, _)| ionic)
}

// ─────────────────────────────────────────────────────────────
// LDA+U
// ─────────────────────────────────────────────────────────────

/// OUTCAR 中的 DFT+U 设置
#[derive(Debug, Clone, PartialEq)]
pub struct LdauInfo {
    pub ldautype: i64,
    pub luj: BTreeMap<String, LdauSpec>,
}

/// 读取 LDA+U 参数，非 DFT+U 计算返回 `None`
pub fn read_ldau(lines: &[&str]) -> Option<LdauInfo> {
    let mut species = Vec::new();
    let mut ldautype = None;
    let (mut l, mut u, mut j) = (Vec::new(), Vec::new(), Vec::new());

    let after_eq = |line: &str| -> Vec<String> {
        line.rsplit('=')
            .next()
            .unwrap_or("")
            .split_whitespace()
            .map(str::to_string)
            .collect()
    };

    for line in lines {
        if line.contains("TITEL") {
            if let Some(tok) = token(line, 3) {
                let symbol = tok.split('_').next().unwrap_or(tok);
                let symbol = symbol.split('.').next().unwrap_or(symbol);
                species.push(symbol.to_string());
            }
        }
        if line.contains("LDAUTYPE") {
            ldautype = line.rsplit('=').next().and_then(|s| s.trim().parse().ok());
        }
        if line.contains("LDAUL") {
            l = after_eq(line);
        }
        if line.contains("LDAUU") {
            u = after_eq(line);
        }
        if line.contains("LDAUJ") {
            j = after_eq(line);
        }
    }

    let ldautype = ldautype?;
    let mut luj = BTreeMap::new();
    for (i, symbol) in species.into_iter().enumerate() {
        let spec = (|| {
            Some(LdauSpec {
                l: l.get(i)?.parse().ok()?,
                u: u.get(i)?.parse().ok()?,
                j: j.get(i)?.parse().ok()?,
            })
        })();
        if let Some(spec) = spec {
            luj.insert(symbol, spec);
        }
    }
    Some(LdauInfo { ldautype, luj })
}

// ─────────────────────────────────────────────────────────────
// 振动频率与 BEEF
// ─────────────────────────────────────────────────────────────

/// 振动频率 (meV)，返回 (实频, 虚频)
pub fn read_vib_freq(lines: &[&str]) -> (Vec<f64>, Vec<f64>) {
    let mut real = Vec::new();
    let mut imaginary = Vec::new();
    for line in lines {
        let data: Vec<&str> = line.split_whitespace().collect();
        if !data.contains(&"THz") {
            continue;
        }
        let Some(value) = data.len().checked_sub(2).and_then(|i| data[i].parse().ok()) else {
            continue;
        };
        if data.contains(&"f/i=") {
            imaginary.push(value);
        } else {
            real.push(value);
        }
    }
    (real, imaginary)
}

/// BEEF-vdW 泛函的非自洽能量贡献数
pub const BEEF_CONTRIBUTIONS: usize = 32;

/// 最后一个 `BEEF xc energy contributions` 块之后的 32 个能量贡献
pub fn read_beef_contributions(lines: &[&str]) -> Option<Vec<f64>> {
    let start = lines
        .iter()
        .rposition(|line| line.contains("BEEF xc energy contributions"))?;
    let values: Vec<f64> = lines
        .iter()
        .skip(start + 1)
        .take(BEEF_CONTRIBUTIONS)
        .filter_map(|line| line.rsplit(':').next()?.trim().parse().ok())
        .collect();
    (values.len() == BEEF_CONTRIBUTIONS).then_some(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTCAR: &str = r#" vasp.5.4.4.18Apr17-6-g9f103f2a35 (build Jan 29 2020) complex
   ISPIN  =      2    spin polarized calculation?
   EDIFF  = 0.1E-04   stopping-criterion for ELM
   total number of electrons =      16.0000000 for the system
   k-points           NKPTS =      4   k-points in BZ     NKDIM =      4   number of bands    NBANDS=     16
--------------------------------------- Iteration      1(   1)  ---------------------------------------
  total energy-change (2. order) : 0.1000000E+02  (-0.5000000E+01)
--------------------------------------- Iteration      1(   2)  ---------------------------------------
  total energy-change (2. order) :-0.2141803E-08  ( 0.2737684-111)
 number of electron      16.0000000 magnetization       2.0000000
  in kB      -10.00000    -20.00000    -30.00000      1.00000      2.00000      3.00000
 E-fermi :   5.1234     XC(G=0):  -9.8012     alpha+bet : -8.6543
 dipolmoment           0.100000      0.200000      0.300000 electrons x Angstroem
 POSITION                                       TOTAL-FORCE (eV/Angst)
 -----------------------------------------------------------------------------------
      0.00000      0.00000      0.00000         0.100000     -0.200000      0.300000
      1.43000      1.43000      1.43000        -0.100000      0.200000     -0.300000
 -----------------------------------------------------------------------------------
  FREE ENERGIE OF THE ION-ELECTRON SYSTEM (eV)
  ---------------------------------------------------
  free  energy   TOTEN  =       -16.12345678 eV

  energy  without entropy=      -16.10000000  energy(sigma->0) =      -16.11111111
 magnetization (x)

# of ion       s       p       d       tot
------------------------------------------
    1        0.010   0.020   1.000   1.030
    2        0.010   0.020   0.900   0.930
--------------------------------------------------
 reached required accuracy - stopping structural energy minimisation
 General timing and accounting informations for this job:
"#;

    fn lines() -> Vec<&'static str> {
        OUTCAR.lines().collect()
    }

    #[test]
    fn test_free_energy_line() {
        let line = ["  free  energy   toten  =  -123.456  eV"];
        assert_eq!(read_free_energies(&line), vec![-123.456]);
    }

    #[test]
    fn test_energy_and_version() {
        let lines = lines();
        assert_eq!(
            read_energy(&lines),
            (Some(-16.12345678), Some(-16.11111111))
        );
        assert_eq!(
            read_version(&lines).as_deref(),
            Some("5.4.4.18Apr17-6-g9f103f2a35")
        );
        assert!(read_finished(&lines));
    }

    #[test]
    fn test_forces_and_dipole() {
        let lines = lines();
        let forces = read_forces(&lines, 2).unwrap();
        assert_eq!(forces, vec![[0.1, -0.2, 0.3], [-0.1, 0.2, -0.3]]);
        assert_eq!(read_dipole(&lines), [0.1, 0.2, 0.3]);
        assert_eq!(read_dipole(&[]), [0.0; 3]);
    }

    #[test]
    fn test_stress_conversion() {
        let stress = read_stress(&lines()).unwrap();
        let scale = -0.1 * GPA;
        let expected = [-10.0, -20.0, -30.0, 2.0, 3.0, 1.0].map(|x| x * scale);
        for (a, b) in stress.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_electronic_properties() {
        let lines = lines();
        assert_eq!(read_fermi(&lines), Some(5.1234));
        assert_eq!(read_nbands(&lines), Some(16));
        assert_eq!(read_number_of_electrons(&lines), Some(16.0));
        assert_eq!(read_number_of_ionic_steps(&lines), Some(1));
        assert_eq!(read_number_of_iterations(&lines), Some(2));
    }

    #[test]
    fn test_nbands_ignores_warning_box() {
        let lines = [
            "| NBANDS is too small, increasing it to 99 |",
            "   number of bands    NBANDS=     24",
        ];
        assert_eq!(read_nbands(&lines), Some(24));
    }

    #[test]
    fn test_magnetization() {
        let lines = lines();
        assert_eq!(read_magnetic_moment(&lines), Some(2.0));
        assert_eq!(read_magnetic_moments(&lines, 2), Some(vec![1.03, 0.93]));
        assert_eq!(read_magnetic_moments(&["nothing here"], 2), None);
    }

    #[test]
    fn test_glued_exponent_repair() {
        assert_eq!(repair_glued_exponent("0.2737684-111"), "0.2737684e-111");
        assert_eq!(repair_glued_exponent("-0.2737684-111"), "-0.2737684e-111");
        assert_eq!(repair_glued_exponent("0.5000000E-01"), "0.5000000E-01");
        let value: f64 = repair_glued_exponent("0.2737684-111").parse().unwrap();
        assert!(value > 0.0 && value < 1e-110);
    }

    #[test]
    fn test_convergence() {
        let lines = lines();
        assert_eq!(read_electronic_convergence(&lines), Some(true));
        assert_eq!(read_convergence(&lines, Some(2), Some(10)), Some(true));

        let unrelaxed: Vec<&str> = lines
            .iter()
            .copied()
            .filter(|l| !l.contains("reached required accuracy"))
            .collect();
        assert_eq!(read_convergence(&unrelaxed, Some(2), Some(10)), Some(false));
        assert_eq!(read_convergence(&unrelaxed, Some(2), Some(0)), Some(true));
        assert_eq!(read_convergence(&unrelaxed, None, None), Some(true));
    }

    #[test]
    fn test_convergence_not_reached() {
        let lines = [
            "   EDIFF  = 0.1E-04   stopping-criterion for ELM",
            "  total energy-change (2. order) : 0.1000000E+02  (-0.5000000E+01)",
            "  total energy-change (2. order) :MIXING 0.1",
        ];
        assert_eq!(read_electronic_convergence(&lines), Some(false));
        assert_eq!(read_electronic_convergence(&[]), None);
    }

    #[test]
    fn test_ldau() {
        let lines = [
            "   TITEL  = PAW_PBE Fe 06Sep2000",
            "   TITEL  = PAW_PBE O_s 07Sep2000",
            "   LDAUTYPE =  2",
            "   LDAUL    =     2    -1",
            "   LDAUU    =    4.0000    0.0000",
            "   LDAUJ    =    0.0000    0.0000",
        ];
        let info = read_ldau(&lines).unwrap();
        assert_eq!(info.ldautype, 2);
        assert_eq!(info.luj["Fe"].l, 2);
        assert_eq!(info.luj["Fe"].u, 4.0);
        assert_eq!(info.luj["O"].l, -1);
        assert!(read_ldau(&lines[..2]).is_none());
    }

    #[test]
    fn test_vib_freq() {
        let lines = [
            "   1 f  =   30.000000 THz   188.495559 2PiTHz 1000.692286 cm-1   124.070000 meV",
            "   2 f/i=    1.500000 THz     9.424778 2PiTHz   50.034614 cm-1     6.203500 meV",
        ];
        let (real, imaginary) = read_vib_freq(&lines);
        assert_eq!(real, vec![124.07]);
        assert_eq!(imaginary, vec![6.2035]);
    }

    #[test]
    fn test_beef_contributions() {
        let mut text = String::from(" BEEF xc energy contributions\n");
        for i in 0..BEEF_CONTRIBUTIONS {
            text.push_str(&format!("  {}: {:.4}\n", i, -(i as f64)));
        }
        let lines: Vec<&str> = text.lines().collect();
        let values = read_beef_contributions(&lines).unwrap();
        assert_eq!(values.len(), BEEF_CONTRIBUTIONS);
        assert_eq!(values[31], -31.0);

        assert!(read_beef_contributions(&lines[..10]).is_none());
    }
}
