//! # VASP INCAR 读写
//!
//! 根据参数存储写出 INCAR，或从已有 INCAR 读回参数（用于重启）。
//!
//! ## 写出规则
//! - 浮点参数 `{:.4}`，指数参数 `{:.2e}`
//! - 布尔值 `.TRUE.` / `.FALSE.`，列表以空格分隔
//! - `xc` 自动补充对应的 `GGA` 标签
//! - `ldau_luj` 按排序后的元素顺序展开为 `LDAUL/LDAUU/LDAUJ`
//! - 结构带有非零初始磁矩且未显式设置时写出 `MAGMOM` 与 `ISPIN = 2`
//!
//! ## 依赖关系
//! - 被 `calculator/` 使用
//! - 使用 `models/params.rs`, `parsers/poscar.rs`

use crate::error::{Result, VaspError};
use crate::models::params::xc_tags;
use crate::models::{ParamCategory, ParamValue, Structure, VaspParams};
use crate::parsers::poscar::species_runs;
use std::fs;
use std::path::Path;
use tracing::debug;

/// 将 INCAR 中的一个值格式化
fn format_value(category: ParamCategory, value: &ParamValue) -> String {
    let bool_str = |b: bool| if b { ".TRUE." } else { ".FALSE." };
    match value {
        ParamValue::Float(x) if category == ParamCategory::ExpParams => format!("{:.2e}", x),
        ParamValue::Float(x) => format!("{:.4}", x),
        ParamValue::Int(i) => i.to_string(),
        ParamValue::Bool(b) => bool_str(*b).to_string(),
        ParamValue::Str(s) => s.clone(),
        ParamValue::IntList(v) => join(v.iter().map(|i| i.to_string())),
        ParamValue::FloatList(v) => join(v.iter().map(|x| format!("{:.4}", x))),
        ParamValue::BoolList(v) => join(v.iter().map(|b| bool_str(*b).to_string())),
        ParamValue::Null | ParamValue::Ldau(_) => String::new(),
    }
}

fn join(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(" ")
}

/// 将磁矩列表压缩成 `n*value` 形式
fn compact_magmoms(magmoms: &[f64]) -> String {
    let mut runs: Vec<(usize, f64)> = Vec::new();
    for &m in magmoms {
        match runs.last_mut() {
            Some((n, v)) if *v == m => *n += 1,
            _ => runs.push((1, m)),
        }
    }
    join(runs.into_iter().map(|(n, v)| format!("{}*{:.4}", n, v)))
}

/// 生成 INCAR 内容
///
/// `sorted` 是已按排序索引重排后的结构（即 POSCAR 中的顺序）。
pub fn to_incar_string(params: &VaspParams, sorted: &Structure) -> String {
    let mut lines = vec!["INCAR created by vaspcalc".to_string()];
    let mut push = |key: &str, value: String| {
        lines.push(format!(" {} = {}", key.to_uppercase(), value));
    };

    // 交换关联泛函
    if params.get("gga").is_none() {
        if let Some(gga) = params.get_str("xc").and_then(xc_tags).and_then(|(_, gga)| gga) {
            push("gga", gga.to_string());
        }
    }

    for category in ParamCategory::ALL {
        if matches!(
            category,
            ParamCategory::InputParams | ParamCategory::DictParams
        ) {
            continue;
        }
        for (key, value) in params.category(category) {
            push(key, format_value(category, value));
        }
    }

    // 初始磁矩
    let magmoms = sorted.initial_magmoms();
    if params.get("magmom").is_none() && magmoms.iter().any(|&m| m != 0.0) {
        if params.ispin().is_none() {
            push("ispin", "2".to_string());
        }
        push("magmom", compact_magmoms(&magmoms));
    }

    // DFT+U
    if let Some(luj) = params.ldau_luj() {
        let runs = species_runs(sorted);
        let (mut l, mut u, mut j) = (Vec::new(), Vec::new(), Vec::new());
        for (el, _) in &runs {
            match luj.get(el) {
                Some(spec) => {
                    l.push(spec.l.to_string());
                    u.push(format!("{:.3}", spec.u));
                    j.push(format!("{:.3}", spec.j));
                }
                None => {
                    l.push("-1".to_string());
                    u.push("0.000".to_string());
                    j.push("0.000".to_string());
                }
            }
        }
        if params.get("ldau").is_none() {
            push("ldau", ".TRUE.".to_string());
        }
        push("ldaul", l.join(" "));
        push("ldauu", u.join(" "));
        push("ldauj", j.join(" "));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// 写出 INCAR 文件
pub fn write_incar(path: &Path, params: &VaspParams, sorted: &Structure) -> Result<()> {
    fs::write(path, to_incar_string(params, sorted)).map_err(|e| VaspError::write(path, e))
}

/// 解析 Fortran 风格的浮点数（支持 `1.0d-5`）
fn parse_fortran_f64(s: &str) -> Option<f64> {
    s.replace(['d', 'D'], "e").parse().ok()
}

fn parse_fortran_bool(s: &str) -> Option<bool> {
    match s.trim_matches('.').to_uppercase().as_str() {
        "TRUE" | "T" => Some(true),
        "FALSE" | "F" => Some(false),
        _ => None,
    }
}

/// 展开 `n*value` 形式的列表
fn expand_list(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    for token in raw.split_whitespace() {
        match token.split_once('*') {
            Some((n, v)) => match n.parse::<usize>() {
                Ok(n) => out.extend(std::iter::repeat(v.to_string()).take(n)),
                Err(_) => out.push(token.to_string()),
            },
            None => out.push(token.to_string()),
        }
    }
    out
}

/// 按类别把原始字符串转成参数值
fn parse_value(category: ParamCategory, raw: &str) -> Option<ParamValue> {
    let first = raw.split_whitespace().next().unwrap_or("");
    let value = match category {
        ParamCategory::FloatParams | ParamCategory::ExpParams => {
            ParamValue::Float(parse_fortran_f64(first)?)
        }
        ParamCategory::StringParams => ParamValue::Str(raw.trim().to_string()),
        ParamCategory::IntParams => ParamValue::Int(first.parse().ok()?),
        ParamCategory::BoolParams => ParamValue::Bool(parse_fortran_bool(first)?),
        ParamCategory::ListIntParams => ParamValue::IntList(
            expand_list(raw)
                .iter()
                .map(|s| s.parse().ok())
                .collect::<Option<Vec<i64>>>()?,
        ),
        ParamCategory::ListFloatParams => ParamValue::FloatList(
            expand_list(raw)
                .iter()
                .map(|s| parse_fortran_f64(s))
                .collect::<Option<Vec<f64>>>()?,
        ),
        ParamCategory::ListBoolParams => ParamValue::BoolList(
            expand_list(raw)
                .iter()
                .map(|s| parse_fortran_bool(s))
                .collect::<Option<Vec<bool>>>()?,
        ),
        ParamCategory::DictParams | ParamCategory::InputParams => return None,
    };
    Some(value)
}

/// 从字符串内容解析 INCAR
pub fn parse_incar_content(content: &str, source: &str) -> Result<VaspParams> {
    let mut params = VaspParams::new();

    for (lineno, line) in content.lines().enumerate() {
        let line = line.split(['#', '!']).next().unwrap_or("");

        // 一行中可以用 ';' 写多个标签
        for statement in line.split(';') {
            let Some((key, raw)) = statement.split_once('=') else {
                continue;
            };
            let key = key.trim().to_lowercase();

            let Some(category) = ParamCategory::of(&key) else {
                debug!("Skipping unknown INCAR tag '{}' in {}", key, source);
                continue;
            };

            let value = parse_value(category, raw).ok_or_else(|| {
                VaspError::parse(
                    "INCAR",
                    source,
                    format!("Invalid value for {} at line {}", key.to_uppercase(), lineno + 1),
                )
            })?;
            params.set(&key, value)?;
        }
    }

    Ok(params)
}

/// 读取 INCAR 文件
pub fn read_incar(path: &Path) -> Result<VaspParams> {
    let content = fs::read_to_string(path).map_err(|e| VaspError::read(path, e))?;
    parse_incar_content(&content, &path.display().to_string())
}
