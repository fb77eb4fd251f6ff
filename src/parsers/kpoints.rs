//! # VASP KPOINTS / IBZKPT 读写
//!
//! 只支持自动网格（Monkhorst-Pack 或 Gamma 中心）格式的 KPOINTS。
//! IBZKPT 只读取 k 点权重。
//!
//! ## 依赖关系
//! - 被 `calculator/` 使用
//! - 使用 `models/params.rs`

use crate::error::{Result, VaspError};
use crate::models::VaspParams;
use std::fs;
use std::path::Path;

/// 自动 k 点网格
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KpointMesh {
    pub size: [i64; 3],
    pub gamma: bool,
    pub shift: [f64; 3],
}

impl KpointMesh {
    /// 由参数中的 `kpts` 与 `gamma` 得到网格，未设置 `kpts` 时为 1×1×1
    pub fn from_params(params: &VaspParams) -> Self {
        KpointMesh {
            size: params.kpts().unwrap_or([1, 1, 1]),
            gamma: params.gamma().unwrap_or(false),
            shift: [0.0; 3],
        }
    }

    pub fn to_kpoints_string(&self) -> String {
        let style = if self.gamma { "Gamma" } else { "Monkhorst-Pack" };
        format!(
            "KPOINTS created by vaspcalc\n0\n{}\n{} {} {}\n{} {} {}\n",
            style,
            self.size[0],
            self.size[1],
            self.size[2],
            self.shift[0],
            self.shift[1],
            self.shift[2]
        )
    }
}

/// 写出 KPOINTS
///
/// 设置了 `kspacing` 时 VASP 自行生成网格，不写文件，返回 `false`。
pub fn write_kpoints(path: &Path, params: &VaspParams) -> Result<bool> {
    if params.get("kspacing").is_some() {
        return Ok(false);
    }
    let mesh = KpointMesh::from_params(params);
    fs::write(path, mesh.to_kpoints_string()).map_err(|e| VaspError::write(path, e))?;
    Ok(true)
}

/// 解析自动网格格式的 KPOINTS
pub fn parse_kpoints_content(content: &str, source: &str) -> Result<KpointMesh> {
    let err = |reason: &str| VaspError::parse("KPOINTS", source, reason);
    let lines: Vec<&str> = content.lines().collect();

    if lines.len() < 4 {
        return Err(err("File too short"));
    }

    let count: i64 = lines[1]
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| err("Invalid k-point count"))?;
    if count != 0 {
        return Err(err("Only automatic k-point meshes are supported"));
    }

    let gamma = match lines[2].trim_start().chars().next() {
        Some('G' | 'g') => true,
        Some('M' | 'm') => false,
        _ => return Err(err("Unknown mesh type")),
    };

    let size: Vec<i64> = lines[3]
        .split_whitespace()
        .take(3)
        .filter_map(|s| s.parse().ok())
        .collect();
    if size.len() != 3 {
        return Err(err("Invalid mesh size"));
    }

    let shift: Vec<f64> = lines
        .get(4)
        .map(|l| {
            l.split_whitespace()
                .take(3)
                .filter_map(|s| s.parse().ok())
                .collect()
        })
        .unwrap_or_default();

    Ok(KpointMesh {
        size: [size[0], size[1], size[2]],
        gamma,
        shift: if shift.len() == 3 {
            [shift[0], shift[1], shift[2]]
        } else {
            [0.0; 3]
        },
    })
}

pub fn read_kpoints(path: &Path) -> Result<KpointMesh> {
    let content = fs::read_to_string(path).map_err(|e| VaspError::read(path, e))?;
    parse_kpoints_content(&content, &path.display().to_string())
}

/// IBZKPT 中归一化后的 k 点权重
///
/// 从第 4 行开始读取，遇到 `Tetrahedra` 行停止。
pub fn parse_kpoint_weights(content: &str, source: &str) -> Result<Vec<f64>> {
    let weights = content
        .lines()
        .skip(3)
        .take_while(|line| line.trim() != "Tetrahedra")
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.split_whitespace().nth(3).and_then(|w| w.parse::<f64>().ok()))
        .collect::<Option<Vec<f64>>>()
        .ok_or_else(|| VaspError::parse("IBZKPT", source, "Invalid k-point weight"))?;

    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(VaspError::parse("IBZKPT", source, "No k-point weights"));
    }
    Ok(weights.into_iter().map(|w| w / total).collect())
}

pub fn read_kpoint_weights(path: &Path) -> Result<Vec<f64>> {
    let content = fs::read_to_string(path).map_err(|e| VaspError::read(path, e))?;
    parse_kpoint_weights(&content, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_from_params() {
        let mut params = VaspParams::new();
        params.set_kpts([4, 4, 2]).unwrap();
        params.set("gamma", true).unwrap();

        let text = KpointMesh::from_params(&params).to_kpoints_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "0");
        assert_eq!(lines[2], "Gamma");
        assert_eq!(lines[3], "4 4 2");
    }

    #[test]
    fn test_written_kpoints_parse_back() {
        let mesh = KpointMesh {
            size: [3, 3, 1],
            gamma: false,
            shift: [0.0; 3],
        };
        let parsed = parse_kpoints_content(&mesh.to_kpoints_string(), "KPOINTS").unwrap();
        assert_eq!(parsed, mesh);
    }

    #[test]
    fn test_kspacing_skips_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("KPOINTS");
        let mut params = VaspParams::new();
        params.set("kspacing", 0.25).unwrap();

        assert!(!write_kpoints(&path, &params).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_explicit_list_rejected() {
        let content = "comment\n2\nReciprocal\n0 0 0 1\n0.5 0 0 1\n";
        assert!(parse_kpoints_content(content, "KPOINTS").is_err());
    }

    #[test]
    fn test_ibzkpt_weights() {
        let content = "Automatically generated mesh\n       3\n\
                       Reciprocal lattice\n\
                       0.0 0.0 0.0 1\n\
                       0.5 0.0 0.0 2\n\
                       0.5 0.5 0.0 1\n\
                       Tetrahedra\n\
                       6 0.0417\n";
        let weights = parse_kpoint_weights(content, "IBZKPT").unwrap();
        assert_eq!(weights, vec![0.25, 0.5, 0.25]);
    }
}
