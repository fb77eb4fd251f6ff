//! # VASP POTCAR 组装与读取
//!
//! 按排序后结构中的元素顺序，从赝势库拼接 POTCAR。
//! 赝势库目录结构：`<pp_path>/<potpaw|potpaw_GGA|potpaw_PBE>/<元素>/POTCAR`。
//!
//! ## 依赖关系
//! - 被 `calculator/` 使用
//! - 使用 `models/params.rs`, `parsers/poscar.rs`

use crate::error::{Result, VaspError};
use crate::models::{Structure, VaspParams};
use crate::parsers::poscar::species_runs;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 赝势类型对应的赝势库子目录
pub fn set_directory(pp_type: &str) -> Option<&'static str> {
    match pp_type.to_uppercase().as_str() {
        "LDA" => Some("potpaw"),
        "PW91" => Some("potpaw_GGA"),
        "PBE" => Some("potpaw_PBE"),
        _ => None,
    }
}

/// 每个元素组对应的 POTCAR 路径
pub fn potcar_paths(pp_root: &Path, params: &VaspParams, sorted: &Structure) -> Result<Vec<PathBuf>> {
    let pp_type = params.pp_type().ok_or_else(|| {
        VaspError::Setup("No xc or pp found, cannot select pseudopotentials".to_string())
    })?;
    let set_dir = set_directory(&pp_type).ok_or_else(|| {
        VaspError::Setup(format!("Unknown pseudopotential type '{}'", pp_type))
    })?;

    Ok(species_runs(sorted)
        .into_iter()
        .map(|(element, _)| pp_root.join(set_dir).join(element).join("POTCAR"))
        .collect())
}

/// 拼接 POTCAR
pub fn write_potcar(
    path: &Path,
    pp_root: &Path,
    params: &VaspParams,
    sorted: &Structure,
) -> Result<()> {
    let mut content = String::new();
    for source in potcar_paths(pp_root, params, sorted)? {
        if !source.is_file() {
            return Err(VaspError::Setup(format!(
                "Could not find POTCAR: {}",
                source.display()
            )));
        }
        debug!("Appending {}", source.display());
        content.push_str(&fs::read_to_string(&source).map_err(|e| VaspError::read(&source, e))?);
    }
    fs::write(path, content).map_err(|e| VaspError::write(path, e))
}

/// POTCAR 中 `TITEL` 行列出的元素
pub fn parse_potcar_species(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|line| line.contains("TITEL"))
        .filter_map(|line| line.split_whitespace().nth(3))
        .map(|tok| tok.split('_').next().unwrap_or(tok).to_string())
        .collect()
}

/// 由 `LEXCH` 标签推断赝势类型
pub fn parse_potcar_xc(content: &str) -> Option<&'static str> {
    let flag = content
        .lines()
        .find(|line| line.contains("LEXCH"))
        .and_then(|line| line.split_whitespace().nth(2))?;
    match flag.to_uppercase().as_str() {
        "PE" => Some("PBE"),
        "91" => Some("PW91"),
        "CA" => Some("LDA"),
        _ => None,
    }
}

/// 读取已有的 POTCAR，返回 (元素列表, 赝势类型)
pub fn read_potcar(path: &Path) -> Result<(Vec<String>, Option<&'static str>)> {
    let content = fs::read_to_string(path).map_err(|e| VaspError::read(path, e))?;
    Ok((parse_potcar_species(&content), parse_potcar_xc(&content)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Atom, Lattice};

    fn make_library(root: &Path, elements: &[&str]) {
        for el in elements {
            let dir = root.join("potpaw_PBE").join(el);
            fs::create_dir_all(&dir).unwrap();
            fs::write(
                dir.join("POTCAR"),
                format!("  PAW_PBE {el} 06Sep2000\n   TITEL  = PAW_PBE {el} 06Sep2000\n"),
            )
            .unwrap();
        }
    }

    fn sorted_structure() -> Structure {
        Structure::new(
            Lattice::cubic(4.0),
            vec![
                Atom::new("Fe", [0.0; 3]),
                Atom::new("Fe", [2.0; 3]),
                Atom::new("O", [1.0; 3]),
            ],
        )
    }

    #[test]
    fn test_set_directory() {
        assert_eq!(set_directory("lda"), Some("potpaw"));
        assert_eq!(set_directory("PW91"), Some("potpaw_GGA"));
        assert_eq!(set_directory("PBE"), Some("potpaw_PBE"));
        assert_eq!(set_directory("HSE"), None);
    }

    #[test]
    fn test_write_potcar_in_species_order() {
        let lib = tempfile::tempdir().unwrap();
        make_library(lib.path(), &["Fe", "O"]);
        let out = tempfile::tempdir().unwrap();
        let path = out.path().join("POTCAR");

        let mut params = VaspParams::new();
        params.set_xc("PBE").unwrap();
        write_potcar(&path, lib.path(), &params, &sorted_structure()).unwrap();

        let (species, _) = read_potcar(&path).unwrap();
        assert_eq!(species, vec!["Fe", "O"]);
    }

    #[test]
    fn test_missing_potcar_is_setup_error() {
        let lib = tempfile::tempdir().unwrap();
        make_library(lib.path(), &["Fe"]);
        let out = tempfile::tempdir().unwrap();

        let mut params = VaspParams::new();
        params.set("pp", "PBE").unwrap();
        let result = write_potcar(
            &out.path().join("POTCAR"),
            lib.path(),
            &params,
            &sorted_structure(),
        );
        assert!(matches!(result, Err(VaspError::Setup(_))));
    }

    #[test]
    fn test_potcar_xc_flag() {
        assert_eq!(parse_potcar_xc("   LEXCH  = PE    exchange correlation"), Some("PBE"));
        assert_eq!(parse_potcar_xc("   LEXCH  = CA"), Some("LDA"));
        assert_eq!(parse_potcar_xc("   TITEL  = PAW Fe"), None);
    }

    #[test]
    fn test_no_xc_is_setup_error() {
        let result = potcar_paths(Path::new("/pp"), &VaspParams::new(), &sorted_structure());
        assert!(matches!(result, Err(VaspError::Setup(_))));
    }
}
