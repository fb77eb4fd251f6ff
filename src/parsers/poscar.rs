//! # VASP POSCAR 格式解析器
//!
//! 解析/写出 VASP POSCAR/CONTCAR 文件格式。
//!
//! ## POSCAR 格式说明
//! ```text
//! Comment line (structure name)
//! 1.0                    # scaling factor
//! a1 a2 a3               # lattice vector a
//! b1 b2 b3               # lattice vector b
//! c1 c2 c3               # lattice vector c
//! Element1 Element2 ...  # element symbols (VASP 5+)
//! n1 n2 ...              # number of atoms per element
//! Selective dynamics     # optional
//! Direct/Cartesian       # coordinate type
//! x1 y1 z1               # atom positions
//! ...
//! ```
//!
//! 写出时原子按传入结构的顺序逐段分组（连续的同种元素合并为一段），
//! 因此调用方需要先按排序索引重排结构。
//!
//! ## 依赖关系
//! - 被 `calculator/` 使用
//! - 使用 `models/structure.rs`

use crate::error::{Result, VaspError};
use crate::models::{Atom, Lattice, Structure};
use std::fs;
use std::path::Path;

/// 解析 POSCAR/CONTCAR 文件
///
/// `species_hint` 用于 VASP 4 格式（没有元素行）时给各段原子命名。
pub fn parse_poscar_file(path: &Path, species_hint: Option<&[String]>) -> Result<Structure> {
    let content = fs::read_to_string(path).map_err(|e| VaspError::read(path, e))?;

    parse_poscar_content(&content, &path.display().to_string(), species_hint)
}

/// 从字符串内容解析 POSCAR 格式
pub fn parse_poscar_content(
    content: &str,
    source: &str,
    species_hint: Option<&[String]>,
) -> Result<Structure> {
    let lines: Vec<&str> = content.lines().collect();
    let fail = |reason: String| VaspError::parse("poscar", source, reason);

    if lines.len() < 8 {
        return Err(fail("File too short".to_string()));
    }

    // Line 1: Scaling factor
    let scale: f64 = lines[1]
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| fail("Invalid scaling factor at line 2".to_string()))?;

    // Lines 2-4: Lattice vectors
    let mut matrix = [[0.0; 3]; 3];
    for i in 0..3 {
        let parts: Vec<f64> = lines[2 + i]
            .split_whitespace()
            .take(3)
            .filter_map(|s| s.parse().ok())
            .collect();
        if parts.len() < 3 {
            return Err(fail(format!("Invalid lattice vector at line {}", 3 + i)));
        }
        matrix[i] = [parts[0], parts[1], parts[2]];
    }

    // 负的缩放因子表示目标体积
    let factor = if scale < 0.0 {
        let volume = Lattice::from_vectors(matrix).volume().abs();
        (-scale / volume).cbrt()
    } else {
        scale
    };
    for row in matrix.iter_mut() {
        for x in row.iter_mut() {
            *x *= factor;
        }
    }
    let lattice = Lattice::from_vectors(matrix);

    // Line 5: Element symbols (VASP 5+) or atom counts (VASP 4)
    let line5_parts: Vec<&str> = lines[5].split_whitespace().collect();
    if line5_parts.is_empty() {
        return Err(fail("Missing species/count line".to_string()));
    }

    let (elements, counts, atom_line_start) = if line5_parts[0].parse::<usize>().is_ok() {
        // VASP 4 format: no element line, only counts
        let counts: Vec<usize> = line5_parts.iter().filter_map(|s| s.parse().ok()).collect();
        let elements: Vec<String> = match species_hint {
            Some(hint) if hint.len() == counts.len() => hint.to_vec(),
            _ => (0..counts.len()).map(|i| format!("X{}", i + 1)).collect(),
        };
        (elements, counts, 6)
    } else {
        // VASP 5+ format: element symbols on line 5, counts on line 6
        // 新版 VASP 可能写出 "Fe_pv/xxxx" 这样的 POTCAR 标识
        let elements: Vec<String> = line5_parts
            .iter()
            .map(|s| s.split(['_', '/']).next().unwrap_or(s).to_string())
            .collect();
        let counts: Vec<usize> = lines[6]
            .split_whitespace()
            .filter_map(|s| s.parse().ok())
            .collect();
        (elements, counts, 7)
    };

    if elements.len() != counts.len() {
        return Err(fail(format!(
            "{} species but {} counts",
            elements.len(),
            counts.len()
        )));
    }

    // Check for "Selective dynamics" line
    let mut coord_line = atom_line_start;
    if lines.len() > coord_line
        && lines[coord_line]
            .trim()
            .to_lowercase()
            .starts_with('s')
    {
        coord_line += 1;
    }

    // Coordinate type line
    if lines.len() <= coord_line {
        return Err(fail("Missing coordinate type line".to_string()));
    }

    let coord_type = lines[coord_line].trim().to_lowercase();
    let is_cartesian = coord_type.starts_with('c') || coord_type.starts_with('k');

    // Parse atom positions
    let total: usize = counts.iter().sum();
    let mut atoms: Vec<Atom> = Vec::with_capacity(total);
    let mut line_idx = coord_line + 1;

    for (elem, &count) in elements.iter().zip(counts.iter()) {
        for _ in 0..count {
            let parts: Vec<f64> = lines
                .get(line_idx)
                .map(|l| {
                    l.split_whitespace()
                        .take(3)
                        .filter_map(|s| s.parse().ok())
                        .collect()
                })
                .unwrap_or_default();

            if parts.len() < 3 {
                return Err(fail(format!("Invalid position at line {}", line_idx + 1)));
            }

            let position = if is_cartesian {
                [parts[0] * factor, parts[1] * factor, parts[2] * factor]
            } else {
                lattice.frac_to_cart([parts[0], parts[1], parts[2]])
            };
            atoms.push(Atom::new(elem.clone(), position));
            line_idx += 1;
        }
    }

    Ok(Structure::new(lattice, atoms))
}

/// 连续的同种元素段：(元素, 数量)
pub fn species_runs(structure: &Structure) -> Vec<(String, usize)> {
    let mut runs: Vec<(String, usize)> = Vec::new();
    for atom in &structure.atoms {
        match runs.last_mut() {
            Some((el, n)) if *el == atom.element => *n += 1,
            _ => runs.push((atom.element.clone(), 1)),
        }
    }
    runs
}

/// 将结构转换为 POSCAR 格式字符串（VASP 5，笛卡尔坐标）
pub fn to_poscar_string(structure: &Structure, comment: &str) -> String {
    let runs = species_runs(structure);
    let mut result = String::new();

    // Line 0: Comment
    result.push_str(&format!("{}\n", comment));

    // Line 1: Scale
    result.push_str(" 1.0000000000000000\n");

    // Lines 2-4: Lattice
    for row in &structure.lattice.matrix {
        result.push_str(&format!(
            "  {:21.16}  {:21.16}  {:21.16}\n",
            row[0], row[1], row[2]
        ));
    }

    // Line 5: Elements
    let elements: Vec<&str> = runs.iter().map(|(el, _)| el.as_str()).collect();
    result.push_str(&format!("  {}\n", elements.join("  ")));

    // Line 6: Counts
    let counts: Vec<String> = runs.iter().map(|(_, n)| n.to_string()).collect();
    result.push_str(&format!("  {}\n", counts.join("  ")));

    // Coordinate type
    result.push_str("Cartesian\n");

    // Atom positions
    for atom in &structure.atoms {
        let pos = atom.position;
        result.push_str(&format!(
            "  {:21.16}  {:21.16}  {:21.16}\n",
            pos[0], pos[1], pos[2]
        ));
    }

    result
}

/// 写出 POSCAR 文件
pub fn write_poscar(path: &Path, structure: &Structure, comment: &str) -> Result<()> {
    fs::write(path, to_poscar_string(structure, comment)).map_err(|e| VaspError::write(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_poscar_vasp5() {
        let content = r#"NaCl
1.0
5.64 0.0 0.0
0.0 5.64 0.0
0.0 0.0 5.64
Na Cl
4 4
Direct
0.0 0.0 0.0
0.5 0.5 0.0
0.5 0.0 0.5
0.0 0.5 0.5
0.5 0.0 0.0
0.0 0.5 0.0
0.0 0.0 0.5
0.5 0.5 0.5
"#;
        let structure = parse_poscar_content(content, "NaCl", None).unwrap();
        assert_eq!(structure.len(), 8);

        let na_count = structure.atoms.iter().filter(|a| a.element == "Na").count();
        let cl_count = structure.atoms.iter().filter(|a| a.element == "Cl").count();
        assert_eq!(na_count, 4);
        assert_eq!(cl_count, 4);

        // 分数坐标 (0.5, 0.5, 0) 对应笛卡尔 (2.82, 2.82, 0)
        let p = structure.atoms[1].position;
        assert!((p[0] - 2.82).abs() < 1e-10);
        assert!((p[1] - 2.82).abs() < 1e-10);
    }

    #[test]
    fn test_parse_poscar_with_scale() {
        let content = r#"Si
2.0
2.0 0.0 0.0
0.0 2.0 0.0
0.0 0.0 2.0
Si
2
Direct
0.0 0.0 0.0
0.5 0.5 0.5
"#;
        let structure = parse_poscar_content(content, "Si", None).unwrap();

        // 2.0 * 2.0 = 4.0
        assert!((structure.lattice.matrix[0][0] - 4.0).abs() < 1e-12);
        assert!((structure.atoms[1].position[2] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_poscar_selective_dynamics() {
        let content = r#"Fe with selective
1.0
2.87 0.0 0.0
0.0 2.87 0.0
0.0 0.0 2.87
Fe
2
Selective dynamics
Direct
0.0 0.0 0.0 T T T
0.5 0.5 0.5 F F F
"#;
        let structure = parse_poscar_content(content, "Fe", None).unwrap();
        assert_eq!(structure.len(), 2);
    }

    #[test]
    fn test_parse_poscar_vasp4_uses_hint() {
        let content = r#"old style
1.0
3.0 0.0 0.0
0.0 3.0 0.0
0.0 0.0 3.0
1 2
Cartesian
0.0 0.0 0.0
1.0 1.0 1.0
2.0 2.0 2.0
"#;
        let hint = vec!["Ti".to_string(), "O".to_string()];
        let structure = parse_poscar_content(content, "old", Some(&hint)).unwrap();
        assert_eq!(structure.symbols(), vec!["Ti", "O", "O"]);

        let unnamed = parse_poscar_content(content, "old", None).unwrap();
        assert_eq!(unnamed.symbols(), vec!["X1", "X2", "X2"]);
    }

    #[test]
    fn test_parse_poscar_truncated_positions() {
        let content = "x\n1.0\n3 0 0\n0 3 0\n0 0 3\nFe\n2\nDirect\n0 0 0\n";
        assert!(matches!(
            parse_poscar_content(content, "x", None),
            Err(VaspError::ParseError { .. })
        ));
    }

    #[test]
    fn test_poscar_round_trip() {
        let structure = Structure::new(
            Lattice::cubic(4.0),
            vec![
                Atom::new("Ti", [0.0, 0.0, 0.0]),
                Atom::new("O", [2.0, 2.0, 0.0]),
                Atom::new("O", [2.0, 0.0, 2.0]),
            ],
        );

        let poscar_str = to_poscar_string(&structure, "TiO2");
        let parsed = parse_poscar_content(&poscar_str, "round_trip", None).unwrap();

        assert_eq!(parsed.symbols(), structure.symbols());
        for (a, b) in parsed.atoms.iter().zip(structure.atoms.iter()) {
            for k in 0..3 {
                assert!((a.position[k] - b.position[k]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_species_runs_keep_order() {
        let structure = Structure::new(
            Lattice::cubic(4.0),
            vec![
                Atom::new("O", [0.0; 3]),
                Atom::new("O", [1.0; 3]),
                Atom::new("Ti", [2.0; 3]),
            ],
        );
        assert_eq!(
            species_runs(&structure),
            vec![("O".to_string(), 2), ("Ti".to_string(), 1)]
        );
    }
}
