//! # vasprun.xml 解析器
//!
//! 使用 `roxmltree` 读取 vasprun.xml，提取最后一个离子步的
//! 能量、受力、应力，以及费米能级、k 点和本征值。
//!
//! 文件缺失或 XML 不完整（计算未结束时常见）统一报告为 `ReadError`。
//! 按原子索引的数组保持 VASP 内部顺序。
//!
//! ## 依赖关系
//! - 被 `calculator/` 使用
//! - 使用 `models/structure.rs`, `models/results.rs`

use crate::error::{Result, VaspError};
use crate::models::results::GPA;
use crate::models::{Lattice, Structure};
use roxmltree::{Document, Node};
use std::f64::consts::PI;
use std::fs;
use std::path::Path;

/// 态密度的默认高斯展宽 (eV)
pub const DOS_WIDTH: f64 = 0.1;

/// 态密度的默认能量点数
pub const DOS_POINTS: usize = 401;

/// vasprun.xml 的内容
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VasprunData {
    pub version: Option<String>,

    /// 原子元素符号（VASP 顺序）
    pub symbols: Vec<String>,

    /// 1 或 2
    pub ispin: usize,

    /// 最终结构（VASP 顺序）
    pub structure: Option<Structure>,

    pub free_energy: Option<f64>,
    pub energy: Option<f64>,

    /// 受力 (eV/Å)
    pub forces: Option<Vec<[f64; 3]>>,

    /// 应力 (eV/Å³, Voigt 顺序)
    pub stress: Option<[f64; 6]>,

    pub efermi: Option<f64>,

    /// 不可约布里渊区 k 点（分数坐标）
    pub kpoints: Vec<[f64; 3]>,
    pub kpoint_weights: Vec<f64>,

    /// 本征值 `[spin][kpoint][band]`
    pub eigenvalues: Vec<Vec<Vec<f64>>>,

    /// 占据数 `[spin][kpoint][band]`
    pub occupations: Vec<Vec<Vec<f64>>>,
}

impl VasprunData {
    pub fn number_of_spins(&self) -> usize {
        self.ispin
    }

    pub fn spin_polarized(&self) -> bool {
        self.ispin == 2
    }

    pub fn number_of_bands(&self) -> Option<usize> {
        self.eigenvalues.first()?.first().map(Vec::len)
    }

    pub fn eigenvalues(&self, kpt: usize, spin: usize) -> Option<&[f64]> {
        self.eigenvalues.get(spin)?.get(kpt).map(Vec::as_slice)
    }

    pub fn occupation_numbers(&self, kpt: usize, spin: usize) -> Option<&[f64]> {
        self.occupations.get(spin)?.get(kpt).map(Vec::as_slice)
    }

    /// 某个自旋通道的 (HOMO, LUMO)，以费米能级划分
    pub fn homo_lumo_by_spin(&self, spin: usize) -> Option<(f64, f64)> {
        let efermi = self.efermi?;
        let mut homo = f64::NEG_INFINITY;
        let mut lumo = f64::INFINITY;
        for eigs in self.eigenvalues.get(spin)? {
            for &e in eigs {
                if e < efermi {
                    homo = homo.max(e);
                } else if e > efermi {
                    lumo = lumo.min(e);
                }
            }
        }
        (homo.is_finite() && lumo.is_finite()).then_some((homo, lumo))
    }

    /// 高斯展宽的总态密度，返回 (能量, DOS)
    ///
    /// 能量以费米能级为零点，范围为全部本征值两端各外延 5 个展宽。
    /// `spin` 为 `None` 时对自旋求和，非自旋极化时乘以 2。
    pub fn total_dos(
        &self,
        spin: Option<usize>,
        width: f64,
        npts: usize,
    ) -> Option<(Vec<f64>, Vec<f64>)> {
        if width <= 0.0 || npts < 2 {
            return None;
        }
        let efermi = self.efermi.unwrap_or(0.0);
        let spins: Vec<usize> = match spin {
            Some(s) => vec![s],
            None => (0..self.eigenvalues.len()).collect(),
        };

        if spins.iter().any(|&s| s >= self.eigenvalues.len()) {
            return None;
        }

        let mut emin = f64::INFINITY;
        let mut emax = f64::NEG_INFINITY;
        for e in self.eigenvalues.iter().flatten().flatten() {
            emin = emin.min(e - efermi);
            emax = emax.max(e - efermi);
        }
        if !emin.is_finite() {
            return None;
        }
        emin -= 5.0 * width;
        emax += 5.0 * width;

        let step = (emax - emin) / (npts - 1) as f64;
        let energies: Vec<f64> = (0..npts).map(|i| emin + step * i as f64).collect();
        let factor = if spin.is_none() && self.eigenvalues.len() == 1 { 2.0 } else { 1.0 };
        let norm = factor / (PI.sqrt() * width);

        let mut dos = vec![0.0; npts];
        for &s in &spins {
            let kpts = &self.eigenvalues[s];
            for (k, eigs) in kpts.iter().enumerate() {
                let weight = self
                    .kpoint_weights
                    .get(k)
                    .copied()
                    .unwrap_or(1.0 / kpts.len() as f64);
                for &e in eigs {
                    let center = e - efermi;
                    for (d, x) in dos.iter_mut().zip(&energies) {
                        *d += weight * norm * (-((x - center) / width).powi(2)).exp();
                    }
                }
            }
        }
        Some((energies, dos))
    }

    /// 所有自旋通道的 (HOMO, LUMO)
    pub fn homo_lumo(&self) -> Option<(f64, f64)> {
        (0..self.ispin)
            .filter_map(|s| self.homo_lumo_by_spin(s))
            .reduce(|(h1, l1), (h2, l2)| (h1.max(h2), l1.min(l2)))
    }
}

// ─────────────────────────────────────────────────────────────
// XML 辅助函数
// ─────────────────────────────────────────────────────────────

fn child<'a, 'i>(node: Node<'a, 'i>, tag: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn children<'a, 'i: 'a>(node: Node<'a, 'i>, tag: &'a str) -> impl Iterator<Item = Node<'a, 'i>> + 'a {
    node.children().filter(move |n| n.has_tag_name(tag))
}

fn named_child<'a, 'i>(node: Node<'a, 'i>, tag: &str, name: &str) -> Option<Node<'a, 'i>> {
    node.children()
        .find(|n| n.has_tag_name(tag) && n.attribute("name") == Some(name))
}

fn node_f64(node: Node) -> Option<f64> {
    node.text()?.trim().parse().ok()
}

fn node_floats(node: Node) -> Option<Vec<f64>> {
    node.text()?
        .split_whitespace()
        .map(|s| s.parse().ok())
        .collect()
}

fn vec3(values: &[f64]) -> Option<[f64; 3]> {
    Some([*values.first()?, *values.get(1)?, *values.get(2)?])
}

/// `<varray name="...">` 中的所有 `<v>` 行
fn varray(node: Node, name: &str) -> Option<Vec<Vec<f64>>> {
    children(named_child(node, "varray", name)?, "v")
        .map(node_floats)
        .collect()
}

fn varray3(node: Node, name: &str) -> Option<Vec<[f64; 3]>> {
    varray(node, name)?.iter().map(|v| vec3(v)).collect()
}

// ─────────────────────────────────────────────────────────────
// 各部分
// ─────────────────────────────────────────────────────────────

fn read_symbols(root: Node) -> Vec<String> {
    let Some(array) = child(root, "atominfo").and_then(|a| named_child(a, "array", "atoms")) else {
        return Vec::new();
    };
    let Some(set) = child(array, "set") else {
        return Vec::new();
    };
    children(set, "rc")
        .filter_map(|rc| child(rc, "c")?.text().map(|t| t.trim().to_string()))
        .collect()
}

fn read_ispin(root: Node) -> usize {
    root.descendants()
        .find(|n| n.has_tag_name("i") && n.attribute("name") == Some("ISPIN"))
        .and_then(|n| n.text()?.trim().parse().ok())
        .unwrap_or(1)
}

fn read_structure(node: Node, symbols: &[String]) -> Option<Structure> {
    let basis = varray3(child(node, "crystal")?, "basis")?;
    let lattice = Lattice::from_vectors([*basis.first()?, *basis.get(1)?, *basis.get(2)?]);
    let positions = varray3(node, "positions")?;
    if positions.len() != symbols.len() {
        return None;
    }
    let sites = symbols.iter().cloned().zip(positions).collect();
    Some(Structure::from_fractional(lattice, sites))
}

fn read_stress(calc: Node) -> Option<[f64; 6]> {
    let rows = varray3(calc, "stress")?;
    if rows.len() != 3 {
        return None;
    }
    let flat: Vec<f64> = rows.iter().flatten().map(|s| -0.1 * GPA * s).collect();
    Some([0, 4, 8, 5, 2, 1].map(|i| flat[i]))
}

fn read_kpoints(root: Node) -> (Vec<[f64; 3]>, Vec<f64>) {
    let Some(kpoints) = child(root, "kpoints") else {
        return (Vec::new(), Vec::new());
    };
    let list = varray3(kpoints, "kpointlist").unwrap_or_default();
    let weights = varray(kpoints, "weights")
        .map(|rows| rows.into_iter().filter_map(|r| r.first().copied()).collect())
        .unwrap_or_default();
    (list, weights)
}

type SpinKpointBands = Vec<Vec<Vec<f64>>>;

/// `<eigenvalues>` 中每行 `<r>` 为 (本征值, 占据数)
fn read_eigenvalues(calc: Node) -> Option<(SpinKpointBands, SpinKpointBands)> {
    let outer = child(child(child(calc, "eigenvalues")?, "array")?, "set")?;
    let mut eigenvalues = Vec::new();
    let mut occupations = Vec::new();

    for spin in children(outer, "set") {
        let mut spin_eigs = Vec::new();
        let mut spin_occs = Vec::new();
        for kpt in children(spin, "set") {
            let rows: Vec<Vec<f64>> = children(kpt, "r").map(node_floats).collect::<Option<_>>()?;
            spin_eigs.push(rows.iter().filter_map(|r| r.first().copied()).collect());
            spin_occs.push(rows.iter().filter_map(|r| r.get(1).copied()).collect());
        }
        eigenvalues.push(spin_eigs);
        occupations.push(spin_occs);
    }
    Some((eigenvalues, occupations))
}

/// 从 XML 文本解析
pub fn parse_vasprun(content: &str, source: &str) -> Result<VasprunData> {
    let doc = Document::parse(content).map_err(|e| VaspError::ReadError {
        path: source.to_string(),
        reason: format!(
            "Incomplete vasprun.xml, the calculation may not have finished ({})",
            e
        ),
    })?;
    let root = doc.root_element();

    let symbols = read_symbols(root);
    let (kpoints, kpoint_weights) = read_kpoints(root);
    let mut data = VasprunData {
        version: child(root, "generator")
            .and_then(|g| named_child(g, "i", "version"))
            .and_then(|n| n.text())
            .map(|t| t.trim().to_string()),
        ispin: read_ispin(root),
        kpoints,
        kpoint_weights,
        ..Default::default()
    };

    let calculations: Vec<Node> = children(root, "calculation").collect();
    let Some(last) = calculations.last().copied() else {
        return Err(VaspError::ReadError {
            path: source.to_string(),
            reason: "No ionic step found, the calculation may not have finished".to_string(),
        });
    };

    if let Some(energy) = child(last, "energy") {
        data.free_energy = named_child(energy, "i", "e_fr_energy").and_then(node_f64);
        data.energy = named_child(energy, "i", "e_0_energy").and_then(node_f64);
    }
    data.forces = varray3(last, "forces");
    data.stress = read_stress(last);

    data.structure = named_child(root, "structure", "finalpos")
        .or_else(|| child(last, "structure"))
        .and_then(|s| read_structure(s, &symbols));

    // 分子动力学等情况下最后一步可能没有 DOS 和本征值
    for calc in calculations.iter().rev() {
        if data.efermi.is_none() {
            data.efermi = child(*calc, "dos")
                .and_then(|d| named_child(d, "i", "efermi"))
                .and_then(node_f64);
        }
        if data.eigenvalues.is_empty() {
            if let Some((eigs, occs)) = read_eigenvalues(*calc) {
                data.eigenvalues = eigs;
                data.occupations = occs;
            }
        }
    }

    data.symbols = symbols;
    Ok(data)
}

/// 读取 vasprun.xml
pub fn read_vasprun(path: &Path) -> Result<VasprunData> {
    if !path.is_file() {
        return Err(VaspError::ReadError {
            path: path.display().to_string(),
            reason: "File not found, the calculation may not have finished".to_string(),
        });
    }
    let content = fs::read_to_string(path).map_err(|e| VaspError::read(path, e))?;
    parse_vasprun(&content, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 两个原子、自旋极化、两个 k 点的最小 vasprun.xml
    const VASPRUN: &str = r#"<?xml version="1.0"?>
<modeling>
 <generator>
  <i name="program" type="string">vasp </i>
  <i name="version" type="string">5.4.4.18Apr17-6-g9f103f2a35  </i>
 </generator>
 <kpoints>
  <varray name="kpointlist" >
   <v>       0.00000000       0.00000000       0.00000000 </v>
   <v>       0.50000000       0.00000000       0.00000000 </v>
  </varray>
  <varray name="weights" >
   <v>       0.25000000 </v>
   <v>       0.75000000 </v>
  </varray>
 </kpoints>
 <parameters>
  <separator name="electronic" >
   <separator name="electronic spin" >
    <i type="int" name="ISPIN">     2</i>
   </separator>
  </separator>
 </parameters>
 <atominfo>
  <atoms>       2 </atoms>
  <array name="atoms" >
   <set>
    <rc><c>Fe</c><c>   1</c></rc>
    <rc><c>O </c><c>   2</c></rc>
   </set>
  </array>
 </atominfo>
 <calculation>
  <structure>
   <crystal>
    <varray name="basis" >
     <v>       4.00000000       0.00000000       0.00000000 </v>
     <v>       0.00000000       4.00000000       0.00000000 </v>
     <v>       0.00000000       0.00000000       4.00000000 </v>
    </varray>
   </crystal>
   <varray name="positions" >
    <v>       0.00000000       0.00000000       0.00000000 </v>
    <v>       0.50000000       0.50000000       0.50000000 </v>
   </varray>
  </structure>
  <varray name="forces" >
   <v>       0.10000000      -0.20000000       0.30000000 </v>
   <v>      -0.10000000       0.20000000      -0.30000000 </v>
  </varray>
  <varray name="stress" >
   <v>      10.00000000       1.00000000       2.00000000 </v>
   <v>       1.00000000      20.00000000       3.00000000 </v>
   <v>       2.00000000       3.00000000      30.00000000 </v>
  </varray>
  <energy>
   <i name="e_fr_energy">    -16.12345678 </i>
   <i name="e_wo_entrp">    -16.10000000 </i>
   <i name="e_0_energy">    -16.11111111 </i>
  </energy>
  <eigenvalues>
   <array>
    <set>
     <set comment="spin 1">
      <set comment="kpoint 1">
       <r>   -5.0000    1.0000 </r>
       <r>    2.0000    0.0000 </r>
      </set>
      <set comment="kpoint 2">
       <r>   -4.0000    1.0000 </r>
       <r>    3.0000    0.0000 </r>
      </set>
     </set>
     <set comment="spin 2">
      <set comment="kpoint 1">
       <r>   -4.5000    1.0000 </r>
       <r>    1.5000    0.0000 </r>
      </set>
      <set comment="kpoint 2">
       <r>   -3.5000    1.0000 </r>
       <r>    2.5000    0.0000 </r>
      </set>
     </set>
    </set>
   </array>
  </eigenvalues>
  <dos>
   <i name="efermi">      0.50000000 </i>
  </dos>
 </calculation>
 <structure name="finalpos" >
  <crystal>
   <varray name="basis" >
    <v>       4.00000000       0.00000000       0.00000000 </v>
    <v>       0.00000000       4.00000000       0.00000000 </v>
    <v>       0.00000000       0.00000000       4.00000000 </v>
   </varray>
  </crystal>
  <varray name="positions" >
   <v>       0.00000000       0.00000000       0.00000000 </v>
   <v>       0.25000000       0.25000000       0.25000000 </v>
  </varray>
 </structure>
</modeling>
"#;

    #[test]
    fn test_parse_vasprun() {
        let data = parse_vasprun(VASPRUN, "vasprun.xml").unwrap();

        assert_eq!(data.version.as_deref(), Some("5.4.4.18Apr17-6-g9f103f2a35"));
        assert_eq!(data.symbols, vec!["Fe", "O"]);
        assert!(data.spin_polarized());
        assert_eq!(data.free_energy, Some(-16.12345678));
        assert_eq!(data.energy, Some(-16.11111111));
        assert_eq!(
            data.forces,
            Some(vec![[0.1, -0.2, 0.3], [-0.1, 0.2, -0.3]])
        );
        assert_eq!(data.efermi, Some(0.5));
        assert_eq!(data.kpoint_weights, vec![0.25, 0.75]);
    }

    #[test]
    fn test_stress_voigt_order() {
        let data = parse_vasprun(VASPRUN, "vasprun.xml").unwrap();
        let stress = data.stress.unwrap();
        let expected = [10.0, 20.0, 30.0, 3.0, 2.0, 1.0].map(|x| -0.1 * GPA * x);
        for (a, b) in stress.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_final_structure() {
        let data = parse_vasprun(VASPRUN, "vasprun.xml").unwrap();
        let structure = data.structure.unwrap();
        assert_eq!(structure.symbols(), vec!["Fe", "O"]);
        let pos = structure.atoms[1].position;
        assert!((pos[0] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_eigenvalues_and_homo_lumo() {
        let data = parse_vasprun(VASPRUN, "vasprun.xml").unwrap();

        assert_eq!(data.number_of_spins(), 2);
        assert_eq!(data.number_of_bands(), Some(2));
        assert_eq!(data.eigenvalues(1, 0), Some(&[-4.0, 3.0][..]));
        assert_eq!(data.occupation_numbers(0, 1), Some(&[1.0, 0.0][..]));
        assert_eq!(data.eigenvalues(5, 0), None);

        assert_eq!(data.homo_lumo_by_spin(0), Some((-4.0, 2.0)));
        assert_eq!(data.homo_lumo(), Some((-3.5, 1.5)));
    }

    #[test]
    fn test_total_dos() {
        let data = parse_vasprun(VASPRUN, "vasprun.xml").unwrap();
        let (energies, up) = data.total_dos(Some(0), DOS_WIDTH, DOS_POINTS).unwrap();
        let (_, down) = data.total_dos(Some(1), DOS_WIDTH, DOS_POINTS).unwrap();
        let (_, total) = data.total_dos(None, DOS_WIDTH, DOS_POINTS).unwrap();

        // 两个自旋的本征值范围 [-5.0, 3.0]，相对费米能级 0.5
        assert_eq!(energies.len(), DOS_POINTS);
        assert!((energies[0] + 6.0).abs() < 1e-10);
        assert!((energies[DOS_POINTS - 1] - 3.0).abs() < 1e-10);

        for i in 0..DOS_POINTS {
            assert!((total[i] - up[i] - down[i]).abs() < 1e-12);
        }

        // 每个自旋通道积分为能带数
        let step = energies[1] - energies[0];
        let states: f64 = up.iter().sum::<f64>() * step;
        assert!((states - 2.0).abs() < 1e-3);

        assert!(data.total_dos(Some(2), DOS_WIDTH, DOS_POINTS).is_none());
    }

    #[test]
    fn test_truncated_xml_is_read_error() {
        let truncated = &VASPRUN[..VASPRUN.len() / 2];
        let result = parse_vasprun(truncated, "vasprun.xml");
        match result {
            Err(VaspError::ReadError { reason, .. }) => assert!(reason.contains("Incomplete")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_vasprun(&dir.path().join("vasprun.xml"));
        assert!(matches!(result, Err(VaspError::ReadError { .. })));
    }
}
