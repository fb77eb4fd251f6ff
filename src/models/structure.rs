//! # 晶体结构数据模型
//!
//! 调用方持有的原子结构：原子（元素、笛卡尔坐标、初始磁矩）、晶胞与周期性边界。
//! 计算器在每次赋值后保存一份私有拷贝。
//!
//! ## 依赖关系
//! - 被 `parsers/poscar.rs`, `calculator/` 使用
//! - 无外部模块依赖

use crate::error::{Result, VaspError};
use serde::{Deserialize, Serialize};

/// 晶格向量矩阵的秩判定阈值
const RANK_TOLERANCE: f64 = 1e-10;

/// 晶格参数表示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    /// 晶格向量矩阵 (3x3)，行向量表示 a, b, c
    /// [[a1, a2, a3], [b1, b2, b3], [c1, c2, c3]]
    pub matrix: [[f64; 3]; 3],
}

impl Lattice {
    /// 从晶格参数 (a, b, c, alpha, beta, gamma) 创建晶格
    /// 角度单位：度
    pub fn from_parameters(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        let cos_alpha = alpha.to_radians().cos();
        let cos_beta = beta.to_radians().cos();
        let cos_gamma = gamma.to_radians().cos();
        let sin_gamma = gamma.to_radians().sin();

        let c1 = c * cos_beta;
        let c2 = c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let c3 = (c * c - c1 * c1 - c2 * c2).sqrt();

        Lattice {
            matrix: [
                [a, 0.0, 0.0],
                [b * cos_gamma, b * sin_gamma, 0.0],
                [c1, c2, c3],
            ],
        }
    }

    /// 从晶格向量矩阵创建
    pub fn from_vectors(matrix: [[f64; 3]; 3]) -> Self {
        Lattice { matrix }
    }

    /// 立方晶胞
    pub fn cubic(a: f64) -> Self {
        Lattice::from_vectors([[a, 0.0, 0.0], [0.0, a, 0.0], [0.0, 0.0, a]])
    }

    /// 计算晶格体积（带符号的行列式）
    pub fn volume(&self) -> f64 {
        let [a, b, c] = self.matrix;
        a[0] * (b[1] * c[2] - b[2] * c[1]) - a[1] * (b[0] * c[2] - b[2] * c[0])
            + a[2] * (b[0] * c[1] - b[1] * c[0])
    }

    /// 晶格向量矩阵的秩
    ///
    /// 零向量或共面向量会使秩小于 3，VASP 无法处理这样的晶胞。
    pub fn rank(&self) -> usize {
        let nonzero: Vec<[f64; 3]> = self
            .matrix
            .iter()
            .copied()
            .filter(|v| norm(*v) > RANK_TOLERANCE)
            .collect();

        match nonzero.len() {
            0 => 0,
            1 => 1,
            2 => {
                if norm(cross(nonzero[0], nonzero[1])) > RANK_TOLERANCE {
                    2
                } else {
                    1
                }
            }
            _ => {
                if self.volume().abs() > RANK_TOLERANCE {
                    3
                } else if norm(cross(nonzero[0], nonzero[1])) > RANK_TOLERANCE
                    || norm(cross(nonzero[0], nonzero[2])) > RANK_TOLERANCE
                    || norm(cross(nonzero[1], nonzero[2])) > RANK_TOLERANCE
                {
                    2
                } else {
                    1
                }
            }
        }
    }

    /// 分数坐标转笛卡尔坐标
    pub fn frac_to_cart(&self, frac: [f64; 3]) -> [f64; 3] {
        let m = self.matrix;
        [
            frac[0] * m[0][0] + frac[1] * m[1][0] + frac[2] * m[2][0],
            frac[0] * m[0][1] + frac[1] * m[1][1] + frac[2] * m[2][1],
            frac[0] * m[0][2] + frac[1] * m[1][2] + frac[2] * m[2][2],
        ]
    }
}

fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// 原子信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// 元素符号
    pub element: String,

    /// 笛卡尔坐标 [x, y, z] (Å)
    pub position: [f64; 3],

    /// 初始磁矩 (μB)
    #[serde(default)]
    pub magmom: f64,
}

impl Atom {
    pub fn new(element: impl Into<String>, position: [f64; 3]) -> Self {
        Atom {
            element: element.into(),
            position,
            magmom: 0.0,
        }
    }

    pub fn with_magmom(mut self, magmom: f64) -> Self {
        self.magmom = magmom;
        self
    }
}

/// 原子结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    /// 晶格
    pub lattice: Lattice,

    /// 原子列表（调用方顺序）
    pub atoms: Vec<Atom>,

    /// 三个方向上的周期性边界条件
    pub pbc: [bool; 3],
}

impl Structure {
    /// 创建全周期结构
    pub fn new(lattice: Lattice, atoms: Vec<Atom>) -> Self {
        Structure {
            lattice,
            atoms,
            pbc: [true; 3],
        }
    }

    /// 从分数坐标创建
    pub fn from_fractional(lattice: Lattice, sites: Vec<(String, [f64; 3])>) -> Self {
        let atoms = sites
            .into_iter()
            .map(|(el, frac)| Atom::new(el, lattice.frac_to_cart(frac)))
            .collect();
        Structure::new(lattice, atoms)
    }

    pub fn with_pbc(mut self, pbc: [bool; 3]) -> Self {
        self.pbc = pbc;
        self
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// 元素符号列表（调用方顺序）
    pub fn symbols(&self) -> Vec<&str> {
        self.atoms.iter().map(|a| a.element.as_str()).collect()
    }

    /// 笛卡尔坐标列表
    pub fn positions(&self) -> Vec<[f64; 3]> {
        self.atoms.iter().map(|a| a.position).collect()
    }

    /// 初始磁矩列表
    pub fn initial_magmoms(&self) -> Vec<f64> {
        self.atoms.iter().map(|a| a.magmom).collect()
    }

    /// 按索引重排原子，`order[j]` 为新列表第 j 个原子在原列表中的位置
    pub fn permuted(&self, order: &[usize]) -> Structure {
        Structure {
            lattice: self.lattice.clone(),
            atoms: order.iter().map(|&i| self.atoms[i].clone()).collect(),
            pbc: self.pbc,
        }
    }

    /// 计算化学式（元素按首次出现顺序）
    pub fn formula(&self) -> String {
        let mut counts: Vec<(&str, usize)> = Vec::new();

        for atom in &self.atoms {
            match counts.iter_mut().find(|(el, _)| *el == atom.element) {
                Some((_, n)) => *n += 1,
                None => counts.push((atom.element.as_str(), 1)),
            }
        }

        counts
            .into_iter()
            .map(|(el, count)| {
                if count == 1 {
                    el.to_string()
                } else {
                    format!("{}{}", el, count)
                }
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// 检查结构是否能交给 VASP 计算
    ///
    /// 晶胞必须是满秩的，并且三个方向都必须是周期性的。
    pub fn check(&self) -> Result<()> {
        if self.lattice.rank() < 3 {
            return Err(VaspError::Setup(
                "The lattice vectors are zero! This is the default value - please specify a unit cell."
                    .to_string(),
            ));
        }
        if !self.pbc.iter().all(|&p| p) {
            return Err(VaspError::Setup(
                "Vasp cannot handle non-periodic boundaries. Please enable all PBC.".to_string(),
            ));
        }
        if self.atoms.is_empty() {
            return Err(VaspError::Setup("The structure contains no atoms".to_string()));
        }
        Ok(())
    }
}
