//! # 计算结果数据模型
//!
//! 一次成功的 VASP 计算之后得到的物理量。
//! 所有按原子索引的数组都已按调用方顺序排列。
//!
//! ## 依赖关系
//! - 被 `calculator/` 填充
//! - 被 `calculator/export.rs` 序列化

use serde::{Deserialize, Serialize};

/// 单位换算：1 GPa 对应的 eV/Å³
pub const GPA: f64 = 1.0 / 160.217_662_08;

/// VASP 计算结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalcResults {
    /// 外推到 sigma->0 的能量 (eV)
    pub energy: Option<f64>,

    /// 自由能 TOTEN (eV)
    pub free_energy: Option<f64>,

    /// 原子受力 (eV/Å)，调用方顺序
    pub forces: Option<Vec<[f64; 3]>>,

    /// 应力 (eV/Å³)，Voigt 顺序 xx yy zz yz xz xy
    pub stress: Option<[f64; 6]>,

    /// 偶极矩 (e·Å)
    pub dipole: Option<[f64; 3]>,

    /// 费米能级 (eV)
    pub fermi: Option<f64>,

    /// 总磁矩 (μB)
    pub magmom: Option<f64>,

    /// 原子磁矩 (μB)，调用方顺序
    pub magmoms: Option<Vec<f64>>,

    /// 能带数
    pub nbands: Option<usize>,

    /// 是否收敛
    pub converged: Option<bool>,
}

impl CalcResults {
    pub fn is_empty(&self) -> bool {
        *self == CalcResults::default()
    }

    pub fn clear(&mut self) {
        *self = CalcResults::default();
    }

    /// 用另一份结果中的非空字段覆盖本结果
    pub fn update(&mut self, other: CalcResults) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            energy,
            free_energy,
            forces,
            stress,
            dipole,
            fermi,
            magmom,
            magmoms,
            nbands,
            converged
        );
    }

    /// 已填充的物理量名称
    pub fn available(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let flags = [
            ("energy", self.energy.is_some()),
            ("free_energy", self.free_energy.is_some()),
            ("forces", self.forces.is_some()),
            ("stress", self.stress.is_some()),
            ("dipole", self.dipole.is_some()),
            ("fermi", self.fermi.is_some()),
            ("magmom", self.magmom.is_some()),
            ("magmoms", self.magmoms.is_some()),
            ("nbands", self.nbands.is_some()),
            ("converged", self.converged.is_some()),
        ];
        for (name, present) in flags {
            if present {
                names.push(name);
            }
        }
        names
    }

    /// 最大原子受力模长
    pub fn max_force(&self) -> Option<f64> {
        self.forces.as_ref().and_then(|forces| {
            forces
                .iter()
                .map(|f| (f[0] * f[0] + f[1] * f[1] + f[2] * f[2]).sqrt())
                .fold(None, |acc: Option<f64>, x| Some(acc.map_or(x, |m| m.max(x))))
        })
    }
}
