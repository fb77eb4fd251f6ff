//! # 解析器模块
//!
//! VASP 输入文件的读写与输出文件的解析。
//!
//! ## 依赖关系
//! - 被 `calculator/` 和 `commands/` 模块使用
//! - 使用 `models/` 数据模型
//! - 子模块: poscar, incar, kpoints, potcar, outcar, vasprun

pub mod incar;
pub mod kpoints;
pub mod outcar;
pub mod poscar;
pub mod potcar;
pub mod vasprun;

pub use poscar::{parse_poscar_file, write_poscar};
pub use vasprun::{read_vasprun, VasprunData};
