//! # 数据模型模块
//!
//! 定义原子结构、VASP 控制参数和计算结果的数据模型。
//!
//! ## 依赖关系
//! - 被 `parsers/` 和 `calculator/` 使用
//! - 子模块: structure, params, results

pub mod params;
pub mod results;
pub mod structure;

pub use params::{LdauSpec, ParamCategory, ParamValue, VaspParams};
pub use results::CalcResults;
pub use structure::{Atom, Lattice, Structure};
