//! # vaspcalc - VASP 计算器适配层
//!
//! 把原子结构与参数写成 VASP 输入文件，运行 VASP，再把
//! vasprun.xml/OUTCAR 中的能量、受力、应力、磁矩等结果按调用方的原子顺序读回。
//!
//! ```no_run
//! use vaspcalc::{Atom, Lattice, Structure, Vasp};
//!
//! let structure = Structure::new(Lattice::cubic(2.87), vec![Atom::new("Fe", [0.0; 3])]);
//! let mut calc = Vasp::new("fe_bulk").with_command("mpirun vasp_std");
//! calc.set("xc", "PBE")?;
//! calc.set("encut", 400.0)?;
//! let results = calc.calculate(&structure)?;
//! println!("{:?}", results.energy);
//! # Ok::<(), vaspcalc::VaspError>(())
//! ```
//!
//! ## 依赖关系
//! ```text
//! lib.rs
//!   ├── calculator/ (计算器、排序、变化检测、进程启动、状态导出)
//!   ├── parsers/    (POSCAR/INCAR/KPOINTS/POTCAR/OUTCAR/vasprun.xml)
//!   ├── models/     (结构、参数、结果)
//!   ├── config.rs   (启动命令解析)
//!   └── error.rs    (错误处理)
//! ```

pub mod calculator;
pub mod config;
pub mod error;
pub mod models;
pub mod parsers;

pub use calculator::{CalcState, CalculatorState, ReadWarning, SystemChange, TxtOutput, Vasp};
pub use config::CommandConfig;
pub use error::{Result, VaspError};
pub use models::{Atom, CalcResults, Lattice, ParamValue, Structure, VaspParams};
