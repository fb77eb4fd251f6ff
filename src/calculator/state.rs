//! # 计算状态与变化检测
//!
//! 比较新结构与上次计算所用结构、当前参数与参数快照，
//! 给出发生变化的类别。检测是纯函数，不修改任何状态。
//!
//! ## 依赖关系
//! - 被 `calculator/mod.rs` 使用
//! - 使用 `models/structure.rs`, `models/params.rs`

use crate::models::{ParamCategory, Structure, VaspParams};
use std::fmt;

/// 结构比较的默认容差
pub const DEFAULT_TOLERANCE: f64 = 1e-15;

/// 一处需要重新计算的变化
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemChange {
    Positions,
    Cell,
    Numbers,
    Pbc,
    InitialMagmoms,
    Parameters(ParamCategory),
}

impl SystemChange {
    /// 所有结构性变化
    pub const STRUCTURAL: [SystemChange; 5] = [
        SystemChange::Positions,
        SystemChange::Numbers,
        SystemChange::Cell,
        SystemChange::Pbc,
        SystemChange::InitialMagmoms,
    ];

    /// 是否属于结构（"atoms"）类变化
    pub fn is_structural(&self) -> bool {
        !matches!(self, SystemChange::Parameters(_))
    }
}

impl fmt::Display for SystemChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemChange::Positions => write!(f, "positions"),
            SystemChange::Cell => write!(f, "cell"),
            SystemChange::Numbers => write!(f, "numbers"),
            SystemChange::Pbc => write!(f, "pbc"),
            SystemChange::InitialMagmoms => write!(f, "initial_magmoms"),
            SystemChange::Parameters(cat) => write!(f, "{}", cat),
        }
    }
}

/// 工作目录中计算的生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalcState {
    #[default]
    Empty,
    InputsWritten,
    Running,
    Done,
    Failed,
    Stale,
}

impl fmt::Display for CalcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CalcState::Empty => "empty",
            CalcState::InputsWritten => "inputs written",
            CalcState::Running => "running",
            CalcState::Done => "done",
            CalcState::Failed => "failed",
            CalcState::Stale => "stale",
        };
        write!(f, "{}", s)
    }
}

fn differs(a: &[f64], b: &[f64], tol: f64) -> bool {
    a.len() != b.len() || a.iter().zip(b).any(|(x, y)| (x - y).abs() > tol)
}

fn flat3(values: &[[f64; 3]]) -> Vec<f64> {
    values.iter().flatten().copied().collect()
}

/// 结构变化
///
/// `old` 为 `None` 时所有结构类别都算作变化。
pub fn structure_changes(old: Option<&Structure>, new: &Structure, tol: f64) -> Vec<SystemChange> {
    let Some(old) = old else {
        return SystemChange::STRUCTURAL.to_vec();
    };

    let mut changes = Vec::new();
    if differs(&flat3(&old.positions()), &flat3(&new.positions()), tol) {
        changes.push(SystemChange::Positions);
    }
    if old.symbols() != new.symbols() {
        changes.push(SystemChange::Numbers);
    }
    if differs(&flat3(&old.lattice.matrix), &flat3(&new.lattice.matrix), tol) {
        changes.push(SystemChange::Cell);
    }
    if old.pbc != new.pbc {
        changes.push(SystemChange::Pbc);
    }
    if differs(&old.initial_magmoms(), &new.initial_magmoms(), tol) {
        changes.push(SystemChange::InitialMagmoms);
    }
    changes
}

/// 参数变化
pub fn parameter_changes(current: &VaspParams, snapshot: &VaspParams) -> Vec<SystemChange> {
    current
        .changed_categories(snapshot)
        .into_iter()
        .map(SystemChange::Parameters)
        .collect()
}
