//! # 原子排序索引
//!
//! VASP 要求同种元素的原子连续排列，而调用方的原子顺序是任意的。
//! `SortIndex` 保存两者之间的置换：
//!
//! - `sorted[j] = caller[sort[j]]`
//! - `caller[i] = sorted[resort[i]]`
//!
//! 因此 `resort[sort[j]] == j`。元素组按首次出现顺序排列，组内保持原顺序。
//! 置换保存在工作目录的 `ase-sort.dat` 中，每行 `<sort> <resort>`。
//!
//! ## 依赖关系
//! - 被 `calculator/mod.rs` 使用
//! - 使用 `models/structure.rs`

use crate::error::{Result, VaspError};
use crate::models::Structure;
use std::fs;
use std::path::Path;

/// 排序文件名
pub const SORT_FILE: &str = "ase-sort.dat";

/// 调用方顺序与 VASP 顺序之间的置换
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortIndex {
    /// 第 j 个 VASP 原子在调用方列表中的位置
    pub sort: Vec<usize>,

    /// 第 i 个调用方原子在 VASP 列表中的位置
    pub resort: Vec<usize>,
}

impl SortIndex {
    /// 按元素分组（首次出现顺序，组内稳定）
    pub fn from_structure(structure: &Structure) -> Self {
        let mut species: Vec<&str> = Vec::new();
        for atom in &structure.atoms {
            if !species.contains(&atom.element.as_str()) {
                species.push(&atom.element);
            }
        }

        let sort: Vec<usize> = species
            .iter()
            .flat_map(|el| {
                structure
                    .atoms
                    .iter()
                    .enumerate()
                    .filter(move |(_, atom)| atom.element == *el)
                    .map(|(i, _)| i)
            })
            .collect();

        Self::from_sort(sort)
    }

    /// 由 `sort` 求逆得到 `resort`
    fn from_sort(sort: Vec<usize>) -> Self {
        let mut resort = vec![0; sort.len()];
        for (j, &i) in sort.iter().enumerate() {
            resort[i] = j;
        }
        SortIndex { sort, resort }
    }

    pub fn len(&self) -> usize {
        self.sort.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sort.is_empty()
    }

    /// 索引是否恰好覆盖 `n` 个原子
    pub fn covers(&self, n: usize) -> bool {
        self.sort.len() == n
            && self.resort.len() == n
            && self.sort.iter().chain(&self.resort).all(|&i| i < n)
    }

    /// 调用方顺序 → VASP 顺序
    pub fn to_external<T: Clone>(&self, values: &[T]) -> Vec<T> {
        self.sort.iter().map(|&i| values[i].clone()).collect()
    }

    /// VASP 顺序 → 调用方顺序
    pub fn to_caller<T: Clone>(&self, values: &[T]) -> Vec<T> {
        self.resort.iter().map(|&j| values[j].clone()).collect()
    }

    /// 从字符串内容解析，不做一致性检查
    pub fn parse(content: &str, source: &str) -> Result<Self> {
        let mut sort = Vec::new();
        let mut resort = Vec::new();

        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let err = |reason: &str| {
                VaspError::parse("sort", source, format!("{} at line {}", reason, lineno + 1))
            };

            let tokens: Vec<&str> = line.split_whitespace().collect();
            let [s, r] = tokens.as_slice() else {
                return Err(err(&format!("Expected 2 values, found {}", tokens.len())));
            };
            sort.push(s.parse().map_err(|_| err("Invalid sort index"))?);
            resort.push(r.parse().map_err(|_| err("Invalid resort index"))?);
        }

        Ok(SortIndex { sort, resort })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| VaspError::read(path, e))?;
        Self::parse(&content, &path.display().to_string())
    }

    pub fn to_file_string(&self) -> String {
        self.sort
            .iter()
            .zip(&self.resort)
            .map(|(s, r)| format!("{:5} {:5}\n", s, r))
            .collect()
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_file_string()).map_err(|e| VaspError::write(path, e))
    }
}
