//! # 计算器状态的 JSON 导入导出
//!
//! 导出内容：程序版本、VASP 版本、所有非空参数（跨类别展开）、结果、结构。
//!
//! ## 依赖关系
//! - 被 `calculator/mod.rs` 和 `commands/export.rs` 使用
//! - 使用 `serde_json` 序列化

use crate::error::{Result, VaspError};
use crate::models::{CalcResults, ParamValue, Structure};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// 可持久化的计算器状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatorState {
    pub vaspcalc_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vasp_version: Option<String>,

    /// 展开后的参数，同名时后面的类别覆盖前面的
    #[serde(default)]
    pub inputs: BTreeMap<String, ParamValue>,

    #[serde(default)]
    pub results: CalcResults,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atoms: Option<Structure>,
}

impl CalculatorState {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?).map_err(|e| VaspError::write(path, e))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| VaspError::read(path, e))?;
        Self::from_json(&content)
    }
}
