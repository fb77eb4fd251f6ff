//! # 统一错误处理模块
//!
//! 定义 vaspcalc 的所有错误类型，使用 `thiserror` 派生。
//!
//! ## 错误分类
//! - 配置错误 (`Setup`): 找不到 VASP 命令、结构不合法、未知参数
//! - 计算失败 (`CalculationFailed`): VASP 返回非零退出码
//! - 读取错误 (`ReadError`): 输出文件缺失或不完整
//! - 解析错误 (`ParseError`): 输入/排序文件格式错误
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use std::path::Path;
use thiserror::Error;

/// vaspcalc 统一错误类型
#[derive(Error, Debug)]
pub enum VaspError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────
    // 配置错误
    // ─────────────────────────────────────────────────────────────
    #[error("Calculator setup error: {0}")]
    Setup(String),

    // ─────────────────────────────────────────────────────────────
    // 外部程序错误
    // ─────────────────────────────────────────────────────────────
    #[error("{program} in {directory} returned an error: {code}")]
    CalculationFailed {
        program: String,
        directory: String,
        code: i32,
    },

    #[error("Failed to launch '{command}'")]
    LaunchFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────
    // 读取/解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read VASP output {path}: {reason}")]
    ReadError { path: String, reason: String },

    #[error("Failed to parse {format} file: {path}\nReason: {reason}")]
    ParseError {
        format: String,
        path: String,
        reason: String,
    },

    #[error("{0} has not been loaded yet, read the results first")]
    NotLoaded(String),

    // ─────────────────────────────────────────────────────────────
    // 序列化错误
    // ─────────────────────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl VaspError {
    /// 构造文件读取错误
    pub fn read(path: &Path, source: std::io::Error) -> Self {
        VaspError::FileReadError {
            path: path.display().to_string(),
            source,
        }
    }

    /// 构造文件写入错误
    pub fn write(path: &Path, source: std::io::Error) -> Self {
        VaspError::FileWriteError {
            path: path.display().to_string(),
            source,
        }
    }

    /// 构造解析错误
    pub fn parse(format: &str, path: impl Into<String>, reason: impl Into<String>) -> Self {
        VaspError::ParseError {
            format: format.to_string(),
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, VaspError>;
