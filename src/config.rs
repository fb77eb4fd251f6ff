//! # 运行配置
//!
//! 决定启动 VASP 所用的命令。优先级：
//!
//! 1. 显式设置的命令
//! 2. 环境变量 `VASPCALC_COMMAND`、`VASP_COMMAND`、`VASP_SCRIPT` 中第一个已设置的
//!
//! 环境变量中的 `PREFIX` 会被替换为计算标签；`VASP_SCRIPT` 是一个脚本，
//! 通过解释器（默认 `python3`）执行。环境查询以闭包注入，
//! 计算器本身不直接读取进程环境。
//!
//! ## 依赖关系
//! - 被 `calculator/mod.rs` 和 `commands/` 使用

use crate::error::{Result, VaspError};
use tracing::debug;

/// 按优先级排列的命令环境变量
pub const ENV_COMMANDS: [&str; 3] = ["VASPCALC_COMMAND", "VASP_COMMAND", "VASP_SCRIPT"];

/// 默认脚本解释器
pub const DEFAULT_INTERPRETER: &str = "python3";

/// 默认计算标签
pub const DEFAULT_LABEL: &str = "vasp";

/// 命令解析配置
#[derive(Debug, Clone, PartialEq)]
pub struct CommandConfig {
    /// 显式命令，优先于环境变量
    pub command: Option<String>,

    /// 替换 `PREFIX` 的计算标签
    pub label: String,

    /// 执行 `VASP_SCRIPT` 的解释器
    pub script_interpreter: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        CommandConfig {
            command: None,
            label: DEFAULT_LABEL.to_string(),
            script_interpreter: DEFAULT_INTERPRETER.to_string(),
        }
    }
}

impl CommandConfig {
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// 解析最终命令
    pub fn resolve<F>(&self, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        resolve_command(self, lookup)
    }
}

/// 读取进程环境变量
pub fn system_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// 按优先级解析命令
pub fn resolve_command<F>(config: &CommandConfig, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(command) = config.command.as_deref().filter(|c| !c.trim().is_empty()) {
        debug!("Using explicit command: {}", command);
        return Ok(command.to_string());
    }

    for env in ENV_COMMANDS {
        let Some(value) = lookup(env) else {
            continue;
        };
        let mut command = value.replace("PREFIX", &config.label);
        if env == "VASP_SCRIPT" {
            command = format!("{} {}", config.script_interpreter, command);
        }
        debug!("Resolved command from {}: {}", env, command);
        return Ok(command);
    }

    Err(VaspError::Setup(format!(
        "Please set either command in calculator or one of the following environment variables (prioritized as follows): {}",
        ENV_COMMANDS.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_explicit_command_wins() {
        let config = CommandConfig::default().with_command("mpirun vasp_std");
        let command = config
            .resolve(env(&[("VASP_COMMAND", "vasp_gam")]))
            .unwrap();
        assert_eq!(command, "mpirun vasp_std");
    }

    #[test]
    fn test_env_priority_and_prefix() {
        let config = CommandConfig::default().with_label("relax");
        let lookup = env(&[
            ("VASP_COMMAND", "vasp_gam"),
            ("VASPCALC_COMMAND", "vasp_std > PREFIX.out"),
        ]);
        assert_eq!(config.resolve(lookup).unwrap(), "vasp_std > relax.out");
    }

    #[test]
    fn test_script_runs_through_interpreter() {
        let config = CommandConfig::default();
        let command = config
            .resolve(env(&[("VASP_SCRIPT", "/opt/run_vasp.py")]))
            .unwrap();
        assert_eq!(command, "python3 /opt/run_vasp.py");
    }

    #[test]
    fn test_no_command_is_setup_error() {
        let result = CommandConfig::default().resolve(env(&[]));
        match result {
            Err(VaspError::Setup(msg)) => assert!(msg.contains("VASPCALC_COMMAND")),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
