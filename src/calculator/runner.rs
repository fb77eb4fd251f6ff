//! # VASP 进程启动
//!
//! 通过平台 shell 同步执行 VASP 命令，工作目录为计算目录。
//! 没有超时和重试；非零退出码由调用方转换为 `CalculationFailed`。
//!
//! `Launcher` 是启动方式的抽象，测试中用桩实现替换真实的 shell。
//!
//! ## 依赖关系
//! - 被 `calculator/mod.rs` 使用

use crate::error::{Result, VaspError};
use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use tracing::{debug, warn};

/// 默认的 VASP 标准输出文件
pub const DEFAULT_TXT: &str = "vasp.out";

/// VASP 标准输出的去向
pub enum TxtOutput {
    /// 丢弃
    Suppressed,
    /// 继承当前进程的标准输出
    Stdout,
    /// 写入文件，相对路径以计算目录为基准
    File(PathBuf),
    /// 流式写入调用方提供的 writer
    Writer(Box<dyn Write + Send>),
}

impl Default for TxtOutput {
    fn default() -> Self {
        TxtOutput::File(PathBuf::from(DEFAULT_TXT))
    }
}

impl fmt::Debug for TxtOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxtOutput::Suppressed => write!(f, "Suppressed"),
            TxtOutput::Stdout => write!(f, "Stdout"),
            TxtOutput::File(path) => f.debug_tuple("File").field(path).finish(),
            TxtOutput::Writer(_) => write!(f, "Writer(..)"),
        }
    }
}

impl TxtOutput {
    /// 命令行写法：`-` 为标准输出，`none` 为丢弃，其余为文件名
    pub fn from_arg(arg: &str) -> Self {
        match arg {
            "-" => TxtOutput::Stdout,
            "none" | "None" => TxtOutput::Suppressed,
            path => TxtOutput::File(PathBuf::from(path)),
        }
    }
}

/// VASP 启动方式
pub trait Launcher {
    /// 在 `directory` 中执行 `command`，返回退出码
    fn launch(&mut self, command: &str, directory: &Path, output: &mut TxtOutput) -> Result<i32>;
}

/// 通过 `sh -c`（Windows 上 `cmd /C`）执行
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellLauncher;

fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

/// 退出状态转换为整数码，被信号终止时为 128 + 信号值
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

impl Launcher for ShellLauncher {
    fn launch(&mut self, command: &str, directory: &Path, output: &mut TxtOutput) -> Result<i32> {
        let launch_err = |e: io::Error| VaspError::LaunchFailed {
            command: command.to_string(),
            source: e,
        };

        let mut cmd = shell_command(command);
        cmd.current_dir(directory);

        let status = match output {
            TxtOutput::Suppressed => cmd.stdout(Stdio::null()).status().map_err(launch_err)?,
            TxtOutput::Stdout => cmd.stdout(Stdio::inherit()).status().map_err(launch_err)?,
            TxtOutput::File(path) => {
                let path = directory.join(path.as_path());
                let file = File::create(&path).map_err(|e| VaspError::write(&path, e))?;
                debug!("Writing VASP output to {}", path.display());
                cmd.stdout(Stdio::from(file)).status().map_err(launch_err)?
            }
            TxtOutput::Writer(writer) => {
                let mut child = cmd.stdout(Stdio::piped()).spawn().map_err(launch_err)?;
                let streamed = match child.stdout.take() {
                    Some(mut stdout) => io::copy(&mut stdout, writer).and_then(|_| writer.flush()),
                    None => writer.flush(),
                };
                if let Err(e) = streamed {
                    // 输出无法写入时终止进程，不留下未回收的子进程
                    warn!("Stopping '{}': failed to stream its output", command);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(launch_err(e));
                }
                child.wait().map_err(launch_err)?
            }
        };

        Ok(exit_code(status))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// 把输出收集到共享缓冲区的 writer
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_exit_codes() {
        let dir = tempfile::tempdir().unwrap();
        let mut launcher = ShellLauncher;
        let mut out = TxtOutput::Suppressed;

        assert_eq!(launcher.launch("true", dir.path(), &mut out).unwrap(), 0);
        assert_eq!(launcher.launch("exit 3", dir.path(), &mut out).unwrap(), 3);
        assert_eq!(launcher.launch("kill -9 $$", dir.path(), &mut out).unwrap(), 137);
    }

    #[test]
    fn test_file_output_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = TxtOutput::default();

        ShellLauncher
            .launch("echo hello; pwd > where.txt", dir.path(), &mut out)
            .unwrap();

        let text = std::fs::read_to_string(dir.path().join(DEFAULT_TXT)).unwrap();
        assert_eq!(text.trim(), "hello");
        assert!(dir.path().join("where.txt").exists());
    }

    #[test]
    fn test_writer_output_is_streamed() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = SharedBuffer::default();
        let mut out = TxtOutput::Writer(Box::new(buffer.clone()));

        ShellLauncher
            .launch("echo one; echo two", dir.path(), &mut out)
            .unwrap();

        let text = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text, "one\ntwo\n");
    }

    /// 总是写入失败的 writer
    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_stream_stops_child() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = TxtOutput::Writer(Box::new(BrokenPipe));
        let start = std::time::Instant::now();

        let result = ShellLauncher.launch("echo started; exec sleep 30", dir.path(), &mut out);

        assert!(matches!(result, Err(VaspError::LaunchFailed { .. })));
        assert!(start.elapsed() < std::time::Duration::from_secs(20));
    }

    #[test]
    fn test_txt_from_arg() {
        assert!(matches!(TxtOutput::from_arg("-"), TxtOutput::Stdout));
        assert!(matches!(TxtOutput::from_arg("none"), TxtOutput::Suppressed));
        assert!(matches!(TxtOutput::from_arg("run.log"), TxtOutput::File(_)));
    }
}
