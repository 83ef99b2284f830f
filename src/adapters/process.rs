use crate::ports::runner::{CommandRunner, Invocation};
use async_trait::async_trait;
use std::io;
use std::process::{Output, Stdio};
use tokio::process::Command;

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, invocation: Invocation) -> io::Result<Output> {
        Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            // Dropping the future (cancellation, timeout) kills the child.
            .kill_on_drop(true)
            .output()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let runner = TokioCommandRunner::new();
        let result = runner
            .run(Invocation::new(
                "gifthumb-definitely-not-a-real-binary",
                ["-v"],
            ))
            .await;

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    /// Running, or at least not yet exited, according to procfs.
    #[cfg(target_os = "linux")]
    fn is_alive(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit_once(") ")
                .map(|(_, rest)| !rest.starts_with('Z') && !rest.starts_with('X'))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropping_run_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > {}; exec sleep 30", pid_file.display());

        let runner = TokioCommandRunner::new();
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(300),
            runner.run(Invocation::new("sh", ["-c", script.as_str()])),
        )
        .await;
        assert!(result.is_err(), "sleep 30 finished early");

        let pid: u32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        for _ in 0..100 {
            if !is_alive(pid) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("child {} still running after its future was dropped", pid);
    }
}
