//! Test doubles shared by the unit tests.

use crate::ports::runner::{CommandRunner, Invocation};
use async_trait::async_trait;
use std::collections::HashSet;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn exit_output(code: i32, stdout: &str, stderr: &str) -> Output {
    Output {
        status: ExitStatus::from_raw(code << 8),
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Fake ffprobe/ffmpeg that writes real files and records what it was asked
/// to do, including how many calls were in flight at once and how many were
/// dropped before finishing.
pub struct ScriptedRunner {
    duration: String,
    delay: Duration,
    failing_captures: HashSet<usize>,
    fail_assemble: bool,
    hang_captures: bool,
    calls: Mutex<Vec<Invocation>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    aborted: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new(duration: &str) -> Self {
        Self {
            duration: duration.to_string(),
            delay: Duration::from_millis(5),
            failing_captures: HashSet::new(),
            fail_assemble: false,
            hang_captures: false,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            aborted: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_capture(mut self, index: usize) -> Self {
        self.failing_captures.insert(index);
        self
    }

    pub fn failing_assemble(mut self) -> Self {
        self.fail_assemble = true;
        self
    }

    /// Frame captures never finish on their own.
    pub fn hanging_captures(mut self) -> Self {
        self.hang_captures = true;
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, kind: CallKind) -> usize {
        self.calls().iter().filter(|inv| CallKind::of(inv) == kind).count()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn aborted(&self) -> usize {
        self.aborted.load(Ordering::SeqCst)
    }

    pub async fn wait_for_in_flight(&self, n: usize) {
        for _ in 0..500 {
            if self.in_flight() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("never saw {} calls in flight (have {})", n, self.in_flight());
    }

    async fn capture(&self, out: &Path) -> io::Result<Output> {
        if self.hang_captures {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.delay).await;
        if let Some(index) = frame_index(out) {
            if self.failing_captures.contains(&index) {
                return Ok(exit_output(1, "", "simulated capture failure"));
            }
        }
        tokio::fs::write(out, format!("frame:{}", out.display())).await?;
        Ok(exit_output(0, "", ""))
    }

    async fn assemble(&self, pattern: &Path, out: &Path) -> io::Result<Output> {
        tokio::time::sleep(self.delay).await;
        if self.fail_assemble {
            return Ok(exit_output(1, "", "simulated assemble failure"));
        }
        // Concatenate frames in index order, the way a real encoder reads them.
        let mut gif = b"GIF89a".to_vec();
        let mut index = 0;
        loop {
            let frame = PathBuf::from(
                pattern
                    .to_string_lossy()
                    .replace("%d", &index.to_string()),
            );
            match tokio::fs::read(&frame).await {
                Ok(bytes) => gif.extend(bytes),
                Err(_) if index > 0 => break,
                Err(_) => return Ok(exit_output(1, "", "no input frames")),
            }
            index += 1;
        }
        tokio::fs::write(out, gif).await?;
        Ok(exit_output(0, "", ""))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Probe,
    Capture,
    Assemble,
}

impl CallKind {
    pub fn of(invocation: &Invocation) -> Self {
        if invocation.program == "ffprobe" {
            CallKind::Probe
        } else if invocation.args.iter().any(|a| a == "-vframes") {
            CallKind::Capture
        } else {
            CallKind::Assemble
        }
    }
}

fn frame_index(path: &Path) -> Option<usize> {
    path.file_stem()?
        .to_str()?
        .strip_prefix("thumb-")?
        .parse()
        .ok()
}

/// Tracks one in-flight call; counts it as aborted if dropped unfinished.
struct InFlight<'a> {
    runner: &'a ScriptedRunner,
    finished: bool,
}

impl<'a> InFlight<'a> {
    fn enter(runner: &'a ScriptedRunner) -> Self {
        let now = runner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        runner.peak.fetch_max(now, Ordering::SeqCst);
        Self {
            runner,
            finished: false,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.runner.in_flight.fetch_sub(1, Ordering::SeqCst);
        if !self.finished {
            self.runner.aborted.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: Invocation) -> io::Result<Output> {
        self.calls.lock().unwrap().push(invocation.clone());
        let mut guard = InFlight::enter(self);

        let last = PathBuf::from(invocation.args.last().cloned().unwrap_or_default());
        let result = match CallKind::of(&invocation) {
            CallKind::Probe => {
                tokio::time::sleep(self.delay).await;
                Ok(exit_output(0, &format!("{}\n", self.duration), ""))
            }
            CallKind::Capture => self.capture(&last).await,
            CallKind::Assemble => {
                let pattern = invocation
                    .args
                    .iter()
                    .position(|a| a == "-i")
                    .and_then(|i| invocation.args.get(i + 1))
                    .map(PathBuf::from)
                    .unwrap_or_default();
                self.assemble(&pattern, &last).await
            }
        };

        guard.finished = true;
        result
    }
}
