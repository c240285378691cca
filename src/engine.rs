//! C4: drives the transfer engine (an interactive lftp-like process) over a
//! PTY, the way a human would at its prompt: write a line, wait for the
//! next prompt, read back whatever came in between.

use std::io::{Read, Write};
use std::time::Duration;

use crate::engine_setting::setting_keys;
use crate::error::EngineError;
use crate::job_status::{JobState, JobStatus, JobStatusParser};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_CONSECUTIVE_TIMEOUTS: u32 = 3;

const ACCESS_FAILED_MARKERS: [&str; 3] =
    ["pget: Access failed", "pget-chunk: Access failed", "mirror: Access failed"];
const LOGIN_FAILED_MARKER: &str = "Login failed: Login incorrect";

/// Result of waiting for the engine's prompt after sending a line.
pub enum PtyExpectResult {
    Matched(String),
    TimedOut,
    Dead,
}

/// Abstraction over a running PTY session so `EngineDriver` can be tested
/// without spawning a real child process.
pub trait EnginePtyLike: Send {
    fn write_line(&mut self, line: &str) -> Result<(), EngineError>;
    fn expect_prompt(&mut self, timeout: Duration) -> PtyExpectResult;
}

/// Spawns a fresh PTY running the transfer engine against `user`/`address`,
/// used both on first start and on restart after a timeout storm.
pub trait PtySpawner {
    type Pty: EnginePtyLike;
    fn spawn(&self, user: &str, address: &str) -> Result<Self::Pty, EngineError>;
}

/// Real PTY-backed transfer engine process, built on `portable-pty`. A
/// background reader thread forwards raw output over a channel so
/// `expect_prompt` can block with a timeout instead of polling a blocking
/// read directly.
pub struct RealEnginePty {
    writer: Box<dyn std::io::Write + Send>,
    event_rx: std::sync::mpsc::Receiver<PtyLineEvent>,
    buffer: String,
    prompt: regex::Regex,
    _child: Box<dyn portable_pty::Child + Send + Sync>,
}

enum PtyLineEvent {
    Output(Vec<u8>),
    Exit,
}

impl EnginePtyLike for RealEnginePty {
    fn write_line(&mut self, line: &str) -> Result<(), EngineError> {
        writeln!(self.writer, "{line}\r").map_err(|e| EngineError::ProcessDead(e.to_string()))
    }

    fn expect_prompt(&mut self, timeout: Duration) -> PtyExpectResult {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return PtyExpectResult::TimedOut;
            }
            match self.event_rx.recv_timeout(remaining) {
                Ok(PtyLineEvent::Output(bytes)) => {
                    self.buffer.push_str(&String::from_utf8_lossy(&bytes));
                    if let Some(m) = self.prompt.find(&self.buffer) {
                        let end = m.end();
                        let matched = self.buffer[..end].to_string();
                        self.buffer.drain(..end);
                        return PtyExpectResult::Matched(matched);
                    }
                }
                Ok(PtyLineEvent::Exit) => return PtyExpectResult::Dead,
                Err(_) => return PtyExpectResult::TimedOut,
            }
        }
    }
}

/// Spawns the real transfer engine binary inside a PTY sized the way the
/// engine expects for its non-interactive prompt output (wide, short).
pub struct RealPtySpawner {
    pub engine_binary: String,
}

impl PtySpawner for RealPtySpawner {
    type Pty = RealEnginePty;

    fn spawn(&self, user: &str, address: &str) -> Result<RealEnginePty, EngineError> {
        use portable_pty::{CommandBuilder, PtySize, native_pty_system};

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize { rows: 24, cols: 10_000, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| EngineError::ProcessDead(format!("failed to allocate pty: {e}")))?;

        let mut cmd = CommandBuilder::new(&self.engine_binary);
        cmd.arg(format!("{user}@{address}"));

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| EngineError::ProcessDead(format!("failed to spawn engine process: {e}")))?;
        drop(pair.slave);

        let mut reader =
            pair.master.try_clone_reader().map_err(|e| EngineError::ProcessDead(format!("pty reader: {e}")))?;
        let writer =
            pair.master.take_writer().map_err(|e| EngineError::ProcessDead(format!("pty writer: {e}")))?;

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        let _ = tx.send(PtyLineEvent::Exit);
                        break;
                    }
                    Ok(n) => {
                        if tx.send(PtyLineEvent::Output(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(_) => {
                        let _ = tx.send(PtyLineEvent::Exit);
                        break;
                    }
                }
            }
        });

        let prompt = regex::Regex::new(&format!(
            r"lftp {}@{}:.*>",
            regex::escape(user),
            regex::escape(address)
        ))
        .map_err(|e| EngineError::ProcessDead(format!("bad prompt pattern: {e}")))?;

        Ok(RealEnginePty { writer, event_rx: rx, buffer: String::new(), prompt, _child: child })
    }
}

fn detect_error_marker(output: &str) -> Option<EngineError> {
    if output.contains(LOGIN_FAILED_MARKER) {
        return Some(EngineError::LoginIncorrect(output.to_string()));
    }
    if ACCESS_FAILED_MARKERS.iter().any(|m| output.contains(m)) {
        return Some(EngineError::AccessFailed(output.to_string()));
    }
    None
}

/// Drives the engine's command loop, replaying cached settings across a
/// restart and buffering an error detected after a command's own prompt so
/// it surfaces on the *next* call instead of being lost.
pub struct EngineDriver<S: PtySpawner> {
    spawner: S,
    pty: S::Pty,
    user: String,
    address: String,
    settings_cache: Vec<(String, String)>,
    pending_error: Option<EngineError>,
    consecutive_timeouts: u32,
    job_parser: JobStatusParser,
}

impl<S: PtySpawner> EngineDriver<S> {
    pub fn spawn(spawner: S, user: impl Into<String>, address: impl Into<String>) -> Result<Self, EngineError> {
        let user = user.into();
        let address = address.into();
        let pty = spawner.spawn(&user, &address)?;
        let mut driver = EngineDriver {
            spawner,
            pty,
            user,
            address,
            settings_cache: Vec::new(),
            pending_error: None,
            consecutive_timeouts: 0,
            job_parser: JobStatusParser::new(),
        };
        driver.await_initial_prompt()?;
        driver.set(setting_keys::COMMAND_AT_EXIT, "\"kill all\"")?;
        driver.set(setting_keys::SFTP_AUTO_CONFIRM, "true")?;
        Ok(driver)
    }

    fn await_initial_prompt(&mut self) -> Result<(), EngineError> {
        match self.pty.expect_prompt(COMMAND_TIMEOUT) {
            PtyExpectResult::Matched(_) => Ok(()),
            PtyExpectResult::TimedOut => Err(EngineError::ProcessDead("engine never printed its first prompt".into())),
            PtyExpectResult::Dead => Err(EngineError::ProcessDead("engine exited before printing a prompt".into())),
        }
    }

    /// Replaces the running process with a fresh one and replays every
    /// cached setting, in the order it was first set, exactly as the
    /// engine would expect after a cold start.
    fn restart(&mut self) -> Result<(), EngineError> {
        self.pty = self.spawner.spawn(&self.user, &self.address)?;
        self.await_initial_prompt()?;
        self.consecutive_timeouts = 0;
        let cached = self.settings_cache.clone();
        for (name, value) in cached {
            self.run_command(&format!("set {name} {value}"))?;
        }
        Ok(())
    }

    /// Sends `line`, waits for the next prompt, and classifies what came
    /// back. A timeout increments the consecutive-timeout counter; three in
    /// a row force a restart and a hard error. A clean prompt with no
    /// content resets the counter. An access/login failure embedded in the
    /// output is absorbed here: the *next* prompt is consumed and the error
    /// is stashed for the following call to surface via `command`.
    fn run_command(&mut self, line: &str) -> Result<String, EngineError> {
        self.pty.write_line(line)?;
        match self.pty.expect_prompt(COMMAND_TIMEOUT) {
            PtyExpectResult::TimedOut => {
                self.consecutive_timeouts += 1;
                if self.consecutive_timeouts >= MAX_CONSECUTIVE_TIMEOUTS {
                    self.restart()?;
                    Err(EngineError::TimeoutStorm)
                } else {
                    Ok(String::new())
                }
            }
            PtyExpectResult::Dead => {
                Err(EngineError::ProcessDead(format!("process died while running: {line}")))
            }
            PtyExpectResult::Matched(output) => {
                self.consecutive_timeouts = 0;
                let trimmed = output.trim().to_string();
                if let Some(err) = detect_error_marker(&trimmed) {
                    let _ = self.pty.expect_prompt(COMMAND_TIMEOUT);
                    self.pending_error = Some(err);
                }
                Ok(trimmed)
            }
        }
    }

    /// Surfaces an error stashed by a previous `run_command` call, if any,
    /// before running a new one.
    fn raise_pending_error(&mut self) -> Result<(), EngineError> {
        match self.pending_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn command(&mut self, line: &str) -> Result<String, EngineError> {
        self.raise_pending_error()?;
        self.run_command(line)
    }

    /// Sets `name` to `value` and caches it so it survives a restart.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        self.command(&format!("set {name} {value}"))?;
        match self.settings_cache.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.settings_cache.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }

    /// Returns the value currently cached for `name`, or an empty string if
    /// it was never set on this driver. Reads `settings_cache` directly
    /// instead of round-tripping through the engine's own prompt, so the
    /// value survives a restart the same way `set` does: the cache is what
    /// gets replayed on restart, so it's also the source of truth for `get`.
    pub fn get(&mut self, name: &str) -> Result<String, EngineError> {
        self.raise_pending_error()?;
        Ok(self.settings_cache.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone()).unwrap_or_default())
    }

    pub fn status(&mut self) -> Result<Vec<JobStatus>, EngineError> {
        let out = self.command("jobs -v")?;
        self.job_parser.parse(&out).map_err(|e| EngineError::StatusUnparseable(e.to_string()))
    }

    /// Queues a pget (file) or mirror (directory) transfer. Mirrors the
    /// exact token layout the engine's own queue syntax expects, including
    /// the extra space left behind when `is_dir` is true and the `-o` flag
    /// is omitted.
    pub fn queue(&mut self, remote_dir: &str, filename: &str, local_dir: &str, is_dir: bool) -> Result<(), EngineError> {
        let verb = if is_dir { "mirror" } else { "pget" };
        let remote_path = format!("\"{remote_dir}/{filename}\"");
        let local_path = format!("\"{}/\"", local_dir.trim_end_matches('/'));
        let o_flag = if is_dir { "" } else { "-o" };
        let tokens = ["queue", "'", verb, "-c", &remote_path, o_flag, &local_path, "'"];
        let cmd = tokens.join(" ");
        self.command(&cmd)?;
        Ok(())
    }

    /// Kills a running job or dequeues a queued one by name. Returns `true`
    /// if a matching job was found and a kill/delete command was issued,
    /// `false` if no job by that name exists.
    pub fn kill(&mut self, name: &str) -> Result<bool, EngineError> {
        let jobs = self.status()?;
        match jobs.iter().find(|j| j.name == name) {
            Some(job) => {
                match job.state {
                    JobState::Running => {
                        self.command(&format!("kill {}", job.id))?;
                    }
                    JobState::Queued => {
                        self.command(&format!("queue --delete {}", job.id))?;
                    }
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn kill_all(&mut self) -> Result<(), EngineError> {
        self.command("queue -d *")?;
        self.command("kill all")?;
        Ok(())
    }

    pub fn exit(&mut self) -> Result<(), EngineError> {
        self.kill_all()?;
        let _ = self.pty.write_line("exit");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct ScriptedPty {
        responses: Arc<Mutex<VecDeque<PtyExpectResultScript>>>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[derive(Clone)]
    enum PtyExpectResultScript {
        Matched(String),
        TimedOut,
        Dead,
    }

    impl EnginePtyLike for ScriptedPty {
        fn write_line(&mut self, line: &str) -> Result<(), EngineError> {
            self.sent.lock().unwrap().push(line.to_string());
            Ok(())
        }
        fn expect_prompt(&mut self, _timeout: Duration) -> PtyExpectResult {
            match self.responses.lock().unwrap().pop_front() {
                Some(PtyExpectResultScript::Matched(s)) => PtyExpectResult::Matched(s),
                Some(PtyExpectResultScript::TimedOut) | None => PtyExpectResult::TimedOut,
                Some(PtyExpectResultScript::Dead) => PtyExpectResult::Dead,
            }
        }
    }

    struct ScriptedSpawner {
        scripts: RefCell<VecDeque<ScriptedPty>>,
    }

    impl PtySpawner for ScriptedSpawner {
        type Pty = ScriptedPty;
        fn spawn(&self, _user: &str, _address: &str) -> Result<ScriptedPty, EngineError> {
            self.scripts
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| EngineError::ProcessDead("no more scripted ptys".into()))
        }
    }

    fn pty_with(responses: Vec<PtyExpectResultScript>) -> ScriptedPty {
        ScriptedPty { responses: Arc::new(Mutex::new(responses.into())), sent: Arc::new(Mutex::new(Vec::new())) }
    }

    #[test]
    fn spawn_sends_setup_commands_after_initial_prompt() {
        let pty = pty_with(vec![
            PtyExpectResultScript::Matched("lftp alice@example.com:~>".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("".into()),
        ]);
        let sent = pty.sent.clone();
        let spawner = ScriptedSpawner { scripts: RefCell::new(vec![pty].into()) };
        let driver = EngineDriver::spawn(spawner, "alice", "example.com");
        assert!(driver.is_ok());
        assert!(sent.lock().unwrap()[0].contains("cmd:at-exit"));
        assert!(sent.lock().unwrap()[1].contains("sftp:auto-confirm"));
    }

    #[test]
    fn three_consecutive_timeouts_trigger_restart_and_hard_error() {
        let first_pty = pty_with(vec![
            PtyExpectResultScript::Matched("lftp alice@example.com:~>".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::TimedOut,
            PtyExpectResultScript::TimedOut,
            PtyExpectResultScript::TimedOut,
        ]);
        let second_pty = pty_with(vec![PtyExpectResultScript::Matched("lftp alice@example.com:~>".into())]);
        let spawner = ScriptedSpawner { scripts: RefCell::new(vec![first_pty, second_pty].into()) };
        let mut driver = EngineDriver::spawn(spawner, "alice", "example.com").unwrap();

        assert!(driver.command("jobs -v").is_ok());
        assert!(driver.command("jobs -v").is_ok());
        match driver.command("jobs -v") {
            Err(EngineError::TimeoutStorm) => {}
            other => panic!("expected TimeoutStorm, got {other:?}"),
        }
    }

    #[test]
    fn access_failed_marker_is_buffered_and_surfaces_on_next_command() {
        let pty = pty_with(vec![
            PtyExpectResultScript::Matched("lftp alice@example.com:~>".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("pget: Access failed: denied".into()),
            PtyExpectResultScript::Matched("lftp alice@example.com:~>".into()),
            PtyExpectResultScript::Matched("jobs: no jobs".into()),
        ]);
        let spawner = ScriptedSpawner { scripts: RefCell::new(vec![pty].into()) };
        let mut driver = EngineDriver::spawn(spawner, "alice", "example.com").unwrap();

        assert!(driver.command("pget -c /a /b").is_ok());
        match driver.command("jobs -v") {
            Err(EngineError::AccessFailed(m)) => assert!(m.contains("Access failed")),
            other => panic!("expected AccessFailed, got {other:?}"),
        }
    }

    #[test]
    fn queue_command_for_file_uses_o_flag() {
        let pty = pty_with(vec![
            PtyExpectResultScript::Matched("lftp alice@example.com:~>".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("".into()),
        ]);
        let sent = pty.sent.clone();
        let spawner = ScriptedSpawner { scripts: RefCell::new(vec![pty].into()) };
        let mut driver = EngineDriver::spawn(spawner, "alice", "example.com").unwrap();
        driver.queue("/remote/data", "movie.mkv", "/local/data", false).unwrap();
        let last = sent.lock().unwrap().last().unwrap().clone();
        assert_eq!(last, "queue ' pget -c \"/remote/data/movie.mkv\" -o \"/local/data/\" '");
    }

    #[test]
    fn queue_command_for_directory_has_no_o_flag_and_keeps_double_space() {
        let pty = pty_with(vec![
            PtyExpectResultScript::Matched("lftp alice@example.com:~>".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("".into()),
        ]);
        let sent = pty.sent.clone();
        let spawner = ScriptedSpawner { scripts: RefCell::new(vec![pty].into()) };
        let mut driver = EngineDriver::spawn(spawner, "alice", "example.com").unwrap();
        driver.queue("/remote/data", "show", "/local", true).unwrap();
        let last = sent.lock().unwrap().last().unwrap().clone();
        assert_eq!(last, "queue ' mirror -c \"/remote/data/show\"  \"/local/\" '");
    }

    #[test]
    fn get_returns_cached_value_surviving_a_restart() {
        let first_pty = pty_with(vec![
            PtyExpectResultScript::Matched("lftp alice@example.com:~>".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::TimedOut,
            PtyExpectResultScript::TimedOut,
            PtyExpectResultScript::TimedOut,
        ]);
        let second_pty = pty_with(vec![
            PtyExpectResultScript::Matched("lftp alice@example.com:~>".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("".into()),
        ]);
        let spawner = ScriptedSpawner { scripts: RefCell::new(vec![first_pty, second_pty].into()) };
        let mut driver = EngineDriver::spawn(spawner, "alice", "example.com").unwrap();
        driver.set(setting_keys::PARALLEL_TRANSFER_COUNT, "4").unwrap();

        assert!(driver.command("jobs -v").is_ok());
        assert!(driver.command("jobs -v").is_ok());
        match driver.command("jobs -v") {
            Err(EngineError::TimeoutStorm) => {}
            other => panic!("expected TimeoutStorm, got {other:?}"),
        }

        assert_eq!(driver.get(setting_keys::PARALLEL_TRANSFER_COUNT).unwrap(), "4");
    }

    #[test]
    fn get_of_a_never_set_name_is_empty() {
        let pty = pty_with(vec![
            PtyExpectResultScript::Matched("lftp alice@example.com:~>".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("".into()),
        ]);
        let spawner = ScriptedSpawner { scripts: RefCell::new(vec![pty].into()) };
        let mut driver = EngineDriver::spawn(spawner, "alice", "example.com").unwrap();
        assert_eq!(driver.get(setting_keys::NET_TIMEOUT).unwrap(), "");
    }

    #[test]
    fn kill_running_job_sends_kill_command_and_returns_true() {
        let pty = pty_with(vec![
            PtyExpectResultScript::Matched("lftp alice@example.com:~>".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched(
                "[0] pget -c \"/remote/data/movie.mkv\" -o \"/local/data/\"\n  1/2 (50%) 1/s eta:1s\n".into(),
            ),
            PtyExpectResultScript::Matched("".into()),
        ]);
        let sent = pty.sent.clone();
        let spawner = ScriptedSpawner { scripts: RefCell::new(vec![pty].into()) };
        let mut driver = EngineDriver::spawn(spawner, "alice", "example.com").unwrap();

        let killed = driver.kill("movie.mkv").unwrap();
        assert!(killed);
        assert_eq!(sent.lock().unwrap().last().unwrap(), "kill 0");
    }

    #[test]
    fn kill_queued_job_sends_queue_delete_and_returns_true() {
        let pty = pty_with(vec![
            PtyExpectResultScript::Matched("lftp alice@example.com:~>".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched(
                "Queue:\n  [2] pget -c \"/remote/data/other.iso\" -o \"/local/data/\"\n".into(),
            ),
            PtyExpectResultScript::Matched("".into()),
        ]);
        let sent = pty.sent.clone();
        let spawner = ScriptedSpawner { scripts: RefCell::new(vec![pty].into()) };
        let mut driver = EngineDriver::spawn(spawner, "alice", "example.com").unwrap();

        let killed = driver.kill("other.iso").unwrap();
        assert!(killed);
        assert_eq!(sent.lock().unwrap().last().unwrap(), "queue --delete 2");
    }

    #[test]
    fn kill_unknown_job_name_returns_false_without_sending_a_kill_command() {
        let pty = pty_with(vec![
            PtyExpectResultScript::Matched("lftp alice@example.com:~>".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("jobs: no jobs".into()),
        ]);
        let sent = pty.sent.clone();
        let spawner = ScriptedSpawner { scripts: RefCell::new(vec![pty].into()) };
        let mut driver = EngineDriver::spawn(spawner, "alice", "example.com").unwrap();

        let sent_before = sent.lock().unwrap().len();
        let killed = driver.kill("nonexistent.iso").unwrap();
        assert!(!killed);
        assert_eq!(sent.lock().unwrap().len(), sent_before + 1);
    }

    #[test]
    fn restart_replays_cached_settings_in_order() {
        let first_pty = pty_with(vec![
            PtyExpectResultScript::Matched("lftp alice@example.com:~>".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::TimedOut,
            PtyExpectResultScript::TimedOut,
            PtyExpectResultScript::TimedOut,
        ]);
        let second_pty = pty_with(vec![
            PtyExpectResultScript::Matched("lftp alice@example.com:~>".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("".into()),
            PtyExpectResultScript::Matched("".into()),
        ]);
        let second_sent = second_pty.sent.clone();
        let spawner = ScriptedSpawner { scripts: RefCell::new(vec![first_pty, second_pty].into()) };
        let mut driver = EngineDriver::spawn(spawner, "alice", "example.com").unwrap();
        driver.set(setting_keys::NET_TIMEOUT, "10s").unwrap();

        assert!(driver.command("jobs -v").is_ok());
        assert!(driver.command("jobs -v").is_ok());
        let _ = driver.command("jobs -v");

        let replayed = second_sent.lock().unwrap();
        assert!(replayed.iter().any(|c| c.contains(setting_keys::NET_TIMEOUT)));
        assert!(replayed.iter().any(|c| c.contains(setting_keys::COMMAND_AT_EXIT)));
    }
}
