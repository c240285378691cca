//! C1: shell command execution and path quoting over an established SSH
//! session, plus login-shell detection with an SFTP fallback probe.

use std::time::Duration;

use crate::error::TransportError;

pub const SHELL_CANDIDATES: [&str; 4] = ["/bin/bash", "/usr/bin/bash", "/bin/sh", "/usr/bin/sh"];
const RUN_TIMEOUT: Duration = Duration::from_secs(180);

/// Raw command execution primitive. `ShellTransport` is the production
/// implementation over `ssh2`; tests inject `FakeShell` instead.
pub trait ShellExec: Send {
    /// Runs `command` as-is (no quoting applied) and returns combined
    /// stdout+stderr together with the exit status.
    fn exec_raw(&self, command: &str) -> Result<(String, i32), TransportError>;

    /// Uploads `local` to `remote_path` via SFTP, overwriting if present.
    fn put(&self, local: &[u8], remote_path: &str) -> Result<(), TransportError>;

    /// True if `remote_path` exists and is readable over SFTP, without
    /// going through a login shell. Used as a fallback probe when the
    /// remote user's configured shell is broken.
    fn sftp_exists(&self, remote_path: &str) -> Result<bool, TransportError>;
}

/// Single-quotes `path` for POSIX shells, escaping embedded single quotes.
pub fn escape_remote_path_single(path: &str) -> String {
    format!("'{}'", path.replace('\'', r"'\''"))
}

/// Double-quotes `path`, expanding a leading `~` to `$HOME` first so shell
/// tilde-expansion still applies inside the quotes.
pub fn escape_remote_path_double(path: &str) -> String {
    let expanded = if let Some(rest) = path.strip_prefix('~') { format!("$HOME{rest}") } else { path.to_string() };
    format!("\"{expanded}\"")
}

/// Quotes an arbitrary command string the way `sshcp.py::shell` does: prefer
/// single quotes, fall back to double quotes only when the command itself
/// contains a single quote, escaping embedded quotes of whichever kind was
/// chosen.
pub fn quote_command(command: &str) -> String {
    if command.contains('\'') {
        if command.contains('"') {
            format!("'{}'", command.replace('\'', r#"'"'"'"#))
        } else {
            format!("\"{command}\"")
        }
    } else {
        format!("'{command}'")
    }
}

/// Production `ShellExec` over an authenticated `ssh2::Session`, the same
/// connect-then-exec pattern the rest of the crate uses for plain SFTP
/// operations.
pub struct Ssh2Shell {
    session: ssh2::Session,
    address: String,
    port: u16,
    username: String,
}

impl Ssh2Shell {
    pub fn connect(address: &str, port: u16, username: &str) -> Result<Self, TransportError> {
        let tcp = std::net::TcpStream::connect((address, port))
            .map_err(|e| TransportError::Other(format!("tcp connect failed: {e}")))?;
        let _ = tcp.set_read_timeout(Some(RUN_TIMEOUT));
        let mut session = ssh2::Session::new()
            .map_err(|e| TransportError::Other(format!("could not create ssh session: {e}")))?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| TransportError::Other(format!("ssh handshake failed: {e}")))?;

        let mut authenticated = false;
        if let Some(home) = dirs::home_dir() {
            for name in ["id_ed25519", "id_rsa", "id_ecdsa"] {
                let key = home.join(".ssh").join(name);
                if key.exists() && session.userauth_pubkey_file(username, None, &key, None).is_ok() {
                    authenticated = true;
                    break;
                }
            }
        }
        if !authenticated {
            return Err(TransportError::NoUsableKey);
        }
        Ok(Ssh2Shell {
            session,
            address: address.to_string(),
            port,
            username: username.to_string(),
        })
    }
}

impl ShellExec for Ssh2Shell {
    /// Shells out to a real `ssh` child process rather than reusing the
    /// existing `ssh2::Session` channel, so a hung command can actually be
    /// killed on deadline instead of blocking on the session's own socket
    /// timeout. `wait()` runs on a background thread so the watchdog can
    /// take the child lock and kill it without racing a blocking wait;
    /// separate reader threads drain stdout/stderr concurrently so a full
    /// pipe buffer can't stall the kill.
    fn exec_raw(&self, command: &str) -> Result<(String, i32), TransportError> {
        use std::io::Read;
        use std::process::{Command, Stdio};
        use std::sync::{Arc, Mutex};

        let target = format!("{}@{}", self.username, self.address);
        let mut child = Command::new("ssh")
            .arg("-p")
            .arg(self.port.to_string())
            .arg("-o")
            .arg("BatchMode=yes")
            .arg(&target)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TransportError::Other(format!("failed to spawn ssh: {e}")))?;

        let mut stdout = child.stdout.take().expect("piped stdout");
        let mut stderr = child.stderr.take().expect("piped stderr");
        let out_handle = std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = stdout.read_to_string(&mut buf);
            buf
        });
        let err_handle = std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf);
            buf
        });

        let child = Arc::new(Mutex::new(child));
        let (status_tx, status_rx) = std::sync::mpsc::channel();
        let wait_child = child.clone();
        std::thread::spawn(move || {
            let status = wait_child.lock().unwrap().wait();
            let _ = status_tx.send(status);
        });

        let (status, timed_out) = match status_rx.recv_timeout(RUN_TIMEOUT) {
            Ok(status) => (status, false),
            Err(_) => {
                let _ = child.lock().unwrap().kill();
                match status_rx.recv() {
                    Ok(status) => (status, true),
                    Err(_) => (
                        Err(std::io::Error::new(std::io::ErrorKind::Other, "ssh wait thread disappeared")),
                        true,
                    ),
                }
            }
        };
        let status = status.map_err(|e| TransportError::Other(format!("ssh wait failed: {e}")))?;

        let mut out = out_handle.join().unwrap_or_default();
        let err = err_handle.join().unwrap_or_default();
        out.push_str(&err);

        if timed_out {
            return Err(TransportError::Timeout(RUN_TIMEOUT.as_secs_f64()));
        }

        Ok((out, status.code().unwrap_or(-1)))
    }

    fn put(&self, local: &[u8], remote_path: &str) -> Result<(), TransportError> {
        use std::io::Write;
        let sftp = self.session.sftp().map_err(|e| TransportError::Other(format!("sftp init failed: {e}")))?;
        let mut remote_file = sftp
            .create(std::path::Path::new(remote_path))
            .map_err(|e| TransportError::Other(format!("remote create failed: {e}")))?;
        remote_file.write_all(local).map_err(|e| TransportError::Other(e.to_string()))
    }

    fn sftp_exists(&self, remote_path: &str) -> Result<bool, TransportError> {
        let sftp = self.session.sftp().map_err(|e| TransportError::Other(format!("sftp init failed: {e}")))?;
        Ok(sftp.stat(std::path::Path::new(remote_path)).is_ok())
    }
}

pub struct ShellTransport<E: ShellExec> {
    exec: E,
    user: String,
    host: String,
    detected_shell: Option<String>,
}

impl<E: ShellExec> ShellTransport<E> {
    pub fn new(exec: E, user: impl Into<String>, host: impl Into<String>) -> Self {
        ShellTransport { exec, user: user.into(), host: host.into(), detected_shell: None }
    }

    /// Returns the remote user's login shell, detecting and caching it on
    /// first use. Falls back to `/bin/sh` when the probe output is empty or
    /// unrecognisable, and raises `LoginShellMissing` only when the
    /// configured login shell is broken *and* no shell at all can be found
    /// through an SFTP probe.
    pub fn detect_shell(&mut self) -> Result<&str, TransportError> {
        if self.detected_shell.is_none() {
            let shell = self.probe_shell()?;
            self.detected_shell = Some(shell);
        }
        Ok(self.detected_shell.as_deref().unwrap())
    }

    fn probe_shell(&self) -> Result<String, TransportError> {
        let (out, status) = self.exec.exec_raw("echo __shell_ok__")?;
        if status == 0 && out.trim() == "__shell_ok__" {
            let (which_out, _) = self.exec.exec_raw(
                "echo __shell_path__$(which bash 2>/dev/null || which sh 2>/dev/null)__end__",
            )?;
            if let Some(path) = extract_between(&which_out, "__shell_path__", "__end__") {
                let path = path.trim();
                if !path.is_empty() {
                    return Ok(path.to_string());
                }
            }
            return Ok("/bin/sh".to_string());
        }

        let available = self.check_remote_shells_via_sftp()?;
        if available.is_empty() {
            Err(TransportError::Other(format!(
                "remote login shell for {}@{} is broken and no common shells were found; try: ln -s /usr/bin/bash /bin/bash",
                self.user, self.host
            )))
        } else {
            Err(TransportError::LoginShellMissing { candidates: available })
        }
    }

    fn check_remote_shells_via_sftp(&self) -> Result<Vec<String>, TransportError> {
        let mut found = Vec::new();
        for candidate in SHELL_CANDIDATES {
            if self.exec.sftp_exists(candidate)? {
                found.push(candidate.to_string());
            }
        }
        Ok(found)
    }

    /// Runs `command` through the detected login shell, applying the same
    /// quoting policy `sshcp.py::shell` uses. The 180s deadline is enforced
    /// by `exec_raw` itself (a watchdog thread that can kill the child), not
    /// by measuring elapsed time here after the call has already returned.
    pub fn shell(&mut self, command: &str) -> Result<String, TransportError> {
        let shell = self.detect_shell()?.to_string();
        let quoted = quote_command(command);
        let full = format!("{shell} -c {quoted}");

        let (out, status) = self.exec.exec_raw(&full)?;
        if status != 0 {
            classify_shell_failure(&out)?;
        }
        Ok(out)
    }

    pub fn copy(&self, local_bytes: &[u8], remote_path: &str) -> Result<(), TransportError> {
        self.exec.put(local_bytes, remote_path)
    }
}

fn extract_between<'a>(haystack: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let s = haystack.find(start)? + start.len();
    let e = haystack[s..].find(end)? + s;
    Some(&haystack[s..e])
}

fn classify_shell_failure(output: &str) -> Result<(), TransportError> {
    let lower = output.to_lowercase();
    if lower.contains("permission denied") && lower.contains("password") {
        Err(TransportError::IncorrectPassword)
    } else if lower.contains("could not resolve hostname") || lower.contains("name or service not known") {
        Err(TransportError::BadHostname(output.to_string()))
    } else if lower.contains("connection refused") {
        Err(TransportError::ConnectionRefused(output.to_string()))
    } else {
        Err(TransportError::Other(output.to_string()))
    }
}

#[cfg(test)]
pub struct FakeShell {
    pub raw_responses: std::collections::VecDeque<Result<(String, i32), TransportError>>,
    pub sftp_hits: std::collections::HashSet<String>,
    pub uploads: std::sync::Mutex<Vec<(String, Vec<u8>)>>,
}

#[cfg(test)]
impl FakeShell {
    pub fn new() -> Self {
        FakeShell {
            raw_responses: std::collections::VecDeque::new(),
            sftp_hits: std::collections::HashSet::new(),
            uploads: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn push_ok(&mut self, out: &str, status: i32) {
        self.raw_responses.push_back(Ok((out.to_string(), status)));
    }
}

#[cfg(test)]
impl ShellExec for FakeShell {
    fn exec_raw(&self, _command: &str) -> Result<(String, i32), TransportError> {
        Ok((String::new(), 0))
    }

    fn put(&self, data: &[u8], remote_path: &str) -> Result<(), TransportError> {
        self.uploads.lock().unwrap().push((remote_path.to_string(), data.to_vec()));
        Ok(())
    }

    fn sftp_exists(&self, remote_path: &str) -> Result<bool, TransportError> {
        Ok(self.sftp_hits.contains(remote_path))
    }
}
