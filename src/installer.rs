//! C2: installs the remote scanning helper, preferring the native binary
//! and falling back to a portable interpreted variant when the remote
//! platform can't run it.

use crate::engine_setting::HelperVariant;
use crate::error::InstallError;
use crate::transport::{ShellExec, ShellTransport};

const MIN_GLIBC_MAJOR: u32 = 2;
const MIN_GLIBC_MINOR: u32 = 31;

pub struct RemoteDiagnostics {
    pub arch: String,
    pub os_pretty_name: String,
    pub glibc_version: Option<(u32, u32)>,
}

impl RemoteDiagnostics {
    pub fn glibc_too_old(&self) -> bool {
        match self.glibc_version {
            Some((major, minor)) => (major, minor) < (MIN_GLIBC_MAJOR, MIN_GLIBC_MINOR),
            None => false,
        }
    }

    pub fn is_unsupported_arch(&self) -> bool {
        self.arch != "x86_64"
    }
}

pub struct HelperPaths {
    pub native_local: std::path::PathBuf,
    pub native_remote: String,
    pub portable_local: std::path::PathBuf,
    pub portable_remote: String,
}

pub struct HelperInstaller<'a, E: ShellExec> {
    transport: &'a mut ShellTransport<E>,
    variant: HelperVariant,
    portable_pinned: bool,
}

impl<'a, E: ShellExec> HelperInstaller<'a, E> {
    pub fn new(transport: &'a mut ShellTransport<E>) -> Self {
        HelperInstaller { transport, variant: HelperVariant::Native, portable_pinned: false }
    }

    pub fn active_variant(&self) -> HelperVariant {
        self.variant
    }

    /// Forces the PORTABLE variant for the remainder of this installer's
    /// lifetime. Once set, `install` never attempts the native binary
    /// again, matching the sticky-fallback behaviour the scanner relies on
    /// after a binary-execution failure.
    pub fn pin_portable(&mut self) {
        self.portable_pinned = true;
        self.variant = HelperVariant::Portable;
    }

    pub fn diagnostics(&mut self) -> Result<RemoteDiagnostics, InstallError> {
        let out = self
            .transport
            .shell(
                "uname -m && (grep ^PRETTY_NAME /etc/os-release 2>/dev/null || echo unknown) && \
                 (ldd --version 2>&1 | head -1 || echo unknown)",
            )
            .map_err(InstallError::DiagnosticsFailed)?;
        let mut lines = out.lines();
        let arch = lines.next().unwrap_or("unknown").trim().to_string();
        let os_pretty_name = lines.next().unwrap_or("unknown").trim().to_string();
        let glibc_line = lines.next().unwrap_or("unknown");
        let glibc_version = parse_glibc_version(glibc_line);
        Ok(RemoteDiagnostics { arch, os_pretty_name, glibc_version })
    }

    /// Installs whichever helper variant is currently active, skipping the
    /// upload when the remote copy's MD5 digest already matches.
    pub fn install(&mut self, paths: &HelperPaths, local_digest_fn: impl Fn(&[u8]) -> String) -> Result<(), InstallError> {
        self.transport.detect_shell().map_err(InstallError::ShellDetectionFailed)?;

        let diagnostics = self.diagnostics()?;
        if diagnostics.is_unsupported_arch() {
            tracing::warn!(arch = %diagnostics.arch, "remote architecture is not x86_64");
        }
        if diagnostics.glibc_too_old() && !self.portable_pinned {
            self.variant = HelperVariant::Portable;
        }

        let (local_path, remote_path) = match self.variant {
            HelperVariant::Native => (&paths.native_local, paths.native_remote.as_str()),
            HelperVariant::Portable => (&paths.portable_local, paths.portable_remote.as_str()),
        };

        let bytes = std::fs::read(local_path).map_err(|_| InstallError::MissingLocalHelper(local_path.clone()))?;
        let local_digest = local_digest_fn(&bytes);

        let remote_digest_cmd =
            format!("md5sum '{remote_path}' | awk '{{print $1}}' || echo");
        let remote_digest = self
            .transport
            .shell(&remote_digest_cmd)
            .map_err(InstallError::DigestCheckFailed)?;

        if remote_digest.trim() == local_digest {
            return Ok(());
        }

        self.transport.copy(&bytes, remote_path).map_err(InstallError::UploadFailed)
    }

    /// Switches to the PORTABLE variant after a binary-execution failure
    /// (unsupported glibc, wrong architecture, `Exec format error`) and
    /// reinstalls. The switch is sticky: subsequent calls to `install`
    /// never retry the native binary.
    pub fn fall_back_to_portable(
        &mut self,
        paths: &HelperPaths,
        local_digest_fn: impl Fn(&[u8]) -> String,
    ) -> Result<(), InstallError> {
        self.pin_portable();
        self.install(paths, local_digest_fn)
    }
}

fn parse_glibc_version(line: &str) -> Option<(u32, u32)> {
    let mut digits = line.char_indices().filter(|(_, c)| c.is_ascii_digit() || *c == '.');
    let start = digits.next()?.0;
    let rest: String = line[start..].chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
    let mut parts = rest.splitn(3, '.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next()?.parse().ok()?;
    Some((major, minor))
}

/// True when a helper invocation failure indicates the binary can't run on
/// this remote (rather than a transport or permissions problem), and a
/// PORTABLE fallback should be attempted.
pub fn is_binary_execution_failure(output: &str) -> bool {
    output.contains("Exec format error")
        || output.contains("GLIBC_")
        || output.contains("No such file or directory") && output.contains("scanfs")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FakeShell;

    fn fake_digest(bytes: &[u8]) -> String {
        format!("{:x}", bytes.iter().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(*b as u64)))
    }

    #[test]
    fn parses_standard_glibc_version_line() {
        assert_eq!(parse_glibc_version("ldd (GNU libc) 2.31"), Some((2, 31)));
        assert_eq!(parse_glibc_version("ldd (Ubuntu GLIBC 2.35-0ubuntu3) 2.35"), Some((2, 35)));
    }

    #[test]
    fn glibc_too_old_flags_versions_below_minimum() {
        let d = RemoteDiagnostics {
            arch: "x86_64".to_string(),
            os_pretty_name: "unknown".to_string(),
            glibc_version: Some((2, 17)),
        };
        assert!(d.glibc_too_old());
    }

    #[test]
    fn glibc_unknown_version_is_not_treated_as_too_old() {
        let d =
            RemoteDiagnostics { arch: "x86_64".to_string(), os_pretty_name: "unknown".to_string(), glibc_version: None };
        assert!(!d.glibc_too_old());
    }

    #[test]
    fn detects_binary_execution_failures() {
        assert!(is_binary_execution_failure("/lib/libc.so.6: version `GLIBC_2.34' not found"));
        assert!(is_binary_execution_failure("cannot execute binary file: Exec format error"));
        assert!(!is_binary_execution_failure("permission denied"));
    }

    #[test]
    fn pin_portable_is_sticky_across_installs() {
        let shell = FakeShell::new();
        let mut transport = ShellTransport::new(shell, "alice", "example.com");
        let mut installer = HelperInstaller::new(&mut transport);
        installer.pin_portable();
        assert_eq!(installer.active_variant(), HelperVariant::Portable);
    }
}
