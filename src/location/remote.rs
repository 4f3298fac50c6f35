//! Remote backend over an ssh subprocess.
//!
//! The session spawns `<ssh> <options…> <host> sh` once and keeps the remote
//! shell alive for the whole run. Each request is a small POSIX shell script
//! followed by a sentinel line carrying the script's exit status:
//!
//! ```text
//! {
//! <script>
//! } 2>&1
//! printf '%s %d\n' '<token>' "$?"
//! ```
//!
//! Replies are read line by line until the sentinel. File contents travel as
//! base64 lines so the channel stays line-oriented in both directions.

use anyhow::{bail, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tracing::{debug, trace};

use super::{partial_name, Backend, EntryKind, HostId, Location};
use crate::errors::StubMoveError;

/// Raw bytes per base64 line on upload; a multiple of 3 so lines never need padding.
const PUT_CHUNK: usize = 3 * 4096;
const HEREDOC_END: &str = "__STUB_MOVE_EOF__";

/// How to start the ssh client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshSettings {
    pub program: String,
    pub options: Vec<String>,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            program: "ssh".into(),
            // Never prompt: authentication is owned by the agent/keys.
            options: vec!["-o".into(), "BatchMode=yes".into()],
        }
    }
}

/// One live remote shell.
pub struct RemoteSession {
    host: HostId,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    seq: u64,
}

/// Single-quote `path` for the remote shell.
fn quote(path: &Path) -> Result<String> {
    let Some(s) = path.to_str() else {
        bail!("Remote paths must be valid UTF-8: {}", path.display());
    };
    if s.contains('\n') {
        bail!("Remote paths must not contain a newline: {s:?}");
    }
    Ok(format!("'{}'", s.replace('\'', r"'\''")))
}

impl RemoteSession {
    /// Spawn the ssh client and verify the remote shell answers.
    pub fn open(host: &HostId, ssh: &SshSettings) -> Result<Self> {
        debug!(host = %host, program = %ssh.program, "opening remote session");
        let mut child = Command::new(&ssh.program)
            .args(&ssh.options)
            .arg(host.as_str())
            .arg("sh")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| StubMoveError::RemoteAuth {
                host: host.clone(),
                detail: format!("cannot start '{}': {e}", ssh.program),
            })?;

        let stdin = child.stdin.take();
        let Some(stdout) = child.stdout.take() else {
            bail!("ssh client for '{host}' has no stdout pipe");
        };
        let mut session = Self {
            host: host.clone(),
            child,
            stdin,
            stdout: BufReader::new(stdout),
            seq: 0,
        };

        match session.exec("handshake", Path::new("/"), "echo stub-move-ready") {
            Ok(lines) if lines.last().map(String::as_str) == Some("stub-move-ready") => {
                debug!(host = %host, "remote session ready");
                Ok(session)
            }
            Ok(lines) => Err(StubMoveError::RemoteAuth {
                host: host.clone(),
                detail: format!("unexpected handshake reply: {lines:?}"),
            }
            .into()),
            Err(_) => {
                session.stdin.take();
                let detail = match session.child.wait() {
                    Ok(status) => format!("ssh exited ({status})"),
                    Err(e) => format!("ssh did not answer: {e}"),
                };
                Err(StubMoveError::RemoteAuth { host: host.clone(), detail }.into())
            }
        }
    }

    fn location(&self, path: &Path) -> Location {
        Location::Remote { host: self.host.clone(), path: path.to_path_buf() }
    }

    fn disconnected(&self) -> anyhow::Error {
        StubMoveError::RemoteDisconnected { host: self.host.clone() }.into()
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        let res = match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(data),
            None => return Err(self.disconnected()),
        };
        res.map_err(|_| self.disconnected())
    }

    /// Close the request opened with `{` and ask for the sentinel. Returns the token.
    fn finish_request(&mut self) -> Result<String> {
        self.seq += 1;
        let token = format!("__stub_move_{}_{}__", std::process::id(), self.seq);
        let tail = format!("\n}} 2>&1\nprintf '%s %d\\n' '{token}' \"$?\"\n");
        self.write_raw(tail.as_bytes())?;
        let flushed = self.stdin.as_mut().map(|s| s.flush());
        match flushed {
            Some(Ok(())) => Ok(token),
            _ => Err(self.disconnected()),
        }
    }

    fn send(&mut self, script: &str) -> Result<String> {
        trace!(host = %self.host, script, "remote request");
        self.write_raw(b"{\n")?;
        self.write_raw(script.as_bytes())?;
        self.finish_request()
    }

    /// Feed reply lines to `on_line` until the sentinel; returns the exit status.
    fn read_reply(&mut self, token: &str, mut on_line: impl FnMut(&str)) -> Result<i32> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = match self.stdout.read_until(b'\n', &mut buf) {
                Ok(n) => n,
                Err(_) => return Err(self.disconnected()),
            };
            if n == 0 {
                return Err(self.disconnected());
            }
            if buf.last() == Some(&b'\n') {
                buf.pop();
            }
            let line = String::from_utf8_lossy(&buf);
            if let Some(rest) = line.strip_prefix(token) {
                return Ok(rest.trim().parse().unwrap_or(-1));
            }
            on_line(&line);
        }
    }

    /// Run `script`; nonzero exit becomes a `RemoteCommand` error carrying the output.
    fn exec(&mut self, op: &'static str, path: &Path, script: &str) -> Result<Vec<String>> {
        let token = self.send(script)?;
        let mut lines = Vec::new();
        let status = self.read_reply(&token, |l| lines.push(l.to_string()))?;
        if status != 0 {
            return Err(StubMoveError::RemoteCommand {
                host: self.host.clone(),
                op,
                path: path.to_path_buf(),
                status,
                message: lines.join("; "),
            }
            .into());
        }
        Ok(lines)
    }

    /// Stream the content of remote file `path` into `sink`.
    pub fn get_file(&mut self, path: &Path, sink: &mut dyn Write) -> Result<u64> {
        let q = quote(path)?;
        let token = self.send(&format!(
            "if [ -f {q} ] && [ ! -L {q} ]; then base64 < {q}; else echo 'not a regular file'; false; fi"
        ))?;
        let mut bytes = 0u64;
        let mut failure: Option<String> = None;
        let status = self.read_reply(&token, |line| {
            if failure.is_some() || line.is_empty() {
                return;
            }
            let chunk = match STANDARD.decode(line.trim_end()) {
                Ok(c) => c,
                Err(_) => {
                    failure = Some(line.to_string());
                    return;
                }
            };
            match sink.write_all(&chunk) {
                Ok(()) => bytes += chunk.len() as u64,
                Err(e) => failure = Some(format!("local write failed: {e}")),
            }
        })?;
        if status != 0 || failure.is_some() {
            return Err(StubMoveError::RemoteCommand {
                host: self.host.clone(),
                op: "read file",
                path: path.to_path_buf(),
                status,
                message: failure.unwrap_or_default(),
            }
            .into());
        }
        Ok(bytes)
    }

    /// Write everything from `source` into a new remote file `path` (never clobbers).
    ///
    /// Bytes land in a temp file beside `path` and are moved into place only
    /// after the decoder succeeded; on failure the temp file is removed.
    pub fn put_file(&mut self, path: &Path, source: &mut dyn Read) -> Result<u64> {
        let q = quote(path)?;
        let t = quote(&path.with_file_name(partial_name()))?;
        self.write_raw(
            format!(
                "{{\nif [ -e {q} ] || [ -L {q} ]; then echo 'already exists'; false; \
                 elif ( set -C; base64 -d > {t} ) <<'{HEREDOC_END}'\n"
            )
            .as_bytes(),
        )?;
        let mut buf = vec![0u8; PUT_CHUNK];
        let mut bytes = 0u64;
        loop {
            let filled = read_full(source, &mut buf)?;
            if filled == 0 {
                break;
            }
            bytes += filled as u64;
            let mut line = STANDARD.encode(&buf[..filled]);
            line.push('\n');
            self.write_raw(line.as_bytes())?;
            if filled < buf.len() {
                break;
            }
        }
        self.write_raw(format!("{HEREDOC_END}\nthen mv -f -- {t} {q}; else rm -f -- {t}; false; fi").as_bytes())?;
        let token = self.finish_request()?;
        let mut lines = Vec::new();
        let status = self.read_reply(&token, |l| lines.push(l.to_string()))?;
        if status != 0 {
            return Err(StubMoveError::RemoteCommand {
                host: self.host.clone(),
                op: "write file",
                path: path.to_path_buf(),
                status,
                message: lines.join("; "),
            }
            .into());
        }
        Ok(bytes)
    }

    /// Rename within this host.
    pub fn rename(&mut self, from: &Path, to: &Path) -> Result<()> {
        let script = format!("mv -- {} {}", quote(from)?, quote(to)?);
        self.exec("rename", from, &script).map(drop)
    }
}

/// Fill `buf` as far as the reader allows; short only at EOF.
fn read_full(source: &mut dyn Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

impl Backend for RemoteSession {
    fn kind(&mut self, path: &Path) -> Result<EntryKind> {
        let q = quote(path)?;
        let script = format!(
            "p={q}; if [ -L \"$p\" ]; then echo symlink; elif [ -d \"$p\" ]; then echo dir; \
             elif [ -f \"$p\" ]; then echo file; elif [ -e \"$p\" ]; then echo other; else echo absent; fi"
        );
        let lines = self.exec("inspect", path, &script)?;
        match lines.last().map(String::as_str) {
            Some("symlink") => Ok(EntryKind::Symlink),
            Some("dir") => Ok(EntryKind::Dir),
            Some("file") => Ok(EntryKind::File),
            Some("absent") => Ok(EntryKind::Absent),
            Some("other") => Err(StubMoveError::UnsupportedKind(self.location(path)).into()),
            _ => bail!("unexpected reply inspecting {}: {lines:?}", self.location(path)),
        }
    }

    fn list_dir(&mut self, path: &Path) -> Result<Vec<OsString>> {
        let q = quote(path)?;
        let script = format!(
            "( cd {q} && for f in * .[!.]* ..?*; do if [ -e \"$f\" ] || [ -L \"$f\" ]; then printf '%s\\n' \"$f\"; fi; done )"
        );
        let mut names: Vec<OsString> = self
            .exec("list directory", path, &script)?
            .into_iter()
            .map(OsString::from)
            .collect();
        names.sort();
        Ok(names)
    }

    fn create_dir(&mut self, path: &Path) -> Result<()> {
        let script = format!("mkdir -- {}", quote(path)?);
        self.exec("create directory", path, &script).map(drop)
    }

    fn symlink(&mut self, target: &Path, path: &Path) -> Result<()> {
        let script = format!("ln -s -- {} {}", quote(target)?, quote(path)?);
        self.exec("create symlink", path, &script).map(drop)
    }

    fn remove_file(&mut self, path: &Path) -> Result<()> {
        let script = format!("rm -f -- {}", quote(path)?);
        self.exec("remove", path, &script).map(drop)
    }

    fn remove_dir(&mut self, path: &Path) -> Result<()> {
        let q = quote(path)?;
        let script = format!("if [ -e {q} ] || [ -L {q} ]; then rmdir -- {q}; fi");
        self.exec("remove directory", path, &script).map(drop)
    }

    fn read_link(&mut self, path: &Path) -> Result<PathBuf> {
        let script = format!("readlink -- {}", quote(path)?);
        let lines = self.exec("read symlink", path, &script)?;
        Ok(PathBuf::from(lines.join("\n")))
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.write_all(b"exit\n");
            let _ = stdin.flush();
        }
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.wait();
        }
        debug!(host = %self.host, "remote session closed");
    }
}
