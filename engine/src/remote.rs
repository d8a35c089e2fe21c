//! Remote-mirror destination over SSH.
//!
//! One authenticated session is established when the target is opened and
//! reused for every query, command, and transfer of the run, then released
//! explicitly. Queries and pushes go over SFTP; directory creation goes
//! through a `mkdir -p` exec so it stays a single idempotent round trip.
//!
//! This target never hashes destination content, so its duplicate check is
//! size+mtime only. The remote mtime is stamped to match the source after
//! each complete push, which is what makes that check hold across runs.

use std::collections::HashSet;
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use ssh2::{OpenFlags, OpenType, Session, Sftp};
use tracing::{debug, info};

use crate::checksums::{ChecksumAlgorithm, ChecksumValue};
use crate::error::EngineError;
use crate::job::cancel_requested;
use crate::local::TRANSFER_BLOCK_SIZE;
use crate::model::{unix_seconds, DestFingerprint, RemoteConfig, SourceFile};
use crate::progress::ProgressSink;
use crate::target::DestinationTarget;

/// Read/write timeout on the underlying socket once connected.
const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Key files tried under `~/.ssh` when the agent does not authenticate.
const DEFAULT_KEY_NAMES: [&str; 3] = ["id_ed25519", "id_rsa", "id_ecdsa"];

/// Quote a path for use in a remote shell command.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Join a POSIX-style remote base with a run-relative path.
///
/// The result is a UTF-8 string because it is also quoted into exec
/// command lines; a file name that is not valid UTF-8 degrades lossily on
/// the remote side.
fn remote_join(base: &str, rel: &Path) -> String {
    let rel = rel.to_string_lossy().replace('\\', "/");
    format!("{}/{}", base.trim_end_matches('/'), rel)
}

/// Byte offset to continue a push from.
///
/// Zero unless resume is enabled and the remote side holds a shorter file
/// whose mtime does not already match the source. A matching mtime is only
/// ever stamped after a complete push, so it marks a finished transfer of
/// an older source version, never a partial to append to.
fn resume_offset(resume: bool, existing: Option<&DestFingerprint>, source: &SourceFile) -> u64 {
    if !resume {
        return 0;
    }
    match existing {
        Some(existing)
            if existing.size < source.size
                && existing.mtime_unix != unix_seconds(source.modified) =>
        {
            existing.size
        }
        _ => 0,
    }
}

/// Mirror rooted at a directory on a remote host.
pub struct RemoteTarget {
    base: String,
    host_label: String,
    session: Session,
    sftp: Sftp,
    resume: bool,
    created_dirs: HashSet<String>,
}

impl RemoteTarget {
    /// Connect, authenticate, and open the SFTP channel.
    ///
    /// This is the once-per-run session setup; any failure here is a setup
    /// error that aborts before enumeration.
    pub fn connect(base: String, config: &RemoteConfig) -> Result<Self, EngineError> {
        let addr = format!("{}:{}", config.host, config.port);
        let sock = addr
            .to_socket_addrs()
            .map_err(|e| EngineError::Connect {
                host: addr.clone(),
                source: e,
            })?
            .next()
            .ok_or_else(|| EngineError::Connect {
                host: addr.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "host resolved to no addresses",
                ),
            })?;

        let tcp = TcpStream::connect_timeout(&sock, config.connect_timeout).map_err(|e| {
            EngineError::Connect {
                host: addr.clone(),
                source: e,
            }
        })?;
        let _ = tcp.set_read_timeout(Some(IO_TIMEOUT));
        let _ = tcp.set_write_timeout(Some(IO_TIMEOUT));

        let mut session = Session::new().map_err(|e| EngineError::Ssh {
            op: "session",
            source: e,
        })?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| EngineError::Ssh {
            op: "handshake",
            source: e,
        })?;

        let _ = session.userauth_agent(&config.user);
        if !session.authenticated() {
            let mut keys: Vec<PathBuf> = Vec::new();
            if let Some(identity) = &config.identity_file {
                keys.push(identity.clone());
            }
            if let Some(home) = std::env::var_os("HOME") {
                for name in DEFAULT_KEY_NAMES {
                    keys.push(Path::new(&home).join(".ssh").join(name));
                }
            }
            for key in keys {
                if key.exists()
                    && session
                        .userauth_pubkey_file(&config.user, None, &key, None)
                        .is_ok()
                    && session.authenticated()
                {
                    break;
                }
            }
        }
        if !session.authenticated() {
            return Err(EngineError::AuthFailed {
                user: config.user.clone(),
                host: config.host.clone(),
            });
        }

        let sftp = session.sftp().map_err(|e| EngineError::Ssh {
            op: "sftp",
            source: e,
        })?;

        Ok(RemoteTarget {
            base,
            host_label: format!("{}@{}", config.user, config.host),
            session,
            sftp,
            resume: config.resume,
            created_dirs: HashSet::new(),
        })
    }

    /// Run a command on the remote host, returning exit status and stdout.
    fn exec(&self, command: &str) -> Result<(i32, String), EngineError> {
        let mut channel = self.session.channel_session().map_err(|e| EngineError::Ssh {
            op: "channel",
            source: e,
        })?;
        channel.exec(command).map_err(|e| EngineError::Ssh {
            op: "exec",
            source: e,
        })?;

        let mut output = String::new();
        channel
            .read_to_string(&mut output)
            .map_err(|e| EngineError::RemoteCommandIo {
                command: command.to_string(),
                source: e,
            })?;
        channel.wait_close().map_err(|e| EngineError::Ssh {
            op: "close",
            source: e,
        })?;
        let status = channel.exit_status().map_err(|e| EngineError::Ssh {
            op: "exit status",
            source: e,
        })?;

        Ok((status, output))
    }

    /// Run a command and require exit status 0.
    fn run_checked(&self, command: &str) -> Result<String, EngineError> {
        let (status, output) = self.exec(command)?;
        if status != 0 {
            return Err(EngineError::RemoteCommand {
                command: command.to_string(),
                status,
            });
        }
        Ok(output)
    }

    /// Stamp the remote file's times from the source so the next run's
    /// size+mtime check holds. Called only after a complete write.
    fn stamp_mtime(&self, remote_path: &str, source: &SourceFile) -> Result<(), EngineError> {
        let secs = unix_seconds(source.modified).max(0) as u64;
        let stat = ssh2::FileStat {
            size: None,
            uid: None,
            gid: None,
            perm: None,
            atime: Some(secs),
            mtime: Some(secs),
        };
        self.sftp
            .setstat(Path::new(remote_path), stat)
            .map_err(|e| EngineError::Ssh {
                op: "setstat",
                source: e,
            })
    }

}

impl DestinationTarget for RemoteTarget {
    fn label(&self) -> String {
        format!("{}:{}", self.host_label, self.base)
    }

    fn check(&mut self) -> Result<(), EngineError> {
        let output = self.run_checked("echo ok")?;
        if output.trim() != "ok" {
            return Err(EngineError::RemoteReply {
                command: "echo ok".to_string(),
                output: output.trim().to_string(),
            });
        }
        info!("connected to {}", self.host_label);
        Ok(())
    }

    fn stat(&mut self, rel: &Path) -> Option<DestFingerprint> {
        let path = remote_join(&self.base, rel);
        match self.sftp.stat(Path::new(&path)) {
            Ok(stat) => {
                if !stat.is_file() {
                    return None;
                }
                let size = stat.size?;
                let mtime = stat.mtime?;
                Some(DestFingerprint {
                    size,
                    mtime_unix: mtime as i64,
                })
            }
            Err(e) => {
                debug!("remote stat {} failed: {}", path, e);
                None
            }
        }
    }

    fn ensure_dir(&mut self, rel: &Path) -> Result<(), EngineError> {
        let dir = remote_join(&self.base, rel);
        if self.created_dirs.contains(&dir) {
            return Ok(());
        }
        self.run_checked(&format!("mkdir -p {}", shell_quote(&dir)))?;
        self.created_dirs.insert(dir);
        Ok(())
    }

    fn content_hash(
        &mut self,
        _rel: &Path,
        _algorithm: ChecksumAlgorithm,
    ) -> Option<Result<ChecksumValue, EngineError>> {
        // Hashing over the network is not worth the occasional redundant
        // copy it would avoid; size+mtime agreement is final here.
        None
    }

    fn transfer(
        &mut self,
        source: &SourceFile,
        rel: &Path,
        progress: &mut dyn ProgressSink,
        cancel: Option<&AtomicBool>,
    ) -> Result<u64, EngineError> {
        let remote_path = remote_join(&self.base, rel);

        // Zero-byte files skip the streaming push entirely: create the
        // empty remote file and stamp its mtime.
        if source.size == 0 {
            let file = self
                .sftp
                .create(Path::new(&remote_path))
                .map_err(|e| EngineError::Ssh {
                    op: "create",
                    source: e,
                })?;
            drop(file);
            self.stamp_mtime(&remote_path, source)?;
            return Ok(0);
        }

        let existing = if self.resume { self.stat(rel) } else { None };
        let offset = resume_offset(self.resume, existing.as_ref(), source);

        let mut local = fs::File::open(&source.path).map_err(|e| EngineError::Read {
            path: source.path.clone(),
            source: e,
        })?;

        let mut remote = if offset > 0 {
            debug!("resuming {} from byte {}", remote_path, offset);
            let mut file = self
                .sftp
                .open_mode(
                    Path::new(&remote_path),
                    OpenFlags::WRITE,
                    0o644,
                    OpenType::File,
                )
                .map_err(|e| EngineError::Ssh {
                    op: "open",
                    source: e,
                })?;
            file.seek(SeekFrom::Start(offset))
                .map_err(|e| EngineError::Write {
                    path: PathBuf::from(&remote_path),
                    source: e,
                })?;
            local
                .seek(SeekFrom::Start(offset))
                .map_err(|e| EngineError::Read {
                    path: source.path.clone(),
                    source: e,
                })?;
            file
        } else {
            // Truncating create rewrites any existing file in place.
            self.sftp
                .create(Path::new(&remote_path))
                .map_err(|e| EngineError::Ssh {
                    op: "create",
                    source: e,
                })?
        };

        let mut buffer = [0u8; TRANSFER_BLOCK_SIZE];
        let mut reached = offset;

        loop {
            if cancel_requested(cancel) {
                return Err(EngineError::Cancelled);
            }

            let n = local.read(&mut buffer).map_err(|e| EngineError::Read {
                path: source.path.clone(),
                source: e,
            })?;
            if n == 0 {
                break;
            }

            remote
                .write_all(&buffer[..n])
                .map_err(|e| EngineError::Write {
                    path: PathBuf::from(&remote_path),
                    source: e,
                })?;

            reached += n as u64;
            progress.update(reached, source.size);
        }

        drop(remote);

        // Stamped only after the full content is across; a partial keeps a
        // non-matching mtime and is re-copied next run.
        self.stamp_mtime(&remote_path, source)?;

        Ok(reached - offset)
    }

    fn describe(&self, rel: &Path) -> String {
        format!("{}:{}", self.host_label, remote_join(&self.base, rel))
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.session
            .disconnect(None, "import run finished", None)
            .map_err(|e| EngineError::Ssh {
                op: "disconnect",
                source: e,
            })
    }
}
