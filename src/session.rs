//! # Remote Session
//!
//! The [`RemoteSession`] trait is the boundary to the remote host. The
//! execution engine and the remote listing fetcher only talk to this trait,
//! so tests substitute an in-memory session.
//!
//! [`SshSession`] implements it on top of the system `ssh` client. `open()`
//! starts a ControlMaster connection on a private control socket and every
//! command is multiplexed over that one authenticated connection, which lets
//! many worker threads share the session concurrently. Since the system
//! client does the work, `~/.ssh/config`, known hosts and agent keys apply.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::sync::{Mutex, MutexGuard};

use dialoguer::{theme::ColorfulTheme, Input, Password};
use log::{error, info, warn};

use crate::credential::Credential;
use crate::defaults;
use crate::error::{Error, Result};

/// Exit status `ssh` itself uses for connection-level failures.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// A remote command runner shared by worker threads.
pub trait RemoteSession: Send + Sync {
    /// Open the session. A no-op when it is already open.
    fn open(&self) -> Result<()>;

    /// Close the session. A no-op when it is not open.
    fn close(&self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Run a command and return its standard output.
    ///
    /// Fails with [`Error::SessionClosed`] when the session is not usable.
    fn execute(&self, command: &str) -> Result<Vec<u8>>;

    /// Run a command, streaming its standard output into `sink`.
    fn execute_to(&self, command: &str, sink: &mut dyn Write) -> Result<()>;
}

/// Connection parameters for [`SshSession`].
#[derive(Debug, Clone)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    /// Prompt for the login and password on a terminal after a failed attempt.
    pub interactive: bool,
}

/// [`RemoteSession`] over a multiplexed system `ssh` connection.
#[derive(Debug)]
pub struct SshSession {
    target: SshTarget,
    credential: Mutex<Credential>,
    control_path: PathBuf,
    attempts: u32,
}

impl SshSession {
    pub fn new(target: SshTarget, credential: Credential) -> Self {
        let control_path =
            std::env::temp_dir().join(format!("dsjanitor-{}.sock", std::process::id()));
        Self {
            target,
            credential: Mutex::new(credential),
            control_path,
            attempts: defaults::SESSION_OPEN_ATTEMPTS,
        }
    }

    #[cfg(test)]
    fn with_control_path(mut self, control_path: PathBuf) -> Self {
        self.control_path = control_path;
        self
    }

    /// Credentials that opened the session (for `--save-user`).
    pub fn credential(&self) -> Result<Credential> {
        Ok(self.lock_credential()?.clone())
    }

    fn lock_credential(&self) -> Result<MutexGuard<'_, Credential>> {
        self.credential.lock().map_err(|_| Error::LockPoisoned {
            context: "session credential".to_string(),
        })
    }

    fn destination(&self, credential: &Credential) -> String {
        if credential.login.is_empty() {
            self.target.host.clone()
        } else {
            format!("{}@{}", credential.login, self.target.host)
        }
    }

    /// `ssh` (or `sshpass -e ssh` when a password is set) with the control
    /// socket options.
    fn ssh_command(&self, credential: &Credential) -> Command {
        let mut command = if credential.password.is_empty() {
            Command::new("ssh")
        } else {
            let mut command = Command::new("sshpass");
            command.env("SSHPASS", &credential.password).args(["-e", "ssh"]);
            command
        };
        command
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .arg("-p")
            .arg(self.target.port.to_string());
        command
    }

    fn try_open(&self, credential: &Credential) -> Result<()> {
        let mut command = self.ssh_command(credential);
        command.args([
            "-M",
            "-N",
            "-f",
            "-o",
            "ControlPersist=yes",
            "-o",
            "ConnectTimeout=30",
        ]);
        if credential.password.is_empty() {
            command.args(["-o", "BatchMode=yes"]);
        }
        let output = command
            .arg(self.destination(credential))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::SessionClosed {
                message: format!("cannot start ssh: {}", e),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::SessionClosed {
                message: stderr_line(&output),
            })
        }
    }

    fn prompt_credential(&self) -> Result<Credential> {
        let theme = ColorfulTheme::default();
        let login: String = Input::with_theme(&theme)
            .with_prompt(format!("Login for {}", self.target.host))
            .interact_text()
            .map_err(prompt_error)?;
        let password = Password::with_theme(&theme)
            .with_prompt("Password (empty for key authentication)")
            .allow_empty_password(true)
            .interact()
            .map_err(prompt_error)?;
        Ok(Credential::new(login, password))
    }

    fn control(&self, operation: &str) -> Result<Output> {
        let credential = self.credential()?;
        let mut command = Command::new("ssh");
        command
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .args(["-O", operation])
            .arg(self.destination(&credential))
            .stdin(Stdio::null());
        Ok(command.output()?)
    }

    fn command_for(&self, remote: &str) -> Result<Command> {
        let credential = self.credential()?;
        let mut command = Command::new("ssh");
        command
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .args(["-o", "ControlMaster=no", "-o", "BatchMode=yes"])
            .arg(self.destination(&credential))
            .arg("--")
            .arg(remote)
            .stdin(Stdio::null());
        Ok(command)
    }

    fn check_status(&self, command: &str, output: &Output) -> Result<()> {
        match output.status.code() {
            Some(0) => {
                info!("Complete:\t{} | Exit-status: 0", command);
                Ok(())
            }
            Some(SSH_CONNECTION_FAILURE) | None => Err(Error::SessionClosed {
                message: format!("{}: {}", command, stderr_line(output)),
            }),
            Some(code) => {
                warn!(
                    "Warning:\t{} | Exit-status: {} | {}",
                    command,
                    code,
                    stderr_line(output)
                );
                Ok(())
            }
        }
    }

    /// Commands only need the control socket to exist. A master that died
    /// behind it makes the command itself exit with 255.
    fn require_master(&self) -> Result<()> {
        if self.control_path.exists() {
            Ok(())
        } else {
            Err(Error::SessionClosed {
                message: "SSH session is closed".to_string(),
            })
        }
    }
}

impl RemoteSession for SshSession {
    fn open(&self) -> Result<()> {
        if self.is_open() {
            info!("Session is already opened");
            return Ok(());
        }

        for attempt in 1..=self.attempts {
            let mut credential = self.credential()?;
            if credential.is_empty() && self.target.interactive {
                credential = self.prompt_credential()?;
            }

            match self.try_open(&credential) {
                Ok(()) => {
                    *self.lock_credential()? = credential;
                    info!("Session is opened");
                    return Ok(());
                }
                Err(e) => {
                    error!("Access denied ({}/{}): {}", attempt, self.attempts, e);
                    if self.target.interactive {
                        // Force a fresh prompt on the next attempt.
                        *self.lock_credential()? = Credential::default();
                    }
                }
            }
        }

        Err(Error::Authentication {
            host: self.target.host.clone(),
            attempts: self.attempts,
        })
    }

    fn close(&self) -> Result<()> {
        if !self.is_open() {
            return Ok(());
        }
        let output = self.control("exit")?;
        if output.status.success() {
            info!("Session is closed");
        } else {
            warn!("Error closing SSH session: {}", stderr_line(&output));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        if !self.control_path.exists() {
            return false;
        }
        self.control("check")
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn execute(&self, command: &str) -> Result<Vec<u8>> {
        self.require_master()?;
        info!("Executing:\t{}", command);
        let output = self
            .command_for(command)?
            .output()
            .map_err(|e| Error::CommandFailed {
                command: command.to_string(),
                message: e.to_string(),
            })?;
        self.check_status(command, &output)?;
        Ok(output.stdout)
    }

    fn execute_to(&self, command: &str, sink: &mut dyn Write) -> Result<()> {
        self.require_master()?;
        info!("Executing:\t{}", command);
        let mut child = self
            .command_for(command)?
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::CommandFailed {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        if let Some(mut stdout) = child.stdout.take() {
            io::copy(&mut stdout, sink)?;
        }
        let mut stderr = Vec::new();
        if let Some(mut pipe) = child.stderr.take() {
            pipe.read_to_end(&mut stderr)?;
        }
        let status = child.wait()?;
        let output = Output {
            status,
            stdout: Vec::new(),
            stderr,
        };
        self.check_status(command, &output)
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error closing SSH session: {}", e);
        }
    }
}

fn stderr_line(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr)
        .replace('\n', " ")
        .trim()
        .to_string()
}

fn prompt_error(e: dialoguer::Error) -> Error {
    Error::Credential {
        message: format!("cannot read credentials: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(login: &str, password: &str) -> SshSession {
        SshSession::new(
            SshTarget {
                host: "etl.example.com".to_string(),
                port: 2222,
                interactive: false,
            },
            Credential::new(login, password),
        )
    }

    #[test]
    fn test_destination_with_and_without_login() {
        let s = session("dsadm", "");
        assert_eq!(s.destination(&Credential::new("dsadm", "")), "dsadm@etl.example.com");
        assert_eq!(s.destination(&Credential::default()), "etl.example.com");
    }

    #[test]
    fn test_password_uses_sshpass() {
        let s = session("dsadm", "pw");
        let command = s.ssh_command(&Credential::new("dsadm", "pw"));
        assert_eq!(command.get_program(), "sshpass");
        let args: Vec<_> = command.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(&args[..2], ["-e", "ssh"]);
        assert!(args.contains(&"2222".to_string()));
    }

    #[test]
    fn test_key_auth_uses_ssh_directly() {
        let s = session("dsadm", "");
        let command = s.ssh_command(&Credential::new("dsadm", ""));
        assert_eq!(command.get_program(), "ssh");
    }

    #[test]
    fn test_unopened_session_rejects_commands() {
        let s = session("dsadm", "");
        assert!(!s.is_open());
        let err = s.execute("true").unwrap_err();
        assert!(err.is_session_error());
        let mut sink = Vec::new();
        assert!(s.execute_to("true", &mut sink).unwrap_err().is_session_error());
    }

    #[test]
    fn test_commands_check_only_the_control_socket() {
        let temp = tempfile::TempDir::new().unwrap();
        let socket = temp.path().join("master.sock");
        let s = session("dsadm", "").with_control_path(socket.clone());
        assert!(s.require_master().unwrap_err().is_session_error());

        // No `ssh -O check` round trip: the socket being there is enough.
        std::fs::write(&socket, "").unwrap();
        assert!(s.require_master().is_ok());
        std::fs::remove_file(&socket).unwrap();
    }

    #[test]
    fn test_close_without_open_is_noop() {
        assert!(session("dsadm", "").close().is_ok());
    }
}
