use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// JSON newline-delimited request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clone_url: Option<String>,
}

impl DaemonRequest {
    pub fn command(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            ..Self::default()
        }
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// The payload of a successful response; daemon-side failures become
    /// [`DaemonError::Protocol`].
    pub fn into_data(self) -> Result<Value, DaemonError> {
        match (self.ok, self.error) {
            (true, _) => Ok(self.data.unwrap_or(Value::Null)),
            (false, Some(message)) => Err(DaemonError::Protocol(message)),
            (false, None) => Err(DaemonError::Protocol("unknown daemon error".to_string())),
        }
    }
}

const STATUS_ATTEMPTS: u32 = 5;
const STATUS_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Blocking client for the control socket. One connection per request.
#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket: PathBuf,
}

impl DaemonClient {
    pub fn new(home: &Path) -> Self {
        Self::at(socket_path(home))
    }

    pub fn at(socket: PathBuf) -> Self {
        Self { socket }
    }

    /// Write `request` as one line and read exactly one response line.
    pub fn send(&self, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
        let stream = self.connect()?;

        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        (&stream)
            .write_all(&line)
            .map_err(|e| io_err(&self.socket, e))?;

        let mut reply = String::new();
        BufReader::new(&stream)
            .read_line(&mut reply)
            .map_err(|e| io_err(&self.socket, e))?;
        if reply.is_empty() {
            return Err(DaemonError::Protocol(
                "daemon closed the connection without a response".to_string(),
            ));
        }
        Ok(serde_json::from_str(reply.trim_end())?)
    }

    pub fn call(&self, request: &DaemonRequest) -> Result<Value, DaemonError> {
        self.send(request)?.into_data()
    }

    fn connect(&self) -> Result<UnixStream, DaemonError> {
        let not_running = || DaemonError::DaemonNotRunning {
            socket: self.socket.clone(),
        };
        if !self.socket.exists() {
            return Err(not_running());
        }
        UnixStream::connect(&self.socket).map_err(|err| match err.kind() {
            ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => {
                not_running()
            }
            _ => io_err(&self.socket, err),
        })
    }
}

/// Send one request to the daemon under `home`.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    DaemonClient::new(home).send(request)
}

/// Status payload. Retries briefly so a just-started daemon has time to bind.
pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let client = DaemonClient::new(home);
    let request = DaemonRequest::command("status");

    let mut attempt = 1;
    loop {
        match client.call(&request) {
            Err(DaemonError::DaemonNotRunning { .. }) if attempt < STATUS_ATTEMPTS => {
                attempt += 1;
                sleep(STATUS_RETRY_DELAY);
            }
            result => return result,
        }
    }
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    DaemonClient::new(home)
        .call(&DaemonRequest::command("stop"))
        .map(|_| ())
}

/// Run one reconciliation pass in the daemon and return its summary.
pub fn request_sync(home: &Path) -> Result<Value, DaemonError> {
    DaemonClient::new(home).call(&DaemonRequest::command("sync"))
}

/// Hand one repository to the daemon's event intake.
pub fn request_mirror(home: &Path, name: &str, clone_url: &str) -> Result<Value, DaemonError> {
    let request = DaemonRequest {
        name: Some(name.to_string()),
        clone_url: Some(clone_url.to_string()),
        ..DaemonRequest::command("mirror")
    };
    DaemonClient::new(home).call(&request)
}
