//! Galil DMC ASCII Protocol Implementation
//!
//! This module implements the low-level command framing used by Galil DMC
//! controllers (DMC-4080 and relatives) over their Ethernet interface.
//!
//! # Protocol Overview
//!
//! Commands are short ASCII mnemonics, optionally followed by an axis letter
//! and an argument (`SPA=100`, `BG A`, `TS A`). Each command is terminated
//! with a carriage return (`\r`, 0x0D).
//!
//! ## Response Format
//!
//! The controller answers every accepted command with its colon prompt `:`.
//! Queries prefix the prompt with the value and a CRLF:
//!
//! ```text
//!  46\r\n:
//! ```
//!
//! A rejected command is answered with `?` instead of the prompt.
//!
//! # Transport
//!
//! The DMC listens on TCP port 23. On connect it may emit a banner, which
//! is drained and discarded before the first command is sent.
//!
//! # Example
//!
//! ```no_run
//! use galil::dmc::DmcDevice;
//!
//! let mut device = DmcDevice::connect_default_port("192.168.0.40")?;
//!
//! // Query switch status of axis A
//! let response = device.command("TS A")?;
//! let value = DmcDevice::parse_integer(&response)?;
//! println!("TS A = {value:08b}");
//!
//! device.close();
//! # Ok::<(), galil::dmc::DmcError>(())
//! ```

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Default TCP port of the DMC Ethernet interface.
pub const DEFAULT_PORT: u16 = 23;

/// Default timeout for connect, read and write operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// How long to wait for a connect banner before sending the first command.
const BANNER_TIMEOUT: Duration = Duration::from_millis(500);

const CHUNK_SIZE: usize = 1024;

/// Colon prompt terminating every accepted command.
const PROMPT: u8 = b':';

/// Marker the controller sends when it rejects a command.
const REJECTED: u8 = b'?';

/// Errors that can occur during DMC communication.
#[derive(Error, Debug)]
pub enum DmcError {
    /// Low-level I/O error (socket read/write failure).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to establish TCP connection to the controller.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No complete response received within the timeout period.
    #[error("Timed out waiting for response")]
    Timeout,

    /// The controller closed the socket mid-response.
    #[error("Connection closed by remote host")]
    ConnectionClosed,

    /// The controller answered `?` to the given command.
    #[error("Command rejected by controller: {0}")]
    CommandRejected(String),

    /// Command text cannot be sent (non-ASCII).
    #[error("Invalid command: {0:?}")]
    InvalidCommand(String),

    /// Failed to parse a response value.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Motion profile parameters out of range.
    #[error("Invalid stepper profile: {0}")]
    InvalidProfile(String),
}

/// Result type for DMC operations.
pub type DmcResult<T> = Result<T, DmcError>;

/// Low-level DMC device communicating over TCP/IP.
///
/// Handles connection setup, CR-terminated command sending and
/// colon-terminated response reading. For typed axis operations use
/// [`Dmc4080`](super::Dmc4080) instead.
pub struct DmcDevice {
    stream: TcpStream,
    timeout: Duration,
    last_command: String,
}

impl DmcDevice {
    /// Connect to a controller using the default 1 second timeout.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> DmcResult<Self> {
        Self::connect_with_timeout(addr, DEFAULT_TIMEOUT)
    }

    /// Connect to a controller at the given IP using the default port (23).
    pub fn connect_default_port(ip: &str) -> DmcResult<Self> {
        Self::connect(default_port_addr(ip))
    }

    /// Connect to a controller, using `timeout` both for the TCP handshake
    /// and as the read/write timeout of the resulting stream.
    ///
    /// Every resolved address is tried in turn.
    ///
    /// # Errors
    ///
    /// Returns [`DmcError::ConnectionFailed`] if no address accepts the
    /// connection.
    pub fn connect_with_timeout<A: ToSocketAddrs>(addr: A, timeout: Duration) -> DmcResult<Self> {
        let addrs: Vec<SocketAddr> = addr
            .to_socket_addrs()
            .map_err(|e| DmcError::ConnectionFailed(format!("Invalid address: {e}")))?
            .collect();

        let mut last_error = None;
        for candidate in &addrs {
            info!("Connecting to {candidate}...");
            match TcpStream::connect_timeout(candidate, timeout) {
                Ok(stream) => return Self::from_stream(stream, timeout),
                Err(e) => last_error = Some(e),
            }
        }

        Err(DmcError::ConnectionFailed(match last_error {
            Some(e) => format!("Failed to connect: {e}"),
            None => "Address resolved to nothing".to_string(),
        }))
    }

    /// Wrap an already connected stream, applying `timeout` and draining any
    /// connect banner.
    pub fn from_stream(stream: TcpStream, timeout: Duration) -> DmcResult<Self> {
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "controller".to_string());

        let mut device = Self {
            stream,
            timeout,
            last_command: String::new(),
        };
        device.drain_banner()?;

        info!("Connected to {peer}");
        Ok(device)
    }

    /// Discard whatever the controller sends right after connecting.
    fn drain_banner(&mut self) -> DmcResult<()> {
        self.stream.set_read_timeout(Some(BANNER_TIMEOUT))?;

        let mut buf = [0u8; CHUNK_SIZE];
        match self.stream.read(&mut buf) {
            Ok(n) => debug!("Discarded {n} banner bytes"),
            Err(e) if is_timeout(&e) => trace!("No banner"),
            Err(e) => return Err(e.into()),
        }

        self.stream.set_read_timeout(Some(self.timeout))?;
        Ok(())
    }

    /// Current read/write timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Set the timeout for read/write operations.
    ///
    /// `MC` (motion complete) withholds its prompt until the axis stops, so
    /// long moves need a longer timeout than the 1 second default.
    pub fn set_timeout(&mut self, timeout: Duration) -> DmcResult<()> {
        self.stream.set_read_timeout(Some(timeout))?;
        self.stream.set_write_timeout(Some(timeout))?;
        self.timeout = timeout;
        Ok(())
    }

    /// Send a raw command. Surrounding whitespace is trimmed and a CR
    /// appended. Does not read the response.
    pub fn send(&mut self, command: &str) -> DmcResult<()> {
        let command = command.trim();
        if !command.is_ascii() {
            return Err(DmcError::InvalidCommand(command.to_string()));
        }

        let mut msg = String::with_capacity(command.len() + 1);
        msg.push_str(command);
        msg.push('\r');

        debug!("DMC send: {:?}", command);
        self.stream.write_all(msg.as_bytes())?;
        self.stream.flush()?;

        self.last_command = command.to_string();
        Ok(())
    }

    /// Read one response, up to and including the colon prompt.
    ///
    /// # Errors
    ///
    /// - [`DmcError::CommandRejected`] if the controller answers `?`
    /// - [`DmcError::ConnectionClosed`] if the peer closes the socket
    /// - [`DmcError::Timeout`] if no prompt arrives within the timeout
    pub fn read(&mut self) -> DmcResult<String> {
        let mut buf = [0u8; CHUNK_SIZE];
        let mut data = Vec::new();

        loop {
            let n = match self.stream.read(&mut buf) {
                Ok(0) => return Err(DmcError::ConnectionClosed),
                Ok(n) => n,
                Err(e) if is_timeout(&e) => return Err(DmcError::Timeout),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            let chunk = &buf[..n];
            data.extend_from_slice(chunk);

            if chunk.contains(&PROMPT) {
                break;
            }
            if chunk.contains(&REJECTED) {
                return Err(DmcError::CommandRejected(self.last_command.clone()));
            }
        }

        let response = Self::decode_response(&data);
        trace!("DMC recv: {:?}", response);
        Ok(response)
    }

    /// Send a command and read its response.
    pub fn command(&mut self, command: &str) -> DmcResult<String> {
        self.send(command)?;
        self.read()
    }

    /// Decode raw response bytes: non-ASCII bytes are dropped, whitespace
    /// trimmed, and the trailing prompt removed.
    ///
    /// # Example
    ///
    /// ```
    /// use galil::dmc::DmcDevice;
    ///
    /// assert_eq!(DmcDevice::decode_response(b" 46\r\n:"), "46");
    /// assert_eq!(DmcDevice::decode_response(b":"), "");
    /// ```
    pub fn decode_response(bytes: &[u8]) -> String {
        let text: String = bytes
            .iter()
            .filter(|b| b.is_ascii())
            .map(|&b| b as char)
            .collect();

        let trimmed = text.trim();
        trimmed
            .strip_suffix(':')
            .map(str::trim)
            .unwrap_or(trimmed)
            .to_string()
    }

    /// Parse a numeric response and truncate it toward zero.
    ///
    /// The controller reports integers either plain (` 46`) or in fixed
    /// point (`46.0000`).
    ///
    /// # Example
    ///
    /// ```
    /// use galil::dmc::DmcDevice;
    ///
    /// assert_eq!(DmcDevice::parse_integer("46.0000").unwrap(), 46);
    /// assert!(DmcDevice::parse_integer("abc").is_err());
    /// ```
    pub fn parse_integer(response: &str) -> DmcResult<i64> {
        let value: f64 = response
            .trim()
            .parse()
            .map_err(|_| DmcError::ParseError(format!("Invalid number: {}", response.trim())))?;

        if !value.is_finite() {
            return Err(DmcError::ParseError(format!("Non-finite value: {value}")));
        }
        Ok(value.trunc() as i64)
    }

    /// Shut the connection down. Failures are logged, not returned.
    pub fn close(self) {
        info!("Closing connection...");
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            warn!("Error closing socket: {e}");
        }
        info!("Connection closed.");
    }
}

/// `ip` paired with port 23. Accepts IPv6 literals without brackets.
pub(crate) fn default_port_addr(ip: &str) -> (&str, u16) {
    (ip, DEFAULT_PORT)
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock)
}
