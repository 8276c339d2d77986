// Request/response sessions with one instrument. Device drivers only see the `Transport` trait,
// so the same driver runs over VXI-11, a raw SCPI socket, or a scripted test double.

use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::str::{self, FromStr};
use std::time::Duration;

use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;

use crate::block;
use crate::config::TransportConfig;
use crate::error::{Error, Result, decode, invalid, transport};
use crate::vxi11::CoreClient;

lazy_static! {
    static ref VISA_INSTR_RE: Regex  = Regex::new(r"(?i)^TCPIP\d*::([^:]+)::(?:(inst\d+)::)?INSTR$").unwrap();
    static ref VISA_SOCKET_RE: Regex = Regex::new(r"(?i)^TCPIP\d*::([^:]+)::(\d+)::SOCKET$").unwrap();
    static ref HOST_PORT_RE: Regex   = Regex::new(r"^([^:\s]+):(\d+)$").unwrap();
    static ref HOST_RE: Regex        = Regex::new(r"^[A-Za-z0-9.\-]+$").unwrap();
}

pub const DEFAULT_SCPI_PORT:u16 = 5025;
pub const DEFAULT_VXI11_DEVICE:&str = "inst0";

pub trait Transport: Send {
    /// Send a command that produces no reply
    fn write(&mut self, command:&str) -> Result<()>;

    /// Send a command and return its text reply without the terminator
    fn query(&mut self, command:&str) -> Result<String>;

    /// Read exactly `n` bytes of whatever the device is sending
    fn read_bytes(&mut self, n:usize) -> Result<Vec<u8>>;

    /// Read one complete binary block response, header and terminator included
    fn read_raw(&mut self) -> Result<Vec<u8>>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, command:&str) -> Result<()> { (**self).write(command) }
    fn query(&mut self, command:&str) -> Result<String> { (**self).query(command) }
    fn read_bytes(&mut self, n:usize) -> Result<Vec<u8>> { (**self).read_bytes(n) }
    fn read_raw(&mut self) -> Result<Vec<u8>> { (**self).read_raw() }
}

fn reply_text(data:Vec<u8>) -> Result<String> {
    let s = String::from_utf8(data).map_err(|_| transport("Unable to parse response as UTF-8"))?;
    let trimmed = s.trim_end_matches(['\n', '\r']);
    if trimmed.is_empty() {
        return Err(transport("Device returned an empty reply"));
    }
    Ok(trimmed.to_owned())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Vxi11 { host: String, device: String },
    Socket { host: String, port: u16 },
}

impl Address {
    pub fn host(&self) -> &str {
        match self {
            Address::Vxi11 { host, .. } | Address::Socket { host, .. } => host,
        }
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s:&str) -> Result<Self> {
        let s = s.trim();
        let port = |p:&str| p.parse::<u16>().map_err(|_| invalid(format!("Invalid port in address \"{}\"", s)));

        if let Some(cap) = VISA_INSTR_RE.captures(s) {
            let device = cap.get(2).map_or(DEFAULT_VXI11_DEVICE, |m| m.as_str());
            return Ok(Address::Vxi11 { host: cap[1].to_owned(), device: device.to_owned() });
        }
        if let Some(cap) = VISA_SOCKET_RE.captures(s) {
            return Ok(Address::Socket { host: cap[1].to_owned(), port: port(&cap[2])? });
        }
        if let Some(cap) = HOST_PORT_RE.captures(s) {
            return Ok(Address::Socket { host: cap[1].to_owned(), port: port(&cap[2])? });
        }
        if HOST_RE.is_match(s) {
            return Ok(Address::Vxi11 { host: s.to_owned(), device: DEFAULT_VXI11_DEVICE.to_owned() });
        }
        Err(invalid(format!("Unrecognized instrument address \"{}\"", s)))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f:&mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Vxi11 { host, device } => write!(f, "TCPIP::{}::{}::INSTR", host, device),
            Address::Socket { host, port }  => write!(f, "TCPIP::{}::{}::SOCKET", host, port),
        }
    }
}

pub struct Vxi11Transport {
    core: CoreClient,
    chunk_size: u32,
}

impl Vxi11Transport {
    pub fn connect(host:&str, device:&str, cfg:&TransportConfig) -> Result<Self> {
        let mut core = CoreClient::new(host, cfg.timeout())?;
        core.create_link(device)?;
        let chunk_size = cfg.chunk_size.clamp(1, u32::MAX as usize) as u32;
        Ok(Self { core, chunk_size })
    }
}

impl Transport for Vxi11Transport {
    fn write(&mut self, command:&str) -> Result<()> {
        debug!("-> {}", command);
        self.core.write(command.as_bytes())
    }

    fn query(&mut self, command:&str) -> Result<String> {
        self.write(command)?;
        let reply = reply_text(self.core.read(self.chunk_size)?)?;
        debug!("<- {}", reply);
        Ok(reply)
    }

    fn read_bytes(&mut self, n:usize) -> Result<Vec<u8>> {
        self.core.read_count(n)
    }

    fn read_raw(&mut self) -> Result<Vec<u8>> {
        let data = self.core.read(self.chunk_size)?;
        debug!("<- {} byte block", data.len());
        Ok(data)
    }
}

pub struct SocketTransport {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl SocketTransport {
    pub fn connect(host:&str, port:u16, cfg:&TransportConfig) -> Result<Self> {
        let timeout = cfg.timeout();
        let sock_addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| transport("Address did not resolve to any socket address"))?;

        let writer = TcpStream::connect_timeout(&sock_addr, timeout)?;
        writer.set_read_timeout(Some(timeout))?;
        writer.set_write_timeout(Some(timeout))?;
        writer.set_nodelay(true)?;
        let reader = BufReader::with_capacity(cfg.chunk_size.clamp(4096, 1 << 24), writer.try_clone()?);

        Ok(Self { reader, writer })
    }

    fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = vec![];
        if self.reader.read_until(b'\n', &mut line)? == 0 {
            return Err(transport("Connection closed by instrument"));
        }
        Ok(line)
    }
}

impl Transport for SocketTransport {
    fn write(&mut self, command:&str) -> Result<()> {
        debug!("-> {}", command);
        let mut line = Vec::with_capacity(command.len() + 1);
        line.extend_from_slice(command.as_bytes());
        line.push(b'\n');
        self.writer.write_all(&line)?;
        Ok(())
    }

    fn query(&mut self, command:&str) -> Result<String> {
        self.write(command)?;

        // Blank lines are leftovers of a preceding block's two-byte terminator
        let mut line = self.read_line()?;
        while line.iter().all(|b| *b == b'\n' || *b == b'\r') {
            line = self.read_line()?;
        }

        let reply = reply_text(line)?;
        debug!("<- {}", reply);
        Ok(reply)
    }

    fn read_bytes(&mut self, n:usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.reader.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_raw(&mut self) -> Result<Vec<u8>> {
        // Header first: anything up to '#', the digit count, then the length digits
        let mut raw:Vec<u8> = vec![];
        loop {
            let b = self.read_bytes(1)?[0];
            raw.push(b);
            if b == b'#' { break; }
            if raw.len() > 64 { return Err(decode("no binary block header in the first 64 bytes")); }
        }
        raw.extend(self.read_bytes(1)?);
        let ndigits = match raw.last() {
            Some(d) if d.is_ascii_digit() => (d - b'0') as usize,
            _ => return Err(decode("binary block digit count is not a digit")),
        };
        raw.extend(self.read_bytes(ndigits)?);

        match block::parse_header(&raw)?.payload_len {
            Some(n) => {
                raw.extend(self.read_bytes(n)?);
                raw.extend(self.read_line()?);
            },
            // Indefinite blocks end at the first newline
            None => raw.extend(self.read_line()?),
        }

        debug!("<- {} byte block", raw.len());
        Ok(raw)
    }
}

/// Retries `write` and `query` a bounded number of times on link failures.
/// Block reads are never repeated since the stream position can't be rewound.
pub struct Retry<T> {
    inner: T,
    attempts: u32,
}

impl<T: Transport> Retry<T> {
    pub fn new(inner:T, retries:u32) -> Self { Self { inner, attempts: retries + 1 } }

    pub fn into_inner(self) -> T { self.inner }

    fn again<R>(&mut self, command:&str, mut op: impl FnMut(&mut T) -> Result<R>) -> Result<R> {
        let mut attempt = 1;
        loop {
            match op(&mut self.inner) {
                Err(e) if e.is_transport() && attempt < self.attempts => {
                    warn!("\"{}\" failed ({}), retrying {}/{}", command, e, attempt, self.attempts - 1);
                    attempt += 1;
                },
                other => return other,
            }
        }
    }
}

impl<T: Transport> Transport for Retry<T> {
    fn write(&mut self, command:&str) -> Result<()> { self.again(command, |t| t.write(command)) }
    fn query(&mut self, command:&str) -> Result<String> { self.again(command, |t| t.query(command)) }
    fn read_bytes(&mut self, n:usize) -> Result<Vec<u8>> { self.inner.read_bytes(n) }
    fn read_raw(&mut self) -> Result<Vec<u8>> { self.inner.read_raw() }
}

pub fn open(address:&Address, cfg:&TransportConfig) -> Result<Box<dyn Transport>> {
    info!("Connecting to {}", address);
    let inner:Box<dyn Transport> = match address {
        Address::Vxi11 { host, device } => Box::new(Vxi11Transport::connect(host, device, cfg)?),
        Address::Socket { host, port }  => Box::new(SocketTransport::connect(host, *port, cfg)?),
    };

    if cfg.retries > 0 {
        Ok(Box::new(Retry::new(inner, cfg.retries)))
    } else {
        Ok(inner)
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms.max(1)) }
}
