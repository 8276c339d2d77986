
// Device core
pub const DEVICE_CORE_PROG:u32  = 0x0607af;
pub const DEVICE_CORE_VERS:u32  = 1;
pub const CREATE_LINK:u32       = 10;
pub const DEVICE_WRITE:u32      = 11;
pub const DEVICE_READ:u32       = 12;
pub const DESTROY_LINK:u32      = 23;

pub const CLIENT_ID:i32 = 3333;
pub const DEFAULT_LOCK_TIMEOUT:u32 = 10000;

pub const OPERATION_FLAGS_END:i32 = 8;

// Reason bits of a device_read reply
pub const REASON_REQCNT:i32 = 1;
pub const REASON_CHR:i32    = 2;
pub const REASON_END:i32    = 4;

use std::time::Duration;

use log::{debug, warn};

use crate::error::{Error, Result, transport};
use crate::rpc::port_mapping::{TcpPortMapperClient, Mapping, Protocol};
use crate::rpc::tcp_clients::TcpClient;

pub mod xdr_pack;

pub struct CoreClient {
    client: TcpClient,
    opt_link: Option<Link>,
    io_timeout_ms: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Link {
    pub link_id: i32,
    pub abort_port: u16,
    pub max_recv_size: u32,
}

fn device_error(code:i32) -> Error {
    let msg = match code {
        1  => "Syntax error",
        3  => "Device not accessible",
        4  => "Invalid link identifier",
        5  => "Parameter error",
        6  => "Channel not established",
        8  => "Operation not supported",
        9  => "Out of resources",
        11 => "Device locked by another link",
        12 => "No lock held by this link",
        15 => return Error::Timeout,
        17 => "I/O error",
        21 => "Invalid address",
        23 => "Abort",
        29 => "Channel already established",
        _  => return Error::Transport(format!("Unknown VXI-11 device error {}", code)),
    };
    transport(msg)
}

impl CoreClient {

    fn get_link(&self) -> Result<Link> {
        self.opt_link.ok_or(Error::NotConnected)
    }

    pub fn link(&self) -> Option<Link> { self.opt_link }

    pub fn new(host:&str, timeout:Duration) -> Result<Self> {

        // Find the port to use for the core program
        let mut pmap_client = TcpPortMapperClient::new(host, timeout)?;

        let mapping = Mapping {
            program: DEVICE_CORE_PROG,
            version: DEVICE_CORE_VERS,
            protocol: Protocol::TCP,
            port: 0,
        };

        let port = pmap_client.get_port(&mapping)?;

        let client = TcpClient::connect((host, port), DEVICE_CORE_PROG, DEVICE_CORE_VERS, timeout)?;
        let io_timeout_ms = timeout.as_millis().min(u32::MAX as u128) as u32;

        Ok(CoreClient { client, opt_link: None, io_timeout_ms })
    }

    pub fn create_link(&mut self, device:&str) -> Result<Link> {
        if self.opt_link.is_some() {
            return Err(transport("Already connected to a link"));
        }

        self.client.start_call(CREATE_LINK)?;
        xdr_pack::pack_create_link_parms(&mut self.client.packer, CLIENT_ID, false, DEFAULT_LOCK_TIMEOUT, device)?;
        self.client.do_call()?;

        let error:i32         = self.client.unpacker.unpack_i32()?;
        let link_id:i32       = self.client.unpacker.unpack_i32()?;
        let abort_port:u32    = self.client.unpacker.unpack_u32()?;
        let max_recv_size:u32 = self.client.unpacker.unpack_u32()?;

        if error != 0 {
            return Err(device_error(error));
        }

        let link = Link{ link_id, abort_port: abort_port as u16, max_recv_size: max_recv_size.max(1) };
        debug!("VXI-11 link {} to {} established (max_recv_size={})", link_id, device, link.max_recv_size);
        self.opt_link = Some(link);
        Ok(link)
    }

    /// Write a complete message, split into pieces the device accepts; END is set on the last piece only
    pub fn write(&mut self, data:&[u8]) -> Result<()> {
        let link = self.get_link()?;
        let piece_len = link.max_recv_size as usize;

        let mut pieces = data.chunks(piece_len).peekable();
        if pieces.peek().is_none() {
            return self.write_piece(link, data, true);
        }
        while let Some(piece) = pieces.next() {
            let last = pieces.peek().is_none();
            self.write_piece(link, piece, last)?;
        }
        Ok(())
    }

    fn write_piece(&mut self, link:Link, data:&[u8], last:bool) -> Result<()> {
        self.client.start_call(DEVICE_WRITE)?;
        let flags = if last { OPERATION_FLAGS_END } else { 0 };
        xdr_pack::pack_device_write_parms(&mut self.client.packer, link.link_id, self.io_timeout_ms, DEFAULT_LOCK_TIMEOUT, flags, data)?;
        self.client.do_call()?;

        let error:i32 = self.client.unpacker.unpack_i32()?;
        let size:u32  = self.client.unpacker.unpack_u32()?;

        if error != 0 {
            return Err(device_error(error));
        }
        if size as usize != data.len() {
            return Err(transport("Number of bytes in confirmation doesn't match number of bytes sent"));
        }
        Ok(())
    }

    fn read_piece(&mut self, link:Link, request_size:u32) -> Result<(i32, Vec<u8>)> {
        self.client.start_call(DEVICE_READ)?;
        xdr_pack::pack_device_read_parms(&mut self.client.packer, link.link_id, request_size, self.io_timeout_ms, DEFAULT_LOCK_TIMEOUT, 0, 0)?;
        self.client.do_call()?;

        let error:i32    = self.client.unpacker.unpack_i32()?;
        let reason:i32   = self.client.unpacker.unpack_i32()?;
        let data:Vec<u8> = self.client.unpacker.unpack_variable_len_opaque()?;

        if error != 0 {
            return Err(device_error(error));
        }
        if reason & !(REASON_REQCNT | REASON_CHR | REASON_END) != 0 {
            return Err(transport("Reserved bits set in device_read reason"));
        }
        Ok((reason, data))
    }

    /// Read one complete message, asking for at most `chunk_size` bytes per call
    pub fn read(&mut self, chunk_size:u32) -> Result<Vec<u8>> {
        let link = self.get_link()?;
        let mut ans:Vec<u8> = vec![];

        loop {
            let (reason, data) = self.read_piece(link, chunk_size)?;
            ans.extend_from_slice(&data);
            if reason & REASON_END != 0 {
                return Ok(ans);
            }
            if data.is_empty() && reason == 0 {
                return Err(transport("device_read returned no data and no reason"));
            }
        }
    }

    /// Read exactly `n` bytes, or fewer if the device ends the message first
    pub fn read_count(&mut self, n:usize) -> Result<Vec<u8>> {
        let link = self.get_link()?;
        let mut ans:Vec<u8> = Vec::with_capacity(n);

        while ans.len() < n {
            let wanted = (n - ans.len()).min(u32::MAX as usize) as u32;
            let (reason, data) = self.read_piece(link, wanted)?;
            ans.extend_from_slice(&data);
            if reason & REASON_END != 0 {
                break;
            }
            if data.is_empty() {
                return Err(transport("device_read returned no data"));
            }
        }

        Ok(ans)
    }

    pub fn destroy_link(&mut self) -> Result<()> {
        let link = match self.opt_link.take() {
            Some(link) => link,
            None => return Err(transport("No link to destroy")),
        };

        self.client.start_call(DESTROY_LINK)?;
        xdr_pack::pack_device_link(&mut self.client.packer, link.link_id)?;
        self.client.do_call()?;

        match self.client.unpacker.unpack_i32()? {
            0 => Ok(()),
            code => Err(device_error(code)),
        }
    }

}

impl Drop for CoreClient {

    fn drop(&mut self) {
        if self.opt_link.is_some() {
            if let Err(e) = self.destroy_link() {
                warn!("Unable to destroy VXI-11 link: {}", e);
            }
        }
    }

}
