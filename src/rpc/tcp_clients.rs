
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt, ReadBytesExt};
use log::{debug, trace};

use crate::error::{Result, transport};
use crate::xdr;
use super::{xdr_pack, xdr_unpack, CallHeader, LAST_FRAGMENT};

pub struct TcpClient {
    pub stream: TcpStream,
    pub prog: u32,
    pub vers: u32,
    pub lastxid: u32,
    pub packer: xdr::Packer,
    pub unpacker: xdr::Unpacker,
}

impl TcpClient {

    pub fn connect<A: ToSocketAddrs>(addr: A, prog: u32, vers: u32, timeout: Duration) -> Result<Self> {
        let mut last_err = None;
        for sock_addr in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&sock_addr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    stream.set_nodelay(true)?;
                    debug!("RPC program {:#x} v{} connected to {}", prog, vers, sock_addr);
                    return Ok(Self{ stream, prog, vers, lastxid: 0, packer: xdr::Packer::new(), unpacker: xdr::Unpacker::new() });
                },
                Err(e) => last_err = Some(e),
            }
        }

        match last_err {
            Some(e) => Err(e.into()),
            None    => Err(transport("Address did not resolve to any socket address")),
        }
    }

    /// Reset the packer and write a call header for procedure `prc`; arguments are packed afterwards
    pub fn start_call(&mut self, prc: u32) -> Result<()> {
        self.lastxid = self.lastxid.wrapping_add(1);
        self.packer.reset();
        let hdr = CallHeader::unauthenticated(self.lastxid, self.prog, self.vers, prc);
        xdr_pack::pack_callheader(&mut self.packer, &hdr)
    }

    /// Send the packed call and load the matching reply, past its header, into the unpacker
    pub fn do_call(&mut self) -> Result<()> {
        let call = self.packer.as_bytes();
        if !call.is_empty() {
            let mut send_bytes:Vec<u8> = Vec::with_capacity(call.len() + 4);
            send_bytes.write_u32::<BigEndian>(call.len() as u32 | LAST_FRAGMENT)?;
            send_bytes.extend_from_slice(call);
            self.stream.write_all(&send_bytes)?;
        }

        loop {
            let reply = self.read_record()?;

            // Load the response into the unpacker and make sure the xid matches
            self.unpacker.reset(&reply);
            let (xid, _) = xdr_unpack::unpack_replyheader(&mut self.unpacker)?;

            if xid == self.lastxid {
                return Ok(());
            } else if xid < self.lastxid {
                // Reply to a call we already gave up on
                trace!("Skipping stale RPC reply xid={} (expecting {})", xid, self.lastxid);
                continue;
            } else {
                return Err(transport("Received an RPC reply for a call that was never made"));
            }
        }
    }

    fn read_record(&mut self) -> Result<Vec<u8>> {
        let mut reply:Vec<u8> = vec![];

        let mut last:bool = false;
        while !last {
            let x:u32 = self.stream.read_u32::<BigEndian>()?;

            last = (x & LAST_FRAGMENT) != 0;
            let n = (x & !LAST_FRAGMENT) as usize;

            let start = reply.len();
            reply.resize(start + n, 0);
            self.stream.read_exact(&mut reply[start..])?;
        }

        Ok(reply)
    }

}
