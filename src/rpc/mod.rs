// ONC RPC v2 (RFC 5531) over TCP, just enough to reach the port mapper and the VXI-11 core channel

pub mod xdr_unpack;
pub mod xdr_pack;

pub mod port_mapping;

pub mod tcp_clients;

pub const RPCVERSION:u32 = 2;

// msg_type
pub const CALL:i32  = 0;
pub const REPLY:i32 = 1;

// reply_stat
pub const MSG_ACCEPTED:i32 = 0;
pub const MSG_DENIED:i32   = 1;

// reject_stat
pub const RPC_MISMATCH:i32 = 0;
pub const AUTH_ERROR:i32   = 1;

// accept_stat
pub const SUCCESS:i32       = 0;
pub const PROG_UNAVAIL:i32  = 1;
pub const PROG_MISMATCH:i32 = 2;
pub const PROC_UNAVAIL:i32  = 3;
pub const GARBAGE_ARGS:i32  = 4;

pub const AUTH_NONE:i32 = 0;

pub const IPPROTO_TCP:u32 = 6;

/// Record marking: high bit of the fragment header flags the last fragment of a record
pub const LAST_FRAGMENT:u32 = 0x8000_0000;

/// Credential or verifier carried in a message header
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OpaqueAuth {
	pub flavor: i32,
	pub body: Vec<u8>,
}

impl OpaqueAuth {
	pub fn none() -> Self { Self{ flavor: AUTH_NONE, body: vec![] } }
}

/// Everything in a call message ahead of the procedure arguments
#[derive(Debug, Clone)]
pub struct CallHeader {
	pub xid: u32,
	pub prog: u32,
	pub vers: u32,
	pub procedure: u32,
	pub cred: OpaqueAuth,
	pub verf: OpaqueAuth,
}

impl CallHeader {
	/// Header with AUTH_NONE credentials, the only flavor instruments ask for
	pub fn unauthenticated(xid:u32, prog:u32, vers:u32, procedure:u32) -> Self {
		Self{ xid, prog, vers, procedure, cred: OpaqueAuth::none(), verf: OpaqueAuth::none() }
	}
}
