
use crate::error::Result;
use crate::xdr::Packer;
use crate::rpc::{CallHeader, OpaqueAuth, CALL, RPCVERSION, REPLY, MSG_ACCEPTED, SUCCESS};
use crate::rpc::port_mapping::Mapping;

pub fn pack_auth(packer:&mut Packer, auth:&OpaqueAuth) -> Result<()> {
	packer.pack_enum(auth.flavor)?;
	packer.pack_variable_len_opaque(&auth.body)
}

pub fn pack_callheader(packer:&mut Packer, hdr:&CallHeader) -> Result<()> {
	packer.pack_u32(hdr.xid)?;
	packer.pack_enum(CALL)?;
	packer.pack_u32(RPCVERSION)?;
	for field in [hdr.prog, hdr.vers, hdr.procedure] {
		packer.pack_u32(field)?;
	}
	pack_auth(packer, &hdr.cred)?;
	pack_auth(packer, &hdr.verf)
}

/// Accepted, successful reply header. Only servers send these; the client tests use it to
/// stand in for a peer.
pub fn pack_replyheader(packer:&mut Packer, xid:u32, verf:&OpaqueAuth) -> Result<()> {
	packer.pack_u32(xid)?;
	packer.pack_enum(REPLY)?;
	packer.pack_enum(MSG_ACCEPTED)?;
	pack_auth(packer, verf)?;
	packer.pack_enum(SUCCESS)
}

pub fn pack_mapping(packer:&mut Packer, m:&Mapping) -> Result<()> {
	for field in [m.program, m.version, m.protocol.to_u32(), m.port] {
		packer.pack_u32(field)?;
	}
	Ok(())
}
