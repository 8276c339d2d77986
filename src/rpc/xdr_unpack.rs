
use crate::error::{Result, transport};
use crate::xdr::Unpacker;
use crate::rpc::{OpaqueAuth, REPLY, MSG_DENIED, RPC_MISMATCH, AUTH_ERROR, MSG_ACCEPTED, PROG_UNAVAIL, PROG_MISMATCH, PROC_UNAVAIL, GARBAGE_ARGS, SUCCESS};

pub fn unpack_auth(unpacker:&mut Unpacker) -> Result<OpaqueAuth> {
	let flavor:i32  = unpacker.unpack_enum()?;
	let body:Vec<u8> = unpacker.unpack_variable_len_opaque()?;
	Ok(OpaqueAuth{ flavor, body })
}

/// Consume an accepted reply header, leaving the unpacker at the procedure results.
/// Returns the transaction id along with the server's verifier.
pub fn unpack_replyheader(unpacker:&mut Unpacker) -> Result<(u32, OpaqueAuth)> {
	let xid:u32 = unpacker.unpack_u32()?;

	if unpacker.unpack_enum()? != REPLY { return Err(transport("Expected REPLY message type in RPC reply header")); }

	match unpacker.unpack_enum()? {
		MSG_DENIED => {
			return match unpacker.unpack_enum()? {
				RPC_MISMATCH => {
					let low  = unpacker.unpack_u32()?;
					let high = unpacker.unpack_u32()?;
					Err(crate::Error::Transport(format!("RPC version mismatch, server supports {}..={}", low, high)))
				},
				AUTH_ERROR => {
					let stat = unpacker.unpack_u32()?;
					Err(crate::Error::Transport(format!("RPC authentication error (status {})", stat)))
				},
				_ => Err(transport("RPC message denied for an unknown reason")),
			};
		},
		MSG_ACCEPTED => { },
		_ => return Err(transport("Neither MSG_DENIED nor MSG_ACCEPTED in RPC reply header")),
	}

	let verf = unpack_auth(unpacker)?;

	match unpacker.unpack_enum()? {
		SUCCESS       => Ok((xid, verf)),
		PROG_UNAVAIL  => Err(transport("RPC program unavailable")),
		PROG_MISMATCH => {
			let low  = unpacker.unpack_u32()?;
			let high = unpacker.unpack_u32()?;
			Err(crate::Error::Transport(format!("RPC program version mismatch, server supports {}..={}", low, high)))
		},
		PROC_UNAVAIL  => Err(transport("RPC procedure unavailable")),
		GARBAGE_ARGS  => Err(transport("RPC server could not decode the arguments")),
		_             => Err(transport("RPC call failed for an unknown reason")),
	}
}
