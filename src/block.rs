// IEEE 488.2 arbitrary block data: #<n><n length digits><payload>, optionally followed by a terminator.
// Siglent firmware answers WAV:DATA? and WAV:PREamble? this way.

use std::str;

use crate::error::{Result, decode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Offset of the first payload byte from the start of the buffer, including anything before `#`
    pub header_len: usize,
    /// Announced payload length; `None` for the indefinite `#0` form
    pub payload_len: Option<usize>,
}

/// Parse the header at the first `#` in `buf`.
///
/// Only the header itself has to be present; the payload may still be in flight.
pub fn parse_header(buf: &[u8]) -> Result<BlockHeader> {
    let mark = buf
        .iter()
        .position(|b| *b == b'#')
        .ok_or_else(|| decode("binary block has no '#' marker"))?;

    let ndigits = match buf.get(mark + 1) {
        Some(d) if d.is_ascii_digit() => (d - b'0') as usize,
        Some(_) => return Err(decode("binary block digit count is not a digit")),
        None => return Err(decode("binary block header truncated after '#'")),
    };

    if ndigits == 0 {
        return Ok(BlockHeader { header_len: mark + 2, payload_len: None });
    }

    let start = mark + 2;
    let digits = buf
        .get(start..start + ndigits)
        .ok_or_else(|| decode("binary block length field truncated"))?;
    if !digits.iter().all(u8::is_ascii_digit) {
        return Err(decode("binary block length field is not numeric"));
    }
    let payload_len = str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| decode("binary block length field out of range"))?;

    Ok(BlockHeader { header_len: start + ndigits, payload_len: Some(payload_len) })
}

/// Return exactly the payload of a complete block response, dropping header and terminator
pub fn payload(buf: &[u8]) -> Result<&[u8]> {
    let header = parse_header(buf)?;
    let body = &buf[header.header_len..];

    match header.payload_len {
        Some(n) => body.get(..n).ok_or_else(|| {
            decode(format!("binary block announced {} bytes but only {} arrived", n, body.len()))
        }),
        None => {
            let end = body.iter().rposition(|b| *b != b'\n' && *b != b'\r').map_or(0, |i| i + 1);
            Ok(&body[..end])
        }
    }
}
