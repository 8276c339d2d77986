// WAVEDESC: the binary descriptor returned by WAV:PREamble?. Field offsets are from the
// SDS5000X programming guide (waveform transfer chapter), all values little-endian.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::ops::Range;

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::block;
use crate::error::{Result, decode};
use super::settings::Coupling;

/// Length of the WAVEDESC block; every decoded field lies inside it
pub const WAVE_DESC_LEN:usize = 346;

/// Seconds per division, indexed by the enumerated timebase code
pub const TDIV_ENUM:[f64; 39] = [
	200e-12, 500e-12,
	1e-9, 2e-9, 5e-9, 10e-9, 20e-9, 50e-9, 100e-9, 200e-9, 500e-9,
	1e-6, 2e-6, 5e-6, 10e-6, 20e-6, 50e-6, 100e-6, 200e-6, 500e-6,
	1e-3, 2e-3, 5e-3, 10e-3, 20e-3, 50e-3, 100e-3, 200e-3, 500e-3,
	1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0,
];

// Firmware reports code_per_div scaled by 16 on some vertical gains
const CODE_PER_DIV_LIMIT:f32 = 256.0;
const CODE_PER_DIV_SCALE:f32 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommType { Byte, Word }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommOrder { Lsb, Msb }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Bandwidth { Off, Mhz20, Mhz200 }

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WavePreamble {
	pub descriptor: String,
	pub template: String,
	pub comm_type: CommType,
	pub comm_order: CommOrder,
	pub wave_desc_bytes: i32,
	/// Bytes in the first data array of this transfer
	pub data_bytes: i32,
	pub instrument_name: String,
	/// Points in the data array; per frame when sequence mode is on
	pub data_npts: i32,
	pub data_first_pt: i32,
	pub data_interval: i32,
	pub read_frames: i32,
	pub sum_frames: i32,
	pub v_per_div_raw: f32,
	pub v_offset_raw: f32,
	pub code_per_div: f32,
	pub adc_bit: i16,
	pub frame_index: i16,
	pub sample_interval: f32,
	/// Seconds between the trigger and the first data point
	pub t_delay_s: f64,
	pub t_per_div: f64,
	pub coupling: Coupling,
	pub probe_atten: f32,
	pub fixed_v_gain: i16,
	pub bandwidth: Bandwidth,
	pub channel: u8,
	/// Vertical scale with probe attenuation applied
	pub v_per_div: f64,
	/// Vertical offset with probe attenuation applied
	pub v_offset: f64,
}

struct Desc<'a> {
	buf: &'a [u8],
}

impl<'a> Desc<'a> {

	fn at(&self, offset:usize) -> Cursor<&'a [u8]> {
		let mut rdr = Cursor::new(self.buf);
		rdr.set_position(offset as u64);
		rdr
	}

	fn i16_at(&self, offset:usize) -> Result<i16> { Ok(self.at(offset).read_i16::<LittleEndian>()?) }
	fn i32_at(&self, offset:usize) -> Result<i32> { Ok(self.at(offset).read_i32::<LittleEndian>()?) }
	fn f32_at(&self, offset:usize) -> Result<f32> { Ok(self.at(offset).read_f32::<LittleEndian>()?) }
	fn f64_at(&self, offset:usize) -> Result<f64> { Ok(self.at(offset).read_f64::<LittleEndian>()?) }

	fn str_at(&self, range:Range<usize>) -> String {
		String::from_utf8_lossy(&self.buf[range]).replace('\0', "")
	}

	fn enum_at<T:Copy>(&self, offset:usize, table:&[T], field:&str) -> Result<T> {
		let idx = self.i16_at(offset)?;
		usize::try_from(idx).ok()
			.and_then(|i| table.get(i).copied())
			.ok_or_else(|| decode(format!("{} index {} out of range 0..{}", field, idx, table.len())))
	}

}

/// Strip a block header if there is one and return the descriptor bytes
fn descriptor_bytes(raw:&[u8]) -> Result<&[u8]> {
	let first = raw.iter().position(|b| !b.is_ascii_whitespace());
	match first {
		Some(i) if raw[i] == b'#' => block::payload(raw),
		_ => Ok(raw),
	}
}

/// Adjust the reported code_per_div for the firmware's scaled encoding
pub fn normalize_code_per_div(raw:f32) -> f32 {
	if raw > CODE_PER_DIV_LIMIT { raw / CODE_PER_DIV_SCALE } else { raw }
}

/// Decode a WAV:PREamble? response, with or without its block header.
///
/// `channel_hint` overrides the wave source field, which some firmware leaves stale.
pub fn decode_preamble(raw:&[u8], channel_hint:Option<u8>) -> Result<WavePreamble> {
	let buf = descriptor_bytes(raw)?;
	if buf.len() < WAVE_DESC_LEN {
		return Err(decode(format!("preamble is {} bytes, need at least {}", buf.len(), WAVE_DESC_LEN)));
	}
	let d = Desc{ buf };

	let t_per_div = d.enum_at(324, &TDIV_ENUM, "timebase")?;
	let coupling  = d.enum_at(326, &[Coupling::Dc, Coupling::Ac, Coupling::Gnd], "coupling")?;
	let bandwidth = d.enum_at(334, &[Bandwidth::Off, Bandwidth::Mhz20, Bandwidth::Mhz200], "bandwidth")?;
	let channel = match channel_hint {
		Some(ch) => ch,
		None     => d.enum_at(344, &[1u8, 2, 3, 4], "wave source")?,
	};

	let v_per_div_raw = d.f32_at(156)?;
	let v_offset_raw  = d.f32_at(160)?;
	let probe_atten   = d.f32_at(328)?;

	Ok(WavePreamble {
		descriptor:      d.str_at(0..16),
		template:        d.str_at(16..32),
		comm_type:       d.enum_at(32, &[CommType::Byte, CommType::Word], "comm_type")?,
		comm_order:      d.enum_at(34, &[CommOrder::Lsb, CommOrder::Msb], "comm_order")?,
		wave_desc_bytes: d.i32_at(36)?,
		data_bytes:      d.i32_at(60)?,
		instrument_name: d.str_at(76..92),
		data_npts:       d.i32_at(116)?,
		data_first_pt:   d.i32_at(132)?,
		data_interval:   d.i32_at(136)?,
		read_frames:     d.i32_at(144)?,
		sum_frames:      d.i32_at(148)?,
		v_per_div_raw,
		v_offset_raw,
		code_per_div:    normalize_code_per_div(d.f32_at(164)?),
		adc_bit:         d.i16_at(172)?,
		frame_index:     d.i16_at(174)?,
		sample_interval: d.f32_at(176)?,
		t_delay_s:       d.f64_at(180)?,
		t_per_div,
		coupling,
		probe_atten,
		fixed_v_gain:    d.i16_at(332)?,
		bandwidth,
		channel,
		v_per_div:       v_per_div_raw as f64 * probe_atten as f64,
		v_offset:        v_offset_raw as f64 * probe_atten as f64,
	})
}

/// Last preamble read for each channel
#[derive(Debug, Clone, Default)]
pub struct PreambleStore {
	by_channel: BTreeMap<u8, WavePreamble>,
}

impl PreambleStore {
	pub fn insert(&mut self, preamble:WavePreamble) -> Option<WavePreamble> {
		self.by_channel.insert(preamble.channel, preamble)
	}

	pub fn get(&self, ch:u8) -> Option<&WavePreamble> { self.by_channel.get(&ch) }

	pub fn channels(&self) -> impl Iterator<Item = u8> + '_ { self.by_channel.keys().copied() }

	pub fn len(&self) -> usize { self.by_channel.len() }
	pub fn is_empty(&self) -> bool { self.by_channel.is_empty() }

	pub fn clear(&mut self) { self.by_channel.clear(); }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn put(buf:&mut [u8], offset:usize, bytes:&[u8]) {
		buf[offset..offset + bytes.len()].copy_from_slice(bytes);
	}

	fn sample_desc() -> Vec<u8> {
		let mut d = vec![0u8; WAVE_DESC_LEN];
		put(&mut d, 0, b"WAVEDESC");
		put(&mut d, 16, b"WAVEACE");
		put(&mut d, 32, &1i16.to_le_bytes());
		put(&mut d, 36, &346i32.to_le_bytes());
		put(&mut d, 60, &2000i32.to_le_bytes());
		put(&mut d, 76, b"Siglent SDS");
		put(&mut d, 116, &1000i32.to_le_bytes());
		put(&mut d, 136, &1i32.to_le_bytes());
		put(&mut d, 144, &1i32.to_le_bytes());
		put(&mut d, 148, &1i32.to_le_bytes());
		put(&mut d, 156, &0.5f32.to_le_bytes());
		put(&mut d, 160, &0.25f32.to_le_bytes());
		put(&mut d, 164, &30.0f32.to_le_bytes());
		put(&mut d, 172, &10i16.to_le_bytes());
		put(&mut d, 174, &1i16.to_le_bytes());
		put(&mut d, 176, &2e-9f32.to_le_bytes());
		put(&mut d, 180, &1e-6f64.to_le_bytes());
		put(&mut d, 324, &20i16.to_le_bytes());
		put(&mut d, 326, &1i16.to_le_bytes());
		put(&mut d, 328, &10.0f32.to_le_bytes());
		put(&mut d, 334, &2i16.to_le_bytes());
		put(&mut d, 344, &2i16.to_le_bytes());
		d
	}

	fn with_header(desc:&[u8]) -> Vec<u8> {
		let mut raw = format!("#9{:09}", desc.len()).into_bytes();
		raw.extend_from_slice(desc);
		raw.extend_from_slice(b"\n\n");
		raw
	}

	#[test]
	fn decodes_every_field() {
		let p = decode_preamble(&with_header(&sample_desc()), None).unwrap();

		assert_eq!(p.descriptor, "WAVEDESC");
		assert_eq!(p.template, "WAVEACE");
		assert_eq!(p.comm_type, CommType::Word);
		assert_eq!(p.comm_order, CommOrder::Lsb);
		assert_eq!(p.wave_desc_bytes, 346);
		assert_eq!(p.data_bytes, 2000);
		assert_eq!(p.instrument_name, "Siglent SDS");
		assert_eq!(p.data_npts, 1000);
		assert_eq!(p.data_first_pt, 0);
		assert_eq!(p.data_interval, 1);
		assert_eq!((p.read_frames, p.sum_frames, p.frame_index), (1, 1, 1));
		assert_eq!(p.adc_bit, 10);
		assert_eq!(p.code_per_div, 30.0);
		assert_eq!(p.sample_interval, 2e-9f32);
		assert_eq!(p.t_delay_s, 1e-6);
		assert_eq!(p.t_per_div, 1e-3);
		assert_eq!(p.coupling, Coupling::Ac);
		assert_eq!(p.bandwidth, Bandwidth::Mhz200);
		assert_eq!(p.channel, 3);
		assert_eq!(p.v_per_div, 5.0);
		assert_eq!(p.v_offset, 2.5);
	}

	#[test]
	fn bare_descriptor_and_block_decode_alike() {
		let desc = sample_desc();
		assert_eq!(decode_preamble(&desc, Some(1)).unwrap(), decode_preamble(&with_header(&desc), Some(1)).unwrap());
	}

	#[test]
	fn decoding_is_deterministic() {
		let raw = with_header(&sample_desc());
		assert_eq!(decode_preamble(&raw, None).unwrap(), decode_preamble(&raw, None).unwrap());
	}

	#[test]
	fn channel_hint_overrides_wave_source() {
		let p = decode_preamble(&sample_desc(), Some(4)).unwrap();
		assert_eq!(p.channel, 4);
	}

	#[test]
	fn large_code_per_div_is_divided_by_16() {
		let mut desc = sample_desc();
		put(&mut desc, 164, &480.0f32.to_le_bytes());
		assert_eq!(decode_preamble(&desc, None).unwrap().code_per_div, 30.0);

		put(&mut desc, 164, &256.0f32.to_le_bytes());
		assert_eq!(decode_preamble(&desc, None).unwrap().code_per_div, 256.0);
	}

	#[test]
	fn timebase_table_bounds() {
		assert_eq!(TDIV_ENUM[0], 200e-12);
		assert_eq!(TDIV_ENUM[38], 1000.0);

		let mut desc = sample_desc();
		put(&mut desc, 324, &38i16.to_le_bytes());
		assert_eq!(decode_preamble(&desc, None).unwrap().t_per_div, 1000.0);

		put(&mut desc, 324, &39i16.to_le_bytes());
		assert!(decode_preamble(&desc, None).is_err());

		put(&mut desc, 324, &(-1i16).to_le_bytes());
		assert!(decode_preamble(&desc, None).is_err());
	}

	#[test]
	fn out_of_range_enums_fail() {
		let mut desc = sample_desc();
		put(&mut desc, 326, &3i16.to_le_bytes());
		let e = decode_preamble(&desc, None).unwrap_err();
		assert_eq!(e.kind(), crate::error::ErrorKind::Decode);

		let mut desc = sample_desc();
		put(&mut desc, 344, &4i16.to_le_bytes());
		assert!(decode_preamble(&desc, None).is_err());
		assert!(decode_preamble(&desc, Some(1)).is_ok());
	}

	#[test]
	fn short_input_fails() {
		let desc = sample_desc();
		assert!(decode_preamble(&desc[..WAVE_DESC_LEN - 1], None).is_err());

		// Header announces the full block but the transfer was cut short
		let mut raw = with_header(&desc);
		raw.truncate(200);
		assert!(decode_preamble(&raw, None).is_err());
	}

	#[test]
	fn store_keeps_latest_per_channel() {
		let mut store = PreambleStore::default();
		let mut p = decode_preamble(&sample_desc(), Some(1)).unwrap();
		assert!(store.insert(p.clone()).is_none());
		p.data_npts = 5;
		assert!(store.insert(p).is_some());
		assert_eq!(store.get(1).unwrap().data_npts, 5);
		assert_eq!(store.channels().collect::<Vec<_>>(), vec![1]);
	}
}
