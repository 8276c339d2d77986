// Waveform transfer: pull raw ADC codes in chunks, then scale them with the channel's preamble

use std::collections::{BTreeMap, HashMap};

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, warn};
use serde::{Serialize, Deserialize};

use crate::block;
use crate::error::{Error, Result, decode, invalid};
use crate::transport::Transport;
use super::{SDS5034, CHANNELS, chan_ok};
use super::preamble::WavePreamble;
use super::settings::WaveWidth;

/// Horizontal divisions on screen
pub const HORI_NUM:f64 = 10.0;

/// Deepest per-channel acquisition memory on the SDS5000X series
pub const MAX_MEMORY_DEPTH:usize = 250_000_000;

/// What `read_active_channels` does when one channel can't be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialReadPolicy {
	/// Report the failure and keep the channels that did arrive
	#[default]
	Tolerate,
	/// Give up on the first failed channel
	Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaveformSeries {
	pub channel: u8,
	pub time_s: Vec<f64>,
	/// Volts, or amps when the channel unit is A
	pub values: Vec<f64>,
}

impl WaveformSeries {
	pub fn len(&self) -> usize { self.values.len() }
	pub fn is_empty(&self) -> bool { self.values.is_empty() }

	pub fn column_name(&self) -> String { format!("C{}", self.channel) }

	pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
		self.time_s.iter().copied().zip(self.values.iter().copied())
	}
}

/// One series per channel; a new read of a channel replaces its column
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WaveformSet {
	series: BTreeMap<u8, WaveformSeries>,
}

impl WaveformSet {
	pub fn insert(&mut self, series:WaveformSeries) -> Option<WaveformSeries> {
		self.series.insert(series.channel, series)
	}

	pub fn merge_from(&mut self, other:&WaveformSet) {
		for s in other.series.values() {
			self.insert(s.clone());
		}
	}

	pub fn get(&self, ch:u8) -> Option<&WaveformSeries> { self.series.get(&ch) }
	pub fn remove(&mut self, ch:u8) -> Option<WaveformSeries> { self.series.remove(&ch) }

	pub fn channels(&self) -> Vec<u8> { self.series.keys().copied().collect() }
	pub fn series(&self) -> impl Iterator<Item = &WaveformSeries> { self.series.values() }

	pub fn len(&self) -> usize { self.series.len() }
	pub fn is_empty(&self) -> bool { self.series.is_empty() }

	/// Column-join on time: one row per distinct time stamp, `None` where a channel has no sample
	pub fn rows(&self) -> Vec<(f64, Vec<Option<f64>>)> {
		let mut times:Vec<f64> = self.series.values().flat_map(|s| s.time_s.iter().copied()).collect();
		times.sort_by(f64::total_cmp);
		times.dedup_by(|a, b| a.to_bits() == b.to_bits());

		let lookups:Vec<HashMap<u64, f64>> = self.series.values()
			.map(|s| s.iter().map(|(t, v)| (t.to_bits(), v)).collect())
			.collect();

		times.into_iter()
			.map(|t| (t, lookups.iter().map(|m| m.get(&t.to_bits()).copied()).collect()))
			.collect()
	}
}

/// Outcome of reading every displayed channel
#[derive(Debug, Default)]
pub struct ActiveRead {
	pub set: WaveformSet,
	/// One `Error::PartialRead` per channel that failed
	pub failures: Vec<Error>,
}

impl ActiveRead {
	pub fn is_complete(&self) -> bool { self.failures.is_empty() }

	pub fn failed_channels(&self) -> Vec<u8> {
		self.failures.iter()
			.filter_map(|e| match e { Error::PartialRead { channel, .. } => Some(*channel), _ => None })
			.collect()
	}
}

/// Split a transfer payload into ADC codes; words are little-endian and left-aligned
pub fn decode_codes(raw:&[u8], width:WaveWidth, nbits:u8) -> Vec<u16> {
	match width {
		WaveWidth::Byte => raw.iter().map(|b| *b as u16).collect(),
		WaveWidth::Word => {
			let shift = 16u32.saturating_sub(nbits as u32);
			raw.chunks_exact(2).map(|pair| LittleEndian::read_u16(pair) >> shift).collect()
		},
	}
}

/// Two's-complement interpretation of an ADC code. 10-bit codes are first divided by 4.
pub fn signed_code(code:u16, nbits:u8) -> f64 {
	let full = (1u64 << nbits) as f64;
	let value = if nbits == 10 { code as f64 / 4.0 } else { code as f64 };
	if value >= full / 2.0 { value - full } else { value }
}

pub fn to_physical(codes:&[u16], nbits:u8, preamble:&WavePreamble) -> Result<Vec<f64>> {
	let code_per_div = preamble.code_per_div as f64;
	if !(code_per_div > 0.0) {
		return Err(decode(format!("code_per_div must be positive, got {}", code_per_div)));
	}
	Ok(codes.iter()
		.map(|c| signed_code(*c, nbits) / code_per_div * preamble.v_per_div - preamble.v_offset)
		.collect())
}

/// Time of each sample relative to the trigger, left screen edge first
pub fn time_axis(preamble:&WavePreamble, n:usize) -> Vec<f64> {
	let t0 = -preamble.t_delay_s - (preamble.t_per_div * HORI_NUM / 2.0);
	let dt = preamble.sample_interval as f64;
	(0..n).map(|i| t0 + i as f64 * dt).collect()
}

impl<T: Transport> SDS5034<T> {

	/// Read one channel in volts, starting at point `start_point` of acquisition memory
	pub fn read_channel(&mut self, ch:u8, start_point:usize) -> Result<WaveformSeries> {
		let series = self.fetch_channel(ch, start_point)?;
		if let Some(sink) = self.sink.as_mut() {
			if let Err(e) = sink.write_series(&series) {
				warn!("Waveform sink failed for C{}: {}", ch, e);
			}
		}
		Ok(series)
	}

	/// Stop acquisition and read every channel that is switched on.
	///
	/// Acquisition is left stopped afterwards.
	pub fn read_active_channels(&mut self, start_point:usize) -> Result<ActiveRead> {
		self.stop()?;

		let mut report = ActiveRead::default();
		for ch in CHANNELS {
			let outcome = match self.get_ch_state(ch) {
				Ok(true)  => self.fetch_channel(ch, start_point).map(Some),
				Ok(false) => Ok(None),
				Err(e)    => Err(e),
			};

			match outcome {
				Ok(Some(series)) => { report.set.insert(series); },
				Ok(None) => debug!("C{} is off, skipping", ch),
				Err(e) => {
					let err = Error::partial(ch, e);
					if self.partial_policy == PartialReadPolicy::Abort {
						return Err(err);
					}
					warn!("{}", err);
					report.failures.push(err);
				},
			}
		}

		if let Some(sink) = self.sink.as_mut() {
			if let Err(e) = sink.write_set(&report.set) {
				warn!("Waveform sink failed: {}", e);
			}
		}

		info!("Read channels {:?}, {} failed", report.set.channels(), report.failures.len());
		Ok(report)
	}

	fn fetch_channel(&mut self, ch:u8, start_point:usize) -> Result<WaveformSeries> {
		chan_ok(ch)?;

		self.set_wave_startpt(start_point)?;
		self.set_wave_ch(ch)?;

		let mut points = self.get_wave_npts()?;
		let max_chunk = self.get_wave_maxpt()?;
		if max_chunk == 0 {
			return Err(decode("device reported a zero transfer chunk size"));
		}

		if points == 0 {
			let preamble = self.read_preamble(ch)?;
			points = usize::try_from(preamble.data_npts).map_err(|_| decode("negative point count in preamble"))?;
			self.set_wave_npts(points)?;
		}
		if points > MAX_MEMORY_DEPTH {
			return Err(decode(format!("C{} point count {} exceeds the {} point acquisition memory", ch, points, MAX_MEMORY_DEPTH)));
		}
		if start_point.checked_add(points).is_none() {
			return Err(invalid(format!("start point {} is past the end of acquisition memory", start_point)));
		}

		let lowered = points > max_chunk;
		if lowered {
			self.set_wave_npts(max_chunk)?;
		}
		let transfer = self.transfer_chunks(ch, start_point, points, max_chunk);

		// The next read takes its total from this register, failed transfer or not
		let restored = if lowered { self.set_wave_npts(points) } else { Ok(()) };
		let (raw, width, nbits) = transfer?;
		restored?;

		let mut codes = decode_codes(&raw, width, nbits);
		codes.truncate(points);

		let preamble = self.read_preamble(ch)?;
		let values = to_physical(&codes, nbits, &preamble)?;
		let time_s = time_axis(&preamble, values.len());
		let series = WaveformSeries{ channel: ch, time_s, values };

		info!("C{}: {} points, {}-bit", ch, series.len(), nbits);
		self.waveforms.insert(series.clone());
		Ok(series)
	}

	/// Pull `points` codes from the current source, `max_chunk` at a time
	fn transfer_chunks(&mut self, ch:u8, start_point:usize, points:usize, max_chunk:usize) -> Result<(Vec<u8>, WaveWidth, u8)> {
		let nbits = self.get_adc_resolution()?;
		let width = WaveWidth::for_bits(nbits);
		self.set_wave_width(width)?;

		let chunks = points.div_ceil(max_chunk);
		let bytes_per_point = if width == WaveWidth::Word { 2 } else { 1 };
		let mut raw:Vec<u8> = Vec::with_capacity(points.min(max_chunk) * bytes_per_point);

		// Each chunk needs its start register set first, so this can only run sequentially
		for i in 0..chunks {
			self.set_wave_startpt(start_point + i * max_chunk)?;
			self.write("WAV:DATA?")?;
			let block_resp = self.transport.read_raw()?;
			let data = block::payload(&block_resp)?;
			debug!("C{} chunk {}/{}: {} bytes", ch, i + 1, chunks, data.len());
			raw.extend_from_slice(data);
		}
		Ok((raw, width, nbits))
	}

}
