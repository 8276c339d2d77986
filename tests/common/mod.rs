// In-memory SDS5034 that answers the SCPI subset the driver uses
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use labpanel::devices::sds5034::SDS5034;
use labpanel::transport::Transport;
use labpanel::{Error, Result};

pub const WAVE_DESC_LEN:usize = 346;

/// Index of 1 ms/div in the timebase table
pub const TDIV_1MS:i16 = 20;

#[derive(Clone)]
pub struct SimChannel {
	pub on: bool,
	/// WAV:DATA? on this channel never answers
	pub fail: bool,
	pub codes: Vec<u16>,
	pub v_per_div: f32,
	pub v_offset: f32,
	pub code_per_div: f32,
	pub probe: f32,
}

impl SimChannel {
	pub fn new(codes:Vec<u16>) -> Self {
		Self { on: true, fail: false, codes, v_per_div: 1.0, v_offset: 0.0, code_per_div: 25.0, probe: 1.0 }
	}
}

pub struct SimScope {
	pub model: String,
	pub running: bool,
	pub adc_bits: u8,
	pub max_chunk: usize,
	pub npts: usize,
	pub t_delay: f64,
	pub tdiv_index: i16,
	pub sample_interval: f32,
	pub channels: Vec<SimChannel>,
	/// Every command and query, in order
	pub log: Arc<Mutex<Vec<String>>>,
	/// (channel, first point, point count) of every WAV:DATA?
	pub transfers: Vec<(u8, usize, usize)>,
	registers: HashMap<String, String>,
	source: u8,
	start: usize,
	word: bool,
	pending: VecDeque<Result<Vec<u8>>>,
}

pub fn block(payload:&[u8]) -> Vec<u8> {
	let mut raw = format!("#9{:09}", payload.len()).into_bytes();
	raw.extend_from_slice(payload);
	raw.extend_from_slice(b"\n\n");
	raw
}

fn put(buf:&mut [u8], offset:usize, bytes:&[u8]) {
	buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn channel_of(key:&str) -> Option<usize> {
	let rest = key.strip_prefix("CHANnel")?;
	let n:usize = rest.get(..1)?.parse().ok()?;
	(1..=4).contains(&n).then(|| n - 1)
}

fn bad(cmd:&str) -> Error { Error::Transport(format!("simulator can't parse \"{}\"", cmd)) }

impl SimScope {
	/// Four channels, all on, each holding a `points` long ramp of 8-bit codes
	pub fn new(points:usize) -> Self {
		let ramp:Vec<u16> = (0..points).map(|i| (i % 256) as u16).collect();
		Self {
			model: "SDS5034X".into(),
			running: true,
			adc_bits: 8,
			max_chunk: points.max(1),
			npts: points,
			t_delay: 1e-6,
			tdiv_index: TDIV_1MS,
			sample_interval: 2e-9,
			channels: vec![SimChannel::new(ramp); 4],
			log: Arc::new(Mutex::new(vec![])),
			transfers: vec![],
			registers: HashMap::new(),
			source: 1,
			start: 0,
			word: false,
			pending: VecDeque::new(),
		}
	}

	/// Preset the reply to `<key>?`
	pub fn set(&mut self, key:&str, value:&str) -> &mut Self {
		self.registers.insert(key.to_owned(), value.to_owned());
		self
	}

	pub fn written(&self) -> Vec<String> { self.log.lock().clone() }

	pub fn connect(self) -> SDS5034<SimScope> {
		SDS5034::new(self).unwrap()
	}

	fn descriptor(&self) -> Vec<u8> {
		let ch = &self.channels[(self.source - 1) as usize];
		let mut d = vec![0u8; WAVE_DESC_LEN];
		put(&mut d, 0, b"WAVEDESC");
		put(&mut d, 16, b"WAVEACE");
		put(&mut d, 32, &(self.word as i16).to_le_bytes());
		put(&mut d, 36, &(WAVE_DESC_LEN as i32).to_le_bytes());
		put(&mut d, 76, b"Siglent SDS");
		put(&mut d, 116, &(ch.codes.len() as i32).to_le_bytes());
		put(&mut d, 136, &1i32.to_le_bytes());
		put(&mut d, 144, &1i32.to_le_bytes());
		put(&mut d, 148, &1i32.to_le_bytes());
		put(&mut d, 156, &ch.v_per_div.to_le_bytes());
		put(&mut d, 160, &ch.v_offset.to_le_bytes());
		put(&mut d, 164, &ch.code_per_div.to_le_bytes());
		put(&mut d, 172, &(self.adc_bits as i16).to_le_bytes());
		put(&mut d, 174, &1i16.to_le_bytes());
		put(&mut d, 176, &self.sample_interval.to_le_bytes());
		put(&mut d, 180, &self.t_delay.to_le_bytes());
		put(&mut d, 324, &self.tdiv_index.to_le_bytes());
		put(&mut d, 328, &ch.probe.to_le_bytes());
		// Firmware leaves this at C1 no matter the source
		put(&mut d, 344, &0i16.to_le_bytes());
		d
	}

	fn data_block(&mut self) -> Result<Vec<u8>> {
		let ch = &self.channels[(self.source - 1) as usize];
		if ch.fail {
			return Err(Error::Timeout);
		}

		let end = (self.start + self.npts).min(ch.codes.len());
		let start = self.start.min(end);
		let shift = 16 - self.adc_bits as u32;

		let mut payload = vec![];
		for &code in &ch.codes[start..end] {
			if self.word { payload.extend_from_slice(&(code << shift).to_le_bytes()); }
			else { payload.push(code as u8); }
		}

		self.transfers.push((self.source, start, end - start));
		Ok(block(&payload))
	}
}

impl Transport for SimScope {
	fn write(&mut self, command:&str) -> Result<()> {
		self.log.lock().push(command.to_owned());

		let (key, arg) = match command.split_once(' ') {
			Some((k, a)) => (k, Some(a.trim())),
			None => (command, None),
		};
		let num = |a:&str| a.parse::<usize>().map_err(|_| bad(command));

		match (key, arg) {
			("ACQuire:STATE", Some(a)) => self.running = a == "RUN",
			("ACQuire:RESolution", Some(a)) => {
				if !self.running {
					return Err(Error::Transport("resolution can only be changed while running".into()));
				}
				self.adc_bits = a.trim_end_matches('B').parse().map_err(|_| bad(command))?;
			},
			("WAVeform:SOURce", Some(a)) => self.source = a.trim_start_matches('C').parse().map_err(|_| bad(command))?,
			("WAVeform:STARt", Some(a)) => self.start = num(a)?,
			("WAVeform:POINt", Some(a)) => self.npts = num(a)?,
			("WAVeform:WIDTh", Some(a)) => self.word = a == "WORD",
			("WAV:DATA?", None) => {
				let reply = self.data_block();
				self.pending.push_back(reply);
			},
			("WAV:PREamble?", None) => {
				let reply = block(&self.descriptor());
				self.pending.push_back(Ok(reply));
			},
			(k, Some(a)) if k.ends_with(":SWITch") => {
				let ch = channel_of(k).ok_or_else(|| bad(command))?;
				self.channels[ch].on = a == "ON";
			},
			(k, Some(a)) => { self.registers.insert(k.to_owned(), a.to_owned()); },
			_ => {},
		}
		Ok(())
	}

	fn query(&mut self, command:&str) -> Result<String> {
		self.log.lock().push(command.to_owned());

		let key = command.trim_end_matches('?');
		let reply = match key {
			"*IDN"               => format!("Siglent Technologies,{},SDS5X0000001,3.8.12", self.model),
			"ACQ:STATE"          => (if self.running { "1" } else { "0" }).to_owned(),
			"ACQuire:RESolution" => format!("{}Bits", self.adc_bits),
			"WAVeform:SOURce"    => format!("C{}", self.source),
			"WAVeform:STARt"     => self.start.to_string(),
			// Float notation, as some firmware reports counts
			"WAVeform:POINt"     => format!("{:E}", self.npts as f64),
			"WAVeform:MAXPoint"  => format!("{:E}", self.max_chunk as f64),
			k if k.ends_with(":SWITch") => {
				let ch = channel_of(k).ok_or_else(|| bad(command))?;
				(if self.channels[ch].on { "ON" } else { "OFF" }).to_owned()
			},
			k => self.registers.get(k).cloned().ok_or(Error::Timeout)?,
		};
		Ok(reply)
	}

	fn read_bytes(&mut self, n:usize) -> Result<Vec<u8>> {
		let mut raw = self.read_raw()?;
		raw.truncate(n);
		Ok(raw)
	}

	fn read_raw(&mut self) -> Result<Vec<u8>> {
		self.pending.pop_front().unwrap_or(Err(Error::Timeout))
	}
}
