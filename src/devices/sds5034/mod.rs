
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use serde::{Serialize, Deserialize};

use crate::config::AppConfig;
use crate::error::{Result, decode, invalid};
use crate::sink::{CsvSink, WaveformSink};
use crate::transport::{self, Address, Transport};

pub mod measurement;
pub mod preamble;
pub mod settings;
pub mod waveform;
mod timebase;

pub use preamble::{WavePreamble, PreambleStore, decode_preamble, TDIV_ENUM};
pub use settings::*;
pub use timebase::next_time_scale;
pub use waveform::{ActiveRead, PartialReadPolicy, WaveformSeries, WaveformSet};

use measurement::{DEFAULT_MEASUREMENTS, MEASUREMENT_SLOTS, measurement_token, slot_ok};

lazy_static! {
	static ref IDN_RE: Regex = Regex::new(r"^\s*([^,]+),([^,]+),([^,]+),([^,\s]+)").unwrap();
	static ref ADC_RE: Regex = Regex::new(r"(?i)^\s*(\d+)\s*(?:bits?)?\s*$").unwrap();
}

pub const CHANNELS:[u8; 4] = [1, 2, 3, 4];

// Probe attenuation accepted by CHANnel<n>:PROBe VALue, exclusive bounds
const PROBE_MIN:f64 = 1e-6;
const PROBE_MAX:f64 = 1e6;

pub(crate) fn chan_ok(n:u8) -> Result<()> {
	if CHANNELS.contains(&n) { Ok(()) }
	else { Err(invalid(format!("SDS5034 only has four channels, not C{}", n))) }
}

fn finite(value:f64, what:&str) -> Result<f64> {
	if value.is_finite() { Ok(value) }
	else { Err(invalid(format!("{} must be a finite number", what))) }
}

fn positive(value:f64, what:&str) -> Result<f64> {
	if value.is_finite() && value > 0.0 { Ok(value) }
	else { Err(invalid(format!("{} must be a positive number, not {}", what, value))) }
}

fn parse_f64(reply:&str, what:&str) -> Result<f64> {
	reply.trim().parse::<f64>().map_err(|_| decode(format!("Unable to parse {} from \"{}\"", what, reply.trim())))
}

// Counts come back in float notation on some firmware, e.g. 2.00E+04
fn parse_count(reply:&str, what:&str) -> Result<usize> {
	let value = parse_f64(reply, what)?;
	if value.is_finite() && value >= 0.0 && value <= usize::MAX as f64 { Ok(value.round() as usize) }
	else { Err(decode(format!("{} out of range: {}", what, value))) }
}

fn parse_on_off(reply:&str, what:&str) -> Result<bool> {
	match reply.trim().to_uppercase().as_str() {
		"ON"  | "1" => Ok(true),
		"OFF" | "0" => Ok(false),
		other => Err(decode(format!("Unexpected {} \"{}\"", what, other))),
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
	pub manufacturer: String,
	pub model: String,
	pub serial_num: String,
	pub fw_version: String,
}

impl FromStr for Identity {
	type Err = crate::Error;

	fn from_str(s:&str) -> Result<Self> {
		let caps = IDN_RE.captures(s).ok_or_else(|| decode(format!("Unable to parse *IDN? response \"{}\"", s.trim())))?;
		Ok(Self {
			manufacturer: caps[1].trim().to_owned(),
			model:        caps[2].trim().to_owned(),
			serial_num:   caps[3].trim().to_owned(),
			fw_version:   caps[4].trim().to_owned(),
		})
	}
}

/// Siglent SDS5000X series oscilloscope
pub struct SDS5034<T: Transport = Box<dyn Transport>> {
	transport: T,
	tx_throttle: Duration,
	partial_policy: PartialReadPolicy,
	sink: Option<Box<dyn WaveformSink>>,
	pub identity: Identity,
	/// Last preamble read for each channel
	pub preambles: PreambleStore,
	/// Last series read for each channel
	pub waveforms: WaveformSet,
}

impl SDS5034 {

	/// Open the instrument at `address` and apply the acquisition settings from `cfg`
	pub fn connect(address:&str, cfg:&AppConfig) -> Result<Self> {
		let address:Address = address.parse()?;
		let link = transport::open(&address, &cfg.transport)?;

		let mut scope = SDS5034::new(link)?
			.with_throttle(Duration::from_millis(cfg.transport.throttle_ms))
			.with_partial_policy(cfg.acquisition.partial_read);

		if cfg.acquisition.csv_sink {
			scope = scope.with_sink(Box::new(CsvSink::new(&cfg.acquisition.csv_path)));
		}

		info!("Connected to {} {} (fw {}) at {}", scope.identity.manufacturer, scope.identity.model, scope.identity.fw_version, address);
		Ok(scope)
	}

}

impl<T: Transport> SDS5034<T> {

	pub fn new(mut transport:T) -> Result<Self> {
		let identity:Identity = transport.query("*IDN?")?.parse()?;
		if !identity.model.to_uppercase().starts_with("SDS") {
			return Err(invalid(format!("Connected to a device but it doesn't appear to be an SDS oscilloscope ({})", identity.model)));
		}

		Ok(Self {
			transport,
			tx_throttle: Duration::ZERO,
			partial_policy: PartialReadPolicy::default(),
			sink: None,
			identity,
			preambles: PreambleStore::default(),
			waveforms: WaveformSet::default(),
		})
	}

	/// Pause before every command
	pub fn with_throttle(mut self, throttle:Duration) -> Self { self.tx_throttle = throttle; self }

	pub fn with_partial_policy(mut self, policy:PartialReadPolicy) -> Self { self.partial_policy = policy; self }

	/// Send every completed read to `sink` as well
	pub fn with_sink(mut self, sink:Box<dyn WaveformSink>) -> Self { self.sink = Some(sink); self }

	pub fn partial_policy(&self) -> PartialReadPolicy { self.partial_policy }
	pub fn transport(&self) -> &T { &self.transport }
	pub fn transport_mut(&mut self) -> &mut T { &mut self.transport }

	pub fn write(&mut self, cmd:&str) -> Result<()> {
		if !self.tx_throttle.is_zero() { thread::sleep(self.tx_throttle); }
		self.transport.write(cmd)
	}

	pub fn ask_str(&mut self, cmd:&str) -> Result<String> {
		if !self.tx_throttle.is_zero() { thread::sleep(self.tx_throttle); }
		self.transport.query(cmd)
	}

	fn ask_f64(&mut self, cmd:&str, what:&str) -> Result<f64> {
		let reply = self.ask_str(cmd)?;
		parse_f64(&reply, what)
	}

	fn ask_count(&mut self, cmd:&str, what:&str) -> Result<usize> {
		let reply = self.ask_str(cmd)?;
		parse_count(&reply, what)
	}

	// System

	pub fn get_id(&mut self) -> Result<Identity> {
		self.ask_str("*IDN?")?.parse()
	}

	/// Factory default setup
	pub fn default_setup(&mut self) -> Result<()> { self.write("*RST") }

	pub fn reboot(&mut self) -> Result<()> { self.write("SYSTem:REBoot") }

	// Acquisition

	pub fn run(&mut self) -> Result<()> { self.write("ACQuire:STATE RUN") }

	pub fn stop(&mut self) -> Result<()> { self.write("ACQuire:STATE STOP") }

	/// True while acquiring
	pub fn get_run_state(&mut self) -> Result<bool> {
		let reply = self.ask_str("ACQ:STATE?")?;
		match reply.trim().to_uppercase().as_str() {
			"1" | "RUN"  => Ok(true),
			"0" | "STOP" => Ok(false),
			other        => Err(decode(format!("Unexpected acquisition state \"{}\"", other))),
		}
	}

	pub fn set_run_state(&mut self, run:bool) -> Result<()> {
		if run { self.run() } else { self.stop() }
	}

	pub fn get_adc_resolution(&mut self) -> Result<u8> {
		let reply = self.ask_str("ACQuire:RESolution?")?;
		ADC_RE.captures(&reply)
			.and_then(|caps| caps[1].parse::<u8>().ok())
			.filter(|bits| (1..=16).contains(bits))
			.ok_or_else(|| decode(format!("Unexpected ADC resolution \"{}\"", reply.trim())))
	}

	/// Only accepted while running, so the scope is started for the change and stopped again
	/// afterwards if it was stopped before.
	pub fn set_adc_resolution(&mut self, bits:u8) -> Result<()> {
		if bits != 8 && bits != 10 {
			return Err(invalid(format!("bits must be 8 or 10, not {}", bits)));
		}

		let was_running = self.get_run_state()?;
		self.run()?;
		self.write(&format!("ACQuire:RESolution {}B", bits))?;
		if !was_running {
			self.stop()?;
		}
		Ok(())
	}

	pub fn get_sequence(&mut self) -> Result<bool> {
		let reply = self.ask_str("ACQuire:SEQuence?")?;
		parse_on_off(&reply, "sequence state")
	}

	pub fn set_sequence(&mut self, on:bool) -> Result<()> {
		self.write(if on { "ACQuire:SEQuence ON" } else { "ACQuire:SEQuence OFF" })
	}

	pub fn get_sequence_count(&mut self) -> Result<usize> {
		self.ask_count("ACQuire:SEQuence:COUNt?", "sequence count")
	}

	/// Number of memory segments, limited by the memory depth
	pub fn set_sequence_count(&mut self, count:usize) -> Result<()> {
		if !count.is_power_of_two() {
			return Err(invalid(format!("sequence count {} must be a power of two", count)));
		}
		self.write(&format!("ACQuire:SEQuence:COUNt {}", count))
	}

	/// Samples per second
	pub fn get_smpl_rate(&mut self) -> Result<f64> {
		self.ask_f64("ACQuire:SRATe?", "sample rate")
	}

	pub fn set_smpl_rate(&mut self, rate:SampleRate) -> Result<()> {
		match rate {
			SampleRate::Auto => self.write("ACQuire:MMANagement AUTO"),
			SampleRate::Fixed(r) => {
				let r = positive(r, "sample rate")?;
				self.write("ACQuire:MMANagement FSRate")?;
				self.write(&format!("ACQuire:SRATe {}", r))
			},
		}
	}

	// Channels

	pub fn get_ch_coupling(&mut self, ch:u8) -> Result<Coupling> {
		chan_ok(ch)?;
		let reply = self.ask_str(&format!("CHANnel{}:COUPling?", ch))?;
		Coupling::from_reply(&reply)
	}

	pub fn set_ch_coupling(&mut self, ch:u8, coupling:Coupling) -> Result<()> {
		chan_ok(ch)?;
		self.write(&format!("CHANnel{}:COUPling {}", ch, coupling.scpi()))
	}

	pub fn get_ch_impedance(&mut self, ch:u8) -> Result<Impedance> {
		chan_ok(ch)?;
		let reply = self.ask_str(&format!("CHANnel{}:IMP?", ch))?;
		Impedance::from_reply(&reply)
	}

	pub fn set_ch_impedance(&mut self, ch:u8, z:Impedance) -> Result<()> {
		chan_ok(ch)?;
		self.write(&format!("CHANnel{}:IMP {}", ch, z.scpi()))
	}

	/// Vertical offset in volts
	pub fn get_ch_offset(&mut self, ch:u8) -> Result<f64> {
		chan_ok(ch)?;
		self.ask_f64(&format!("CHANnel{}:OFFSet?", ch), "channel offset")
	}

	pub fn set_ch_offset(&mut self, ch:u8, offset:f64) -> Result<()> {
		chan_ok(ch)?;
		let offset = finite(offset, "offset")?;
		self.write(&format!("CHANnel{}:OFFSet {}", ch, offset))
	}

	pub fn get_ch_probe(&mut self, ch:u8) -> Result<f64> {
		chan_ok(ch)?;
		self.ask_f64(&format!("CHANnel{}:PROBe?", ch), "probe attenuation")
	}

	/// `None` restores the default attenuation
	pub fn set_ch_probe(&mut self, ch:u8, attenuation:Option<f64>) -> Result<()> {
		chan_ok(ch)?;
		match attenuation {
			None => self.write(&format!("CHANnel{}:PROBe DEFault", ch)),
			Some(a) if a > PROBE_MIN && a < PROBE_MAX => self.write(&format!("CHANnel{}:PROBe VALue {}", ch, a)),
			Some(a) => Err(invalid(format!("probe attenuation {} outside ({:E}, {:E})", a, PROBE_MIN, PROBE_MAX))),
		}
	}

	/// Volts per division
	pub fn get_ch_scale(&mut self, ch:u8) -> Result<f64> {
		chan_ok(ch)?;
		self.ask_f64(&format!("CHANnel{}:SCALe?", ch), "channel scale")
	}

	pub fn set_ch_scale(&mut self, ch:u8, scale:f64) -> Result<()> {
		chan_ok(ch)?;
		let scale = positive(scale, "scale")?;
		self.write(&format!("CHANnel{}:SCALe {}", ch, scale))
	}

	/// True when the channel is displayed
	pub fn get_ch_state(&mut self, ch:u8) -> Result<bool> {
		chan_ok(ch)?;
		let reply = self.ask_str(&format!("CHANnel{}:SWITch?", ch))?;
		parse_on_off(&reply, "channel state")
	}

	pub fn set_ch_state(&mut self, ch:u8, on:bool) -> Result<()> {
		chan_ok(ch)?;
		self.write(&format!("CHANnel{}:SWITch {}", ch, if on { "ON" } else { "OFF" }))
	}

	pub fn get_ch_unit(&mut self, ch:u8) -> Result<ChannelUnit> {
		chan_ok(ch)?;
		let reply = self.ask_str(&format!("CHANnel{}:UNIT?", ch))?;
		ChannelUnit::from_reply(&reply)
	}

	pub fn set_ch_unit(&mut self, ch:u8, unit:ChannelUnit) -> Result<()> {
		chan_ok(ch)?;
		self.write(&format!("CHANnel{}:UNIT {}", ch, unit.scpi()))
	}

	// Timebase

	/// Seconds between the trigger and the center of the screen
	pub fn get_time_delay(&mut self) -> Result<f64> {
		self.ask_f64("TIMebase:DELay?", "time delay")
	}

	pub fn set_time_delay(&mut self, delay:f64) -> Result<()> {
		let delay = finite(delay, "delay")?;
		self.write(&format!("TIMebase:DELay {:E}", delay))
	}

	/// Seconds per division
	pub fn get_time_scale(&mut self) -> Result<f64> {
		self.ask_f64("TIMebase:SCALe?", "time scale")
	}

	pub fn set_time_scale(&mut self, scale:f64) -> Result<()> {
		let scale = positive(scale, "time scale")?;
		self.write(&format!("TIMebase:SCALe {:E}", scale))
	}

	// Trigger

	pub fn get_trig_mode(&mut self) -> Result<TriggerMode> {
		let reply = self.ask_str("TRIGger:MODE?")?;
		TriggerMode::from_reply(&reply)
	}

	pub fn set_trig_mode(&mut self, mode:TriggerMode) -> Result<()> {
		self.write(&format!("TRIGger:MODE {}", mode.scpi()))
	}

	pub fn get_trig_state(&mut self) -> Result<TriggerStatus> {
		let reply = self.ask_str("TRIGger:STATus?")?;
		TriggerStatus::from_reply(&reply)
	}

	pub fn set_trig_state(&mut self, state:TriggerRun) -> Result<()> {
		self.write(match state {
			TriggerRun::Run  => "TRIGger:RUN",
			TriggerRun::Stop => "TRIGger:STOP",
		})
	}

	// Waveform transfer registers

	pub fn get_wave_ch(&mut self) -> Result<u8> {
		let reply = self.ask_str("WAVeform:SOURce?")?;
		let ch = reply.trim().strip_prefix('C')
			.and_then(|n| n.parse::<u8>().ok())
			.ok_or_else(|| decode(format!("Unexpected waveform source \"{}\"", reply.trim())))?;
		chan_ok(ch).map_err(|_| decode(format!("Waveform source C{} is not an analog channel", ch)))?;
		Ok(ch)
	}

	pub fn set_wave_ch(&mut self, ch:u8) -> Result<()> {
		chan_ok(ch)?;
		self.write(&format!("WAVeform:SOURce C{}", ch))
	}

	pub fn get_wave_startpt(&mut self) -> Result<usize> {
		self.ask_count("WAVeform:STARt?", "start point")
	}

	pub fn set_wave_startpt(&mut self, pt:usize) -> Result<()> {
		self.write(&format!("WAVeform:STARt {}", pt))
	}

	pub fn get_wave_interval(&mut self) -> Result<usize> {
		self.ask_count("WAVeform:INTerval?", "point interval")
	}

	pub fn set_wave_interval(&mut self, interval:usize) -> Result<()> {
		if interval == 0 {
			return Err(invalid("point interval must be at least 1"));
		}
		self.write(&format!("WAVeform:INTerval {}", interval))
	}

	/// Points to transfer; 0 means the whole record
	pub fn get_wave_npts(&mut self) -> Result<usize> {
		self.ask_count("WAVeform:POINt?", "point count")
	}

	pub fn set_wave_npts(&mut self, npts:usize) -> Result<()> {
		self.write(&format!("WAVeform:POINt {}", npts))
	}

	/// Largest number of points one WAV:DATA? returns
	pub fn get_wave_maxpt(&mut self) -> Result<usize> {
		self.ask_count("WAVeform:MAXPoint?", "max point count")
	}

	pub fn get_wave_width(&mut self) -> Result<WaveWidth> {
		let reply = self.ask_str("WAVeform:WIDTh?")?;
		WaveWidth::from_reply(&reply)
	}

	pub fn set_wave_width(&mut self, width:WaveWidth) -> Result<()> {
		self.write(&format!("WAVeform:WIDTh {}", width.scpi()))
	}

	/// Read and decode the preamble of `ch`, or of the current waveform source
	pub fn get_wave_preamble(&mut self, ch:Option<u8>) -> Result<WavePreamble> {
		let ch = match ch {
			Some(ch) => { self.set_wave_ch(ch)?; ch },
			None     => self.get_wave_ch()?,
		};
		self.read_preamble(ch)
	}

	fn read_preamble(&mut self, ch:u8) -> Result<WavePreamble> {
		self.write("WAV:PREamble?")?;
		let raw = self.transport.read_raw()?;
		let preamble = decode_preamble(&raw, Some(ch))?;
		debug!("C{} preamble: {} points, {} V/div, {} s/div", ch, preamble.data_npts, preamble.v_per_div, preamble.t_per_div);
		self.preambles.insert(preamble.clone());
		Ok(preamble)
	}

	// Measurements

	/// Install measurements into slots P1.. in order, by front-panel label or SCPI token.
	/// An empty list installs the default set.
	pub fn set_measurement_items(&mut self, names:&[&str]) -> Result<()> {
		let names:&[&str] = if names.is_empty() { &DEFAULT_MEASUREMENTS } else { names };
		if names.len() > MEASUREMENT_SLOTS {
			return Err(invalid(format!("{} measurements requested, only {} slots", names.len(), MEASUREMENT_SLOTS)));
		}

		let tokens = names.iter().map(|n| measurement_token(n)).collect::<Result<Vec<_>>>()?;
		for (n, token) in tokens.iter().enumerate() {
			self.write(&format!(":MEASure:ADVanced:P{}:TYPE {}", n + 1, token))?;
		}
		Ok(())
	}

	/// Current value of measurement slot `slot`, 1 through 12
	pub fn get_measurement_item_value(&mut self, slot:usize) -> Result<f64> {
		slot_ok(slot)?;
		self.ask_f64(&format!("MEAS:ADV:P{}:VAL?", slot), "measurement value")
	}

	// Misc

	/// Protocol configured on decode bus 1
	pub fn get_decode_protocol(&mut self) -> Result<String> {
		self.ask_str("DEC:BUS1:PROT?")
	}

	/// Save a PNG of the screen to the scope's USB drive as SIGLENT/<name>.png
	pub fn screenshot(&mut self, name:&str) -> Result<()> {
		let name = name.trim();
		if name.is_empty() || name.contains(['"', '/', '\\']) {
			return Err(invalid(format!("Invalid screenshot name \"{}\"", name)));
		}
		self.write(&format!("SAVE:IMAGe \"U-disk0/SIGLENT/{}.png\",PNG,ON", name))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identity() {
		let id:Identity = "Siglent Technologies,SDS5034X,SDS5XCAX5R0001,3.8.12.1.1.3.8\n".parse().unwrap();
		assert_eq!(id.manufacturer, "Siglent Technologies");
		assert_eq!(id.model, "SDS5034X");
		assert_eq!(id.serial_num, "SDS5XCAX5R0001");
		assert_eq!(id.fw_version, "3.8.12.1.1.3.8");
		assert!("garbage".parse::<Identity>().is_err());
	}

	#[test]
	fn counts_in_float_notation() {
		assert_eq!(parse_count("2.00E+04", "n").unwrap(), 20000);
		assert_eq!(parse_count("50000\n", "n").unwrap(), 50000);
		assert!(parse_count("-1", "n").is_err());
		assert!(parse_count("lots", "n").is_err());
	}

	#[test]
	fn channel_bounds() {
		assert!(chan_ok(1).is_ok());
		assert!(chan_ok(4).is_ok());
		assert!(chan_ok(0).is_err());
		assert!(chan_ok(5).is_err());
	}
}
