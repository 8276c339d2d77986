
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};

use crate::error::{Error, Result, decode, invalid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Coupling { Dc, Ac, Gnd }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Impedance { OneMeg, Fifty }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelUnit { Volts, Amps }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMode { Auto, Normal, Single }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerStatus { Arm, Ready, Auto, Triggered, Stop, Roll }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerRun { Run, Stop }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveWidth { Byte, Word }

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SampleRate { Auto, Fixed(f64) }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepDirection { Left, Right }

impl Coupling {
	pub fn scpi(&self) -> &'static str { match self {
		Coupling::Dc  => "DC",
		Coupling::Ac  => "AC",
		Coupling::Gnd => "GND",
	}}

	pub fn from_reply(s:&str) -> Result<Self> {
		s.parse().map_err(|_| decode(format!("Unexpected coupling \"{}\"", s)))
	}
}

impl FromStr for Coupling {
	type Err = Error;
	fn from_str(s:&str) -> Result<Self> {
		match s.trim().to_uppercase().as_str() {
			"DC"  => Ok(Coupling::Dc),
			"AC"  => Ok(Coupling::Ac),
			"GND" => Ok(Coupling::Gnd),
			_     => Err(invalid("coupling must be one of DC, AC, or GND")),
		}
	}
}

impl Impedance {
	pub fn scpi(&self) -> &'static str { match self {
		Impedance::OneMeg => "ONEMeg",
		Impedance::Fifty  => "FIFTy",
	}}

	pub fn from_reply(s:&str) -> Result<Self> {
		match s.trim().to_uppercase().as_str() {
			"ONEMEG" => Ok(Impedance::OneMeg),
			"FIFTY"  => Ok(Impedance::Fifty),
			_        => Err(decode(format!("Unexpected device response \"{}\"", s.trim()))),
		}
	}
}

impl FromStr for Impedance {
	type Err = Error;
	fn from_str(s:&str) -> Result<Self> {
		match s.trim().to_uppercase().as_str() {
			"1M" | "1MEG" | "ONEMEG" => Ok(Impedance::OneMeg),
			"50" | "FIFTY"           => Ok(Impedance::Fifty),
			_                        => Err(invalid("impedance must be one of \"1M\" or \"50\"")),
		}
	}
}

impl fmt::Display for Impedance {
	fn fmt(&self, f:&mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self { Impedance::OneMeg => "1M", Impedance::Fifty => "50" })
	}
}

impl ChannelUnit {
	pub fn scpi(&self) -> &'static str { match self {
		ChannelUnit::Volts => "V",
		ChannelUnit::Amps  => "A",
	}}

	pub fn from_reply(s:&str) -> Result<Self> {
		s.parse().map_err(|_| decode(format!("Unexpected channel unit \"{}\"", s)))
	}
}

impl FromStr for ChannelUnit {
	type Err = Error;
	fn from_str(s:&str) -> Result<Self> {
		match s.trim().to_uppercase().as_str() {
			"V" => Ok(ChannelUnit::Volts),
			"A" => Ok(ChannelUnit::Amps),
			_   => Err(invalid("unit must be one of \"V\" or \"A\"")),
		}
	}
}

impl TriggerMode {
	pub fn scpi(&self) -> &'static str { match self {
		TriggerMode::Auto   => "AUTO",
		TriggerMode::Normal => "NORMal",
		TriggerMode::Single => "SINGle",
	}}

	pub fn from_reply(s:&str) -> Result<Self> {
		s.parse().map_err(|_| decode(format!("Unexpected trigger mode \"{}\"", s)))
	}
}

impl FromStr for TriggerMode {
	type Err = Error;
	fn from_str(s:&str) -> Result<Self> {
		// The device answers in either short or long form
		match s.trim().to_lowercase().as_str() {
			"auto"             => Ok(TriggerMode::Auto),
			"norm" | "normal"  => Ok(TriggerMode::Normal),
			"sing" | "single"  => Ok(TriggerMode::Single),
			_                  => Err(invalid("mode must be one of 'single', 'normal', or 'auto'")),
		}
	}
}

impl fmt::Display for TriggerMode {
	fn fmt(&self, f:&mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self { TriggerMode::Auto => "auto", TriggerMode::Normal => "normal", TriggerMode::Single => "single" })
	}
}

impl TriggerStatus {
	pub fn from_reply(s:&str) -> Result<Self> {
		match s.trim().to_lowercase().as_str() {
			"arm"    => Ok(TriggerStatus::Arm),
			"ready"  => Ok(TriggerStatus::Ready),
			"auto"   => Ok(TriggerStatus::Auto),
			"trig'd" => Ok(TriggerStatus::Triggered),
			"stop"   => Ok(TriggerStatus::Stop),
			"roll"   => Ok(TriggerStatus::Roll),
			_        => Err(decode(format!("Unexpected trigger status \"{}\"", s.trim()))),
		}
	}
}

impl FromStr for TriggerRun {
	type Err = Error;
	fn from_str(s:&str) -> Result<Self> {
		match s.trim().to_uppercase().as_str() {
			"RUN"  => Ok(TriggerRun::Run),
			"STOP" => Ok(TriggerRun::Stop),
			_      => Err(invalid("Bad state input, should be one of RUN or STOP")),
		}
	}
}

impl WaveWidth {
	pub fn scpi(&self) -> &'static str { match self {
		WaveWidth::Byte => "BYTE",
		WaveWidth::Word => "WORD",
	}}

	/// Transfer width needed to carry samples of an ADC with `nbits` resolution
	pub fn for_bits(nbits:u8) -> Self {
		if nbits > 8 { WaveWidth::Word } else { WaveWidth::Byte }
	}

	pub fn from_reply(s:&str) -> Result<Self> {
		match s.trim().to_uppercase().as_str() {
			"BYTE" => Ok(WaveWidth::Byte),
			"WORD" => Ok(WaveWidth::Word),
			_      => Err(decode(format!("Unexpected waveform width \"{}\"", s.trim()))),
		}
	}
}

impl FromStr for SampleRate {
	type Err = Error;
	fn from_str(s:&str) -> Result<Self> {
		let s = s.trim();
		if s.eq_ignore_ascii_case("auto") {
			return Ok(SampleRate::Auto);
		}
		match s.parse::<f64>() {
			Ok(r) if r > 0.0 && r.is_finite() => Ok(SampleRate::Fixed(r)),
			_ => Err(invalid(format!("sample rate must be \"auto\" or a positive number, not \"{}\"", s))),
		}
	}
}

impl FromStr for StepDirection {
	type Err = Error;
	fn from_str(s:&str) -> Result<Self> {
		match s.trim().to_lowercase().as_str() {
			"left"  => Ok(StepDirection::Left),
			"right" => Ok(StepDirection::Right),
			_       => Err(invalid("direction must be 'left' or 'right'")),
		}
	}
}
