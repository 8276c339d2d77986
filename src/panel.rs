// Operations behind the oscilloscope page of the lab panel. Each one returns a `Reply` that
// an HTTP layer can send as-is, `{"result": ...}`, with `ReplyStatus` picking the status code.

use std::time::Duration;

use log::{info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};

use crate::config::AppConfig;
use crate::devices::sds5034::{SDS5034, StepDirection};
use crate::error::{Error, ErrorKind, Result};
use crate::session::{DeviceSession, StepperHandle};

pub const CONNECTION_SUCCESSFUL:&str = "Connection Successful";
pub const CONNECTION_FAILED:&str = "Connection Failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReplyStatus {
	Ok,
	/// The instrument couldn't be reached
	ConnectionFailed,
	/// The request or the instrument's answer didn't make sense
	BadRequest,
}

impl ReplyStatus {
	pub fn http_code(&self) -> u16 {
		match self {
			ReplyStatus::Ok               => 200,
			ReplyStatus::ConnectionFailed => 502,
			ReplyStatus::BadRequest       => 400,
		}
	}

	pub fn for_error(e:&Error) -> Self {
		match e {
			Error::PartialRead { source, .. } => Self::for_error(source),
			_ => match e.kind() {
				ErrorKind::Transport => ReplyStatus::ConnectionFailed,
				ErrorKind::Decode | ErrorKind::InvalidArgument | ErrorKind::PartialRead => ReplyStatus::BadRequest,
			},
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
	pub result: Value,
	#[serde(skip)]
	pub status: ReplyStatus,
}

impl Reply {
	pub fn ok<V: Into<Value>>(result:V) -> Self {
		Self { result: result.into(), status: ReplyStatus::Ok }
	}

	/// Ok reply carrying `value` as JSON; a value that can't be represented is a bad request
	pub fn serialized<V: Serialize>(value:&V) -> Self {
		match serde_json::to_value(value) {
			Ok(v) => Self::ok(v),
			Err(e) => Self::from_error(&Error::from(e)),
		}
	}

	pub fn from_error(e:&Error) -> Self {
		let status = ReplyStatus::for_error(e);
		let result = match status {
			ReplyStatus::ConnectionFailed => Value::from(CONNECTION_FAILED),
			_ => Value::from(e.to_string()),
		};
		Self { result, status }
	}

	pub fn is_ok(&self) -> bool { self.status == ReplyStatus::Ok }

	pub fn to_json(&self) -> String { json!({ "result": self.result }).to_string() }
}

pub type Connector = Box<dyn Fn(&str, &AppConfig) -> Result<SDS5034> + Send + Sync>;

/// Owns the connection to the panel's oscilloscope, if any
pub struct Panel {
	config: AppConfig,
	connector: Connector,
	session: Mutex<Option<DeviceSession>>,
	stepper: Mutex<Option<StepperHandle>>,
}

impl Panel {
	pub fn new(config:AppConfig) -> Self {
		Self::with_connector(config, Box::new(|address:&str, cfg:&AppConfig| SDS5034::connect(address, cfg)))
	}

	/// Use `connector` instead of opening a network connection
	pub fn with_connector(config:AppConfig, connector:Connector) -> Self {
		Self { config, connector, session: Mutex::new(None), stepper: Mutex::new(None) }
	}

	pub fn config(&self) -> &AppConfig { &self.config }

	pub fn is_connected(&self) -> bool { self.session.lock().is_some() }

	/// Replace the current connection with one to `address`
	pub fn connect(&self, address:&str) -> Reply {
		self.stop_stepper();
		match (self.connector)(address, &self.config) {
			Ok(scope) => {
				*self.session.lock() = Some(DeviceSession::new(scope));
				info!("Panel connected to {}", address);
				Reply::ok(CONNECTION_SUCCESSFUL)
			},
			Err(e) => {
				warn!("Connecting to {} failed: {}", address, e);
				*self.session.lock() = None;
				Reply { result: Value::from(CONNECTION_FAILED), status: ReplyStatus::ConnectionFailed }
			},
		}
	}

	pub fn disconnect(&self) -> Reply {
		self.stop_stepper();
		*self.session.lock() = None;
		Reply::ok(Value::Null)
	}

	pub fn session(&self) -> Result<DeviceSession> {
		self.session.lock().clone().ok_or(Error::NotConnected)
	}

	fn call<R>(&self, what:&str, op: impl FnOnce(&mut SDS5034) -> Result<R>, into: impl FnOnce(R) -> Value) -> Reply {
		match self.session().and_then(|s| s.with(op)) {
			Ok(r) => Reply::ok(into(r)),
			Err(e) => {
				warn!("{} failed: {}", what, e);
				Reply::from_error(&e)
			},
		}
	}

	pub fn run(&self) -> Reply { self.call("run", |s| s.run(), |_| Value::Null) }

	pub fn stop(&self) -> Reply { self.call("stop", |s| s.stop(), |_| Value::Null) }

	pub fn get_time_scale(&self) -> Reply {
		self.call("get_time_scale", |s| s.get_time_scale(), Value::from)
	}

	pub fn set_time_scale(&self, scale:f64) -> Reply {
		self.call("set_time_scale", |s| s.set_time_scale(scale), |_| Value::Null)
	}

	pub fn get_ch_offset(&self, ch:u8) -> Reply {
		self.call("get_ch_offset", |s| s.get_ch_offset(ch), Value::from)
	}

	pub fn set_ch_offset(&self, ch:u8, offset:f64) -> Reply {
		self.call("set_ch_offset", |s| s.set_ch_offset(ch, offset), |_| Value::Null)
	}

	/// Measurement slot value as a fixed 8-decimal string
	pub fn get_measurement(&self, pos:usize) -> Reply {
		self.call("get_measurement", |s| s.get_measurement_item_value(pos), |v| Value::from(format!("{:.8}", v)))
	}

	pub fn set_screenshot(&self, name:&str) -> Reply {
		self.call("set_screenshot", |s| s.screenshot(name), |_| Value::from(true))
	}

	pub fn step_time_scale(&self, direction:StepDirection) -> Reply {
		self.call("step_time_scale", |s| s.step_time_scale(direction), Value::from)
	}

	/// Keep stepping the timebase until `stop_stepping` or the end of the table
	pub fn start_stepping(&self, direction:StepDirection) -> Reply {
		let session = match self.session() {
			Ok(s) => s,
			Err(e) => return Reply::from_error(&e),
		};
		self.stop_stepper();
		let interval = Duration::from_millis(self.config.acquisition.step_interval_ms);
		*self.stepper.lock() = Some(session.start_stepping(direction, interval));
		Reply::ok("success")
	}

	pub fn stop_stepping(&self) -> Reply {
		self.stop_stepper();
		Reply::ok("success")
	}

	fn stop_stepper(&self) {
		if let Some(stepper) = self.stepper.lock().take() {
			match stepper.stop() {
				Ok(steps) => info!("Timebase stepper stopped after {} step(s)", steps),
				Err(e) => warn!("Timebase stepper ended with an error: {}", e),
			}
		}
	}

	/// Read every displayed channel; channels that failed are listed next to the data
	pub fn read_waveforms(&self, start_point:usize) -> Reply {
		self.call("read_waveforms", |s| s.read_active_channels(start_point), |report| {
			let failures:Vec<Value> = report.failures.iter()
				.map(|e| match e {
					Error::PartialRead { channel, source } => json!({ "channel": channel, "error": source.to_string() }),
					other => json!({ "error": other.to_string() }),
				})
				.collect();
			json!({ "channels": report.set, "failures": failures })
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::decode;

	#[test]
	fn status_mapping() {
		assert_eq!(ReplyStatus::for_error(&Error::Timeout), ReplyStatus::ConnectionFailed);
		assert_eq!(ReplyStatus::for_error(&Error::NotConnected), ReplyStatus::ConnectionFailed);
		assert_eq!(ReplyStatus::for_error(&decode("short")), ReplyStatus::BadRequest);
		assert_eq!(ReplyStatus::for_error(&Error::InvalidArgument("x".into())), ReplyStatus::BadRequest);
		assert_eq!(ReplyStatus::for_error(&Error::partial(2, Error::Timeout)), ReplyStatus::ConnectionFailed);
		assert_eq!(ReplyStatus::ConnectionFailed.http_code(), 502);
		assert_eq!(ReplyStatus::BadRequest.http_code(), 400);
	}

	#[test]
	fn transport_errors_hide_detail() {
		let reply = Reply::from_error(&Error::Timeout);
		assert_eq!(reply.to_json(), r#"{"result":"Connection Failed"}"#);

		let reply = Reply::from_error(&Error::InvalidArgument("bits must be 8 or 10".into()));
		assert_eq!(reply.result, Value::from("Invalid argument: bits must be 8 or 10"));
	}

	#[test]
	fn unserializable_result_is_not_ok() {
		use std::collections::HashMap;

		assert_eq!(Reply::serialized(&vec![1.5, 2.0]).result, json!([1.5, 2.0]));

		// JSON object keys have to be strings
		let table:HashMap<(u8, u8), f64> = [((1, 2), 0.5)].into_iter().collect();
		let reply = Reply::serialized(&table);
		assert!(!reply.is_ok());
		assert_eq!(reply.status, ReplyStatus::BadRequest);
		assert!(reply.result.as_str().unwrap().starts_with("JSON error"));
	}

	#[test]
	fn not_connected_until_connect_succeeds() {
		let panel = Panel::with_connector(AppConfig::default(), Box::new(|_:&str, _:&AppConfig| -> Result<SDS5034> { Err(Error::Timeout) }));
		assert_eq!(panel.run().result, Value::from(CONNECTION_FAILED));

		let reply = panel.connect("10.0.0.5");
		assert_eq!(reply.result, Value::from(CONNECTION_FAILED));
		assert_eq!(reply.status, ReplyStatus::ConnectionFailed);
		assert!(!panel.is_connected());
	}
}
