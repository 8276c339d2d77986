
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info, LevelFilter};

use labpanel::config::load_config_or_default;
use labpanel::devices::sds5034::StepDirection;
use labpanel::panel::{Panel, Reply};

#[derive(Parser, Debug)]
#[command(name = "labpanel")]
#[command(about = "Drive the bench oscilloscope the way the lab panel does", long_about = None)]
struct Args {
	/// Path to configuration file, labpanel.toml in the working directory by default
	#[arg(short, long, value_name = "FILE")]
	config: Option<PathBuf>,

	/// Override log level (trace, debug, info, warn, error)
	#[arg(short, long, value_name = "LEVEL")]
	log_level: Option<String>,

	/// VISA resource string, host:port, or bare host
	#[arg(short, long, default_value = "TCPIP::169.254.239.195::INSTR")]
	address: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Check that the scope answers
	Connect,
	Run,
	Stop,
	GetTimeScale,
	SetTimeScale { scale: f64 },
	GetChOffset { ch: u8 },
	SetChOffset { ch: u8, offset: f64 },
	/// Install measurement items by label or SCPI token; none installs the default set
	SetMeasurements { items: Vec<String> },
	/// Value of measurement slot POS, 1 through 12
	GetMeasurement { pos: usize },
	/// Save a PNG of the screen to the scope's USB drive
	Screenshot { name: String },
	/// Move the timebase one step, left or right
	Step { direction: StepDirection },
	/// Stop acquisition and read every displayed channel
	Read {
		#[arg(long, default_value_t = 0)]
		start_point: usize,
	},
	/// Decode the waveform preamble of a channel
	Preamble { ch: u8 },
}

fn initialize_logging(log_level:&str) {
	let level = match log_level.to_lowercase().as_str() {
		"trace" => LevelFilter::Trace,
		"debug" => LevelFilter::Debug,
		"info"  => LevelFilter::Info,
		"warn"  => LevelFilter::Warn,
		"error" => LevelFilter::Error,
		_ => {
			eprintln!("Warning: Invalid log level '{}', using 'info'", log_level);
			LevelFilter::Info
		}
	};

	env_logger::Builder::from_env(Env::default())
		.filter_level(level)
		.format_timestamp_millis()
		.init();
}

fn session_reply<R: serde::Serialize>(panel:&Panel, op: impl FnOnce(&mut labpanel::devices::sds5034::SDS5034) -> labpanel::Result<R>) -> Reply {
	match panel.session().and_then(|s| s.with(op)) {
		Ok(r) => Reply::serialized(&r),
		Err(e) => Reply::from_error(&e),
	}
}

fn main() -> ExitCode {
	let args = Args::parse();
	let config = load_config_or_default(args.config.as_deref());

	let log_level = args.log_level.clone().unwrap_or_else(|| config.logging.log_level.clone());
	initialize_logging(&log_level);
	info!("labpanel {} talking to {}", env!("CARGO_PKG_VERSION"), args.address);

	let panel = Panel::new(config);
	let connected = panel.connect(&args.address);
	if !connected.is_ok() {
		error!("Unable to connect to {}", args.address);
		println!("{}", connected.to_json());
		return ExitCode::FAILURE;
	}

	let reply = match args.command {
		Command::Connect                   => connected,
		Command::Run                       => panel.run(),
		Command::Stop                      => panel.stop(),
		Command::GetTimeScale              => panel.get_time_scale(),
		Command::SetTimeScale { scale }    => panel.set_time_scale(scale),
		Command::GetChOffset { ch }        => panel.get_ch_offset(ch),
		Command::SetChOffset { ch, offset } => panel.set_ch_offset(ch, offset),
		Command::SetMeasurements { items } => {
			let names:Vec<&str> = items.iter().map(String::as_str).collect();
			session_reply(&panel, |s| s.set_measurement_items(&names))
		},
		Command::GetMeasurement { pos }    => panel.get_measurement(pos),
		Command::Screenshot { name }       => panel.set_screenshot(&name),
		Command::Step { direction }        => panel.step_time_scale(direction),
		Command::Read { start_point }      => panel.read_waveforms(start_point),
		Command::Preamble { ch }           => session_reply(&panel, |s| s.get_wave_preamble(Some(ch))),
	};

	println!("{}", reply.to_json());
	if reply.is_ok() { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
