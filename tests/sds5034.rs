mod common;

use std::fs;

use labpanel::devices::sds5034::{SDS5034, PartialReadPolicy, StepDirection, Impedance, SampleRate};
use labpanel::sink::CsvSink;
use labpanel::{Error, ErrorKind};

use common::SimScope;

fn close(a:f64, b:f64) -> bool { (a - b).abs() < 1e-12 }

#[test]
fn chunked_transfer_reassembles_the_record() {
	let mut sim = SimScope::new(50_000);
	sim.max_chunk = 20_000;
	let mut scope = sim.connect();

	let series = scope.read_channel(1, 0).unwrap();

	assert_eq!(scope.transport().transfers, vec![(1, 0, 20_000), (1, 20_000, 20_000), (1, 40_000, 10_000)]);
	assert_eq!(series.len(), 50_000);
	assert_eq!(series.time_s.len(), 50_000);

	let dt = 2e-9f32 as f64;
	for pair in series.time_s.windows(2) {
		assert!(pair[1] > pair[0]);
		assert!((pair[1] - pair[0] - dt).abs() < 1e-15);
	}
	assert!(close(series.time_s[0], -0.005001));

	// Ramp codes, 25 codes per division at 1 V/div
	assert!(close(series.values[0], 0.0));
	assert!(close(series.values[1], 0.04));
	assert!(close(series.values[200], -2.24));
	assert!(close(series.values[256], 0.0));

	assert_eq!(scope.waveforms.get(1).unwrap().len(), 50_000);
	assert_eq!(scope.preambles.get(1).unwrap().data_npts, 50_000);

	// Point count register is put back once the chunks are in
	let points:Vec<String> = scope.transport().written().into_iter().filter(|c| c.starts_with("WAVeform:POINt ")).collect();
	assert_eq!(points, vec!["WAVeform:POINt 20000", "WAVeform:POINt 50000"]);
}

#[test]
fn zero_point_count_falls_back_to_the_preamble() {
	let mut sim = SimScope::new(30_000);
	sim.npts = 0;
	sim.max_chunk = 20_000;
	let mut scope = sim.connect();

	let series = scope.read_channel(2, 0).unwrap();

	assert_eq!(series.channel, 2);
	assert_eq!(series.len(), 30_000);
	assert_eq!(scope.transport().transfers, vec![(2, 0, 20_000), (2, 20_000, 10_000)]);
	assert!(scope.transport().written().contains(&"WAVeform:POINt 30000".to_owned()));

	// Stored under the channel asked for, not the descriptor's stale source field
	assert!(scope.preambles.get(2).is_some());
	assert!(scope.preambles.get(1).is_none());
}

#[test]
fn chunks_start_from_the_requested_point() {
	let mut sim = SimScope::new(1_000);
	sim.npts = 300;
	sim.max_chunk = 200;
	let mut scope = sim.connect();

	let series = scope.read_channel(1, 100).unwrap();

	assert_eq!(scope.transport().transfers, vec![(1, 100, 200), (1, 300, 200)]);
	assert_eq!(series.len(), 300);
	assert!(close(series.values[0], 4.0));
	assert!(close(series.values[156], 0.0));
	// Code 143 is past the 8-bit sign boundary
	assert!(close(series.values[299], (143.0 - 256.0) / 25.0));
}

#[test]
fn ten_bit_records_use_word_transfers() {
	let mut sim = SimScope::new(4);
	sim.adc_bits = 10;
	sim.channels[0].codes = vec![0, 400, 1023, 512];
	sim.channels[0].v_per_div = 0.5;
	sim.channels[0].v_offset = 0.25;
	sim.channels[0].probe = 10.0;
	let mut scope = sim.connect();

	let series = scope.read_channel(1, 0).unwrap();

	assert!(scope.transport().written().contains(&"WAVeform:WIDTh WORD".to_owned()));
	// 5 V/div and 2.5 V offset once the 10x probe is applied
	let expected = [0.0, 100.0, 255.75, 128.0].map(|c| c / 25.0 * 5.0 - 2.5);
	for (got, want) in series.values.iter().zip(expected) {
		assert!(close(*got, want), "{} != {}", got, want);
	}
}

#[test]
fn failed_channel_is_reported_and_the_rest_kept() {
	let mut sim = SimScope::new(100);
	sim.channels[1].fail = true;
	sim.channels[3].on = false;
	let mut scope = sim.connect();

	let report = scope.read_active_channels(0).unwrap();

	assert_eq!(report.set.channels(), vec![1, 3]);
	assert_eq!(report.failed_channels(), vec![2]);
	assert_eq!(report.failures[0].kind(), ErrorKind::PartialRead);
	assert!(!report.is_complete());
	assert_eq!(scope.waveforms.channels(), vec![1, 3]);

	// Acquisition stopped before any transfer and left stopped
	let log = scope.transport().written();
	assert_eq!(log[1], "ACQuire:STATE STOP");
	assert!(!scope.transport().running);
}

#[test]
fn failed_chunked_channel_leaves_later_channels_whole() {
	let mut sim = SimScope::new(50_000);
	sim.max_chunk = 20_000;
	sim.channels[1].fail = true;
	sim.channels[3].on = false;
	let mut scope = sim.connect();

	let report = scope.read_active_channels(0).unwrap();

	assert_eq!(report.failed_channels(), vec![2]);
	assert_eq!(report.set.get(1).unwrap().len(), 50_000);
	assert_eq!(report.set.get(3).unwrap().len(), 50_000);

	let c3:usize = scope.transport().transfers.iter().filter(|t| t.0 == 3).map(|t| t.2).sum();
	assert_eq!(c3, 50_000);
	assert_eq!(scope.transport().npts, 50_000);
}

#[test]
fn absurd_point_count_is_a_decode_error() {
	let mut sim = SimScope::new(10);
	sim.adc_bits = 10;
	sim.max_chunk = 10;
	sim.npts = usize::MAX / 2 + 1;
	let mut scope = sim.connect();

	let e = scope.read_channel(1, 0).unwrap_err();
	assert_eq!(e.kind(), ErrorKind::Decode);
	assert!(scope.transport().transfers.is_empty());
	assert!(!scope.transport().written().iter().any(|c| c == "WAV:DATA?"));
}

#[test]
fn start_point_past_addressable_memory_is_rejected() {
	let mut scope = SimScope::new(50).connect();

	let e = scope.read_channel(1, usize::MAX).unwrap_err();
	assert_eq!(e.kind(), ErrorKind::InvalidArgument);
	assert!(scope.transport().transfers.is_empty());
}

#[test]
fn abort_policy_returns_the_first_failure() {
	let mut sim = SimScope::new(100);
	sim.channels[1].fail = true;
	let mut scope = sim.connect().with_partial_policy(PartialReadPolicy::Abort);

	match scope.read_active_channels(0) {
		Err(Error::PartialRead { channel, source }) => {
			assert_eq!(channel, 2);
			assert!(matches!(*source, Error::Timeout));
		},
		other => panic!("expected a partial read error, got {:?}", other),
	}
	assert_eq!(scope.transport().transfers.iter().map(|t| t.0).collect::<Vec<_>>(), vec![1]);
}

#[test]
fn new_read_replaces_the_channel_column() {
	let mut sim = SimScope::new(10);
	sim.channels[2].on = false;
	sim.channels[3].on = false;
	let mut scope = sim.connect();

	scope.read_active_channels(0).unwrap();
	assert_eq!(scope.waveforms.get(1).unwrap().len(), 10);

	scope.transport_mut().channels[0].codes = vec![5; 4];
	scope.transport_mut().npts = 4;
	scope.read_channel(1, 0).unwrap();

	assert_eq!(scope.waveforms.channels(), vec![1, 2]);
	assert_eq!(scope.waveforms.get(1).unwrap().values, vec![0.2; 4]);
}

#[test]
fn setter_then_getter_round_trip() {
	let mut scope = SimScope::new(1).connect();

	scope.set_ch_scale(1, 0.5).unwrap();
	assert_eq!(scope.get_ch_scale(1).unwrap(), 0.5);

	scope.set_ch_offset(3, -0.125).unwrap();
	assert_eq!(scope.get_ch_offset(3).unwrap(), -0.125);

	scope.set_ch_impedance(2, Impedance::Fifty).unwrap();
	assert_eq!(scope.get_ch_impedance(2).unwrap(), Impedance::Fifty);

	scope.set_ch_state(4, false).unwrap();
	assert!(!scope.get_ch_state(4).unwrap());

	let log = scope.transport().written();
	assert!(log.contains(&"CHANnel1:SCALe 0.5".to_owned()));
	assert!(log.contains(&"CHANnel2:IMP FIFTy".to_owned()));
}

#[test]
fn adc_resolution_needs_a_running_scope() {
	let mut sim = SimScope::new(1);
	sim.running = false;
	let mut scope = sim.connect();

	scope.set_adc_resolution(10).unwrap();
	assert_eq!(scope.transport().written(), vec!["*IDN?", "ACQ:STATE?", "ACQuire:STATE RUN", "ACQuire:RESolution 10B", "ACQuire:STATE STOP"]);
	assert!(!scope.transport().running);
	assert_eq!(scope.get_adc_resolution().unwrap(), 10);

	let mut scope = SimScope::new(1).connect();
	scope.set_adc_resolution(8).unwrap();
	assert_eq!(scope.transport().written(), vec!["*IDN?", "ACQ:STATE?", "ACQuire:STATE RUN", "ACQuire:RESolution 8B"]);
	assert!(scope.transport().running);
}

#[test]
fn out_of_domain_arguments_are_rejected_before_sending() {
	let mut scope = SimScope::new(1).connect();
	let invalid = |r:labpanel::Result<()>| r.unwrap_err().kind() == ErrorKind::InvalidArgument;

	assert!(invalid(scope.set_adc_resolution(12)));
	assert!(invalid(scope.set_ch_scale(5, 1.0)));
	assert!(invalid(scope.set_ch_scale(1, -1.0)));
	assert!(invalid(scope.set_ch_offset(0, 0.0)));
	assert!(invalid(scope.set_sequence_count(6)));
	assert!(invalid(scope.set_sequence_count(0)));
	assert!(invalid(scope.set_ch_probe(1, Some(0.0))));
	assert!(invalid(scope.set_ch_probe(1, Some(1e6))));
	assert!(invalid(scope.set_smpl_rate(SampleRate::Fixed(-5.0))));
	assert!(invalid(scope.set_time_scale(0.0)));
	assert!(invalid(scope.set_measurement_items(&["no such item"])));
	assert!(invalid(scope.set_measurement_items(&["PKPK"; 13])));
	assert!(invalid(scope.screenshot("")));
	assert!(scope.get_measurement_item_value(13).is_err());

	assert_eq!(scope.transport().written(), vec!["*IDN?"]);
}

#[test]
fn accepted_arguments_reach_the_device() {
	let mut scope = SimScope::new(1).connect();

	scope.set_sequence_count(8).unwrap();
	scope.set_ch_probe(1, Some(10.0)).unwrap();
	scope.set_ch_probe(2, None).unwrap();
	scope.set_smpl_rate(SampleRate::Auto).unwrap();
	scope.set_smpl_rate(SampleRate::Fixed(2.5e9)).unwrap();
	scope.set_time_delay(-1e-6).unwrap();
	scope.screenshot("bench_01").unwrap();

	assert_eq!(&scope.transport().written()[1..], &[
		"ACQuire:SEQuence:COUNt 8",
		"CHANnel1:PROBe VALue 10",
		"CHANnel2:PROBe DEFault",
		"ACQuire:MMANagement AUTO",
		"ACQuire:MMANagement FSRate",
		"ACQuire:SRATe 2500000000",
		"TIMebase:DELay -1E-6",
		"SAVE:IMAGe \"U-disk0/SIGLENT/bench_01.png\",PNG,ON",
	]);
}

#[test]
fn measurement_items_fill_slots_in_order() {
	let mut scope = SimScope::new(1).connect();

	scope.set_measurement_items(&["峰峰值", "freq"]).unwrap();
	assert_eq!(&scope.transport().written()[1..], &[":MEASure:ADVanced:P1:TYPE PKPK", ":MEASure:ADVanced:P2:TYPE FREQ"]);

	let mut scope = SimScope::new(1).connect();
	scope.set_measurement_items(&[]).unwrap();
	let log = scope.transport().written();
	assert_eq!(log.len(), 12);
	assert_eq!(log[1], ":MEASure:ADVanced:P1:TYPE PER");
	assert_eq!(log[11], ":MEASure:ADVanced:P11:TYPE NSLOPE");

	scope.transport_mut().set("MEAS:ADV:P3:VAL", "1.25E-03");
	assert_eq!(scope.get_measurement_item_value(3).unwrap(), 1.25e-3);
}

#[test]
fn timebase_steps_one_entry() {
	let mut sim = SimScope::new(1);
	sim.set("TIMebase:SCALe", "1.00E-03");
	let mut scope = sim.connect();

	assert_eq!(scope.step_time_scale(StepDirection::Right).unwrap(), 2e-3);
	assert_eq!(scope.step_time_scale(StepDirection::Right).unwrap(), 5e-3);
	assert_eq!(scope.step_time_scale(StepDirection::Left).unwrap(), 2e-3);
	assert!(scope.transport().written().contains(&"TIMebase:SCALe 5E-3".to_owned()));
}

#[test]
fn preamble_of_the_current_source() {
	let mut scope = SimScope::new(10).connect();
	scope.set_wave_ch(3).unwrap();

	let p = scope.get_wave_preamble(None).unwrap();
	assert_eq!(p.channel, 3);
	assert_eq!(p.t_per_div, 1e-3);
	assert_eq!(p.data_npts, 10);
	assert!(scope.transport().written().contains(&"WAVeform:SOURce?".to_owned()));
}

#[test]
fn only_sds_models_are_accepted() {
	let mut sim = SimScope::new(1);
	sim.model = "SDG2042X".into();
	let err = SDS5034::new(sim).err().expect("a signal generator is not a scope");
	assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn csv_sink_receives_active_reads() {
	let path = std::env::temp_dir().join(format!("labpanel-active-{}.csv", std::process::id()));

	let mut sim = SimScope::new(3);
	sim.channels[2].on = false;
	sim.channels[3].on = false;
	let mut scope = sim.connect().with_sink(Box::new(CsvSink::new(&path)));
	scope.read_active_channels(0).unwrap();

	let text = fs::read_to_string(&path).unwrap();
	fs::remove_file(&path).unwrap();

	let lines:Vec<&str> = text.lines().collect();
	assert_eq!(lines.len(), 4);
	assert_eq!(lines[0], "time_s,C1,C2");
	assert!(lines[2].ends_with(",0.04,0.04"));
}
