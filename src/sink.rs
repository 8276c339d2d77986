// Where finished waveform reads go besides the caller

use std::path::{Path, PathBuf};

use log::info;

use crate::devices::sds5034::{WaveformSeries, WaveformSet};
use crate::error::Result;

pub trait WaveformSink: Send {
	fn write_series(&mut self, series:&WaveformSeries) -> Result<()>;
	fn write_set(&mut self, set:&WaveformSet) -> Result<()>;
}

/// Rewrites one CSV file per read: a `time_s` column followed by one `C<n>` column per channel
pub struct CsvSink {
	path: PathBuf,
}

impl CsvSink {
	pub fn new<P: AsRef<Path>>(path:P) -> Self {
		Self { path: path.as_ref().to_path_buf() }
	}

	pub fn path(&self) -> &Path { &self.path }
}

impl WaveformSink for CsvSink {
	fn write_series(&mut self, series:&WaveformSeries) -> Result<()> {
		let mut wtr = csv::Writer::from_path(&self.path)?;
		wtr.write_record(["time_s".to_owned(), series.column_name()])?;
		for (t, v) in series.iter() {
			wtr.write_record([t.to_string(), v.to_string()])?;
		}
		wtr.flush()?;

		info!("Wrote {} samples of C{} to {}", series.len(), series.channel, self.path.display());
		Ok(())
	}

	fn write_set(&mut self, set:&WaveformSet) -> Result<()> {
		let mut wtr = csv::Writer::from_path(&self.path)?;

		let mut header = vec!["time_s".to_owned()];
		header.extend(set.series().map(|s| s.column_name()));
		wtr.write_record(&header)?;

		let rows = set.rows();
		for (t, values) in &rows {
			let mut record = Vec::with_capacity(values.len() + 1);
			record.push(t.to_string());
			record.extend(values.iter().map(|v| v.map(|v| v.to_string()).unwrap_or_default()));
			wtr.write_record(&record)?;
		}
		wtr.flush()?;

		info!("Wrote {} rows of {:?} to {}", rows.len(), set.channels(), self.path.display());
		Ok(())
	}
}
