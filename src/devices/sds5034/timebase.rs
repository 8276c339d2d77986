// Front-panel style timebase stepping along the 1-2-5 sequence

use log::info;

use crate::error::{Result, decode};
use crate::transport::Transport;
use super::SDS5034;
use super::preamble::TDIV_ENUM;
use super::settings::StepDirection;

fn nearest_index(scale:f64) -> usize {
	let target = scale.ln();
	let mut best = 0;
	for (i, tdiv) in TDIV_ENUM.iter().enumerate() {
		if (tdiv.ln() - target).abs() < (TDIV_ENUM[best].ln() - target).abs() {
			best = i;
		}
	}
	best
}

/// The table entry one step from `current`, clamped at either end
pub fn next_time_scale(current:f64, direction:StepDirection) -> f64 {
	let idx = nearest_index(current);
	let next = match direction {
		StepDirection::Left  => idx.saturating_sub(1),
		StepDirection::Right => (idx + 1).min(TDIV_ENUM.len() - 1),
	};
	TDIV_ENUM[next]
}

impl<T: Transport> SDS5034<T> {

	/// Move the timebase one step and return the new seconds per division
	pub fn step_time_scale(&mut self, direction:StepDirection) -> Result<f64> {
		let current = self.get_time_scale()?;
		if !(current.is_finite() && current > 0.0) {
			return Err(decode(format!("Unexpected time scale {}", current)));
		}

		let next = next_time_scale(current, direction);
		if next != current {
			self.set_time_scale(next)?;
		}
		info!("Time scale {:E} -> {:E} s/div", current, next);
		Ok(next)
	}

}
