// Shared handle to one connected scope. Every operation takes the lock for its whole
// duration so command/reply pairs from different callers never interleave on the wire.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, RecvTimeoutError, bounded};
use log::{info, warn};
use parking_lot::{Mutex, MutexGuard};

use crate::config::AppConfig;
use crate::devices::sds5034::{SDS5034, StepDirection, TDIV_ENUM};
use crate::error::{Result, transport};
use crate::transport::Transport;

pub struct DeviceSession<T: Transport = Box<dyn Transport>> {
	inner: Arc<Mutex<SDS5034<T>>>,
}

impl<T: Transport> Clone for DeviceSession<T> {
	fn clone(&self) -> Self { Self { inner: Arc::clone(&self.inner) } }
}

impl DeviceSession {
	pub fn connect(address:&str, cfg:&AppConfig) -> Result<Self> {
		Ok(Self::new(SDS5034::connect(address, cfg)?))
	}
}

impl<T: Transport> DeviceSession<T> {
	pub fn new(scope:SDS5034<T>) -> Self {
		Self { inner: Arc::new(Mutex::new(scope)) }
	}

	/// Run `op` with exclusive access to the scope
	pub fn with<R>(&self, op: impl FnOnce(&mut SDS5034<T>) -> R) -> R {
		let mut scope = self.inner.lock();
		op(&mut scope)
	}

	/// Hold the scope across several calls
	pub fn lock(&self) -> MutexGuard<'_, SDS5034<T>> { self.inner.lock() }

	pub fn same_device(&self, other:&Self) -> bool { Arc::ptr_eq(&self.inner, &other.inner) }
}

impl<T: Transport + 'static> DeviceSession<T> {
	/// Step the timebase every `interval` until stopped or the end of the table is reached.
	///
	/// The lock is released between steps so other callers can get in.
	pub fn start_stepping(&self, direction:StepDirection, interval:Duration) -> StepperHandle {
		let (stop_tx, stop_rx) = bounded::<()>(1);
		let session = self.clone();
		let limit = match direction {
			StepDirection::Left  => TDIV_ENUM[0],
			StepDirection::Right => TDIV_ENUM[TDIV_ENUM.len() - 1],
		};

		let thread = thread::spawn(move || -> Result<usize> {
			info!("Started stepping the timebase {:?}", direction);
			let mut steps = 0;
			loop {
				let scale = session.with(|scope| scope.step_time_scale(direction))?;
				steps += 1;
				if scale == limit {
					info!("Timebase reached {:E} s/div, stepping done", scale);
					break;
				}
				match stop_rx.recv_timeout(interval) {
					Err(RecvTimeoutError::Timeout) => continue,
					// Stop requested or the handle is gone
					Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
				}
			}
			Ok(steps)
		});

		StepperHandle { stop_tx, thread: Some(thread) }
	}
}

/// Running timebase stepper; dropping it stops the stepper too
pub struct StepperHandle {
	stop_tx: Sender<()>,
	thread: Option<JoinHandle<Result<usize>>>,
}

impl StepperHandle {
	pub fn is_finished(&self) -> bool {
		self.thread.as_ref().map_or(true, |t| t.is_finished())
	}

	/// Stop stepping and return how many steps were taken
	pub fn stop(mut self) -> Result<usize> { self.shutdown() }

	fn shutdown(&mut self) -> Result<usize> {
		// Full channel or an exited thread both mean there's nothing left to signal
		let _ = self.stop_tx.try_send(());
		match self.thread.take() {
			Some(thread) => thread.join().map_err(|_| transport("Stepper thread panicked"))?,
			None => Ok(0),
		}
	}
}

impl Drop for StepperHandle {
	fn drop(&mut self) {
		if let Err(e) = self.shutdown() {
			warn!("Timebase stepper ended with an error: {}", e);
		}
	}
}
