//! Observability helpers for bootstrap flows.
//!
//! Every flow runs inside a `credential_bootstrap.flow` span carrying `flow` and `stage` fields.
//! Enable the `metrics` feature to increment the `credential_bootstrap_flow_total` counter for
//! every attempt/success/failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the bootstrap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Token probe against the protected API.
	Validate,
	/// Interactive device-code exchange.
	DeviceCode,
	/// Client identifier resolution from the encrypted bundle.
	Resolve,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Validate => "validate",
			FlowKind::DeviceCode => "device_code",
			FlowKind::Resolve => "resolve",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records the terminal outcome of `result` and hands it back unchanged.
pub fn finish_flow<T, E>(kind: FlowKind, result: Result<T, E>) -> Result<T, E>
where
	E: Display,
{
	match &result {
		Ok(_) => record_flow_outcome(kind, FlowOutcome::Success),
		Err(e) => {
			::tracing::debug!(flow = kind.as_str(), error = %e, "Flow failed.");
			record_flow_outcome(kind, FlowOutcome::Failure);
		},
	}

	result
}
