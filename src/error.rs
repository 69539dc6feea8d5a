use std::net::SocketAddr;

use hickory_proto::ProtoError;
use hickory_resolver::ResolveError;
use thiserror::Error;

/// Failures that abort the whole run.
///
/// Local failures never show up here: a nameserver name that does not
/// resolve simply contributes no addresses, and an address that never
/// answers becomes a failed outcome in the report.
#[derive(Debug, Error)]
pub enum RunError {
	/// The zone's NS set could not be resolved; there is nothing to query.
	#[error("NS lookup for zone '{zone}' failed: {source}")]
	ZoneResolution {
		zone: String,
		source: ResolveError,
	},

	/// A server sent bytes the message codec could not make sense of.
	#[error("protocol error talking to {server}: {source}")]
	Protocol {
		server: SocketAddr,
		source: ProtoError,
	},
}
