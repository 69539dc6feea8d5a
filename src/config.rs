use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use hickory_proto::rr::{Name, RecordType};

/// Address families to resolve nameserver addresses for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
	V4Only,
	V6Only,
	Both,
}

impl AddressFamily {
	/// Record types to look up per nameserver name, in lookup order.
	///
	/// Dual-stack resolution asks for AAAA before A.
	pub fn record_types(self) -> &'static [RecordType] {
		match self {
			Self::V4Only => &[RecordType::A],
			Self::V6Only => &[RecordType::AAAA],
			Self::Both => &[RecordType::AAAA, RecordType::A],
		}
	}
}

/// Immutable per-run configuration, built once from the command line
#[derive(Debug, Clone)]
pub struct RunConfig {
	pub families: AddressFamily,
	pub edns: bool,
	pub udp_payload: u16,
	pub timeout: Duration,
	pub retries: u32,
	pub max_inflight: usize,
}

/// The query under test, parsed once from the positional arguments
#[derive(Debug, Clone)]
pub struct QuerySpec {
	pub zone: Name,
	pub qname: Name,
	pub qtype: RecordType,
}

impl QuerySpec {
	pub fn from_args(zone: &str, qname: &str, qtype: &str) -> Result<Self> {
		Ok(Self {
			zone: parse_name(zone)?,
			qname: parse_name(qname)?,
			qtype: RecordType::from_str(&qtype.to_uppercase())
				.map_err(|_| anyhow!("unsupported query type '{}'", qtype))?,
		})
	}
}

/// Parse a domain name argument as an absolute name.
fn parse_name(input: &str) -> Result<Name> {
	let mut name = Name::from_ascii(input)
		.map_err(|e| anyhow!("invalid domain name '{}': {}", input, e))?;
	name.set_fqdn(true);
	Ok(name)
}
