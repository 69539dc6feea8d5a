use clap::Parser;

/// Authoritative nameserver query tool
#[derive(Parser, Debug)]
#[command(name = "authquery")]
#[command(about = "Query all authoritative nameservers for a zone, qname, and qtype")]
#[command(version)]
pub struct Cli {
	/// Zone whose authoritative nameservers are queried
	pub zone: String,

	/// Query name sent to each nameserver
	pub qname: String,

	/// Query type sent to each nameserver (e.g. A, AAAA, SOA, TXT)
	pub qtype: String,

	/// Use IPv4 transport only
	#[arg(short = '4', long = "ipv4-only", conflicts_with = "ipv6_only")]
	pub ipv4_only: bool,

	/// Use IPv6 transport only
	#[arg(short = '6', long = "ipv6-only")]
	pub ipv6_only: bool,

	/// Disable EDNS (and NSID)
	#[arg(short = 'e', long = "no-edns")]
	pub no_edns: bool,

	/// Output JSON (default is text output)
	#[arg(short = 'j', long = "json")]
	pub json: bool,

	/// Per-attempt query timeout in milliseconds
	#[arg(short = 't', long = "timeout", default_value = "3000")]
	pub timeout: u64,

	/// UDP attempts per address before giving up
	#[arg(short = 'r', long = "retries", default_value = "2",
		value_parser = clap::value_parser!(u32).range(1..))]
	pub retries: u32,

	/// EDNS advertised UDP payload size in bytes
	#[arg(long = "payload-size", default_value = "1420")]
	pub payload_size: u16,

	/// Maximum concurrent in-flight address probes
	#[arg(short = 'c', long = "concurrency", default_value = "8")]
	pub concurrency: usize,
}
