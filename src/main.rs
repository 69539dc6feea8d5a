mod cli;
mod config;
mod dispatch;
mod dns;
mod error;
mod probe;
mod report;
mod resolver;

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::{AddressFamily, QuerySpec, RunConfig};
use crate::probe::ProbeTarget;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	// Warnings (timeouts, retries, truncation) go to stderr so they never
	// mix with the report on stdout
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
		.with_writer(std::io::stderr)
		.with_target(false)
		.init();

	// One immutable configuration value for the whole run
	let families = if cli.ipv4_only {
		AddressFamily::V4Only
	} else if cli.ipv6_only {
		AddressFamily::V6Only
	} else {
		AddressFamily::Both
	};
	let config = RunConfig {
		families,
		edns: !cli.no_edns,
		udp_payload: cli.payload_size,
		timeout: Duration::from_millis(cli.timeout),
		retries: cli.retries,
		max_inflight: cli.concurrency,
	};

	let spec = match QuerySpec::from_args(&cli.zone, &cli.qname, &cli.qtype) {
		Ok(spec) => spec,
		Err(err) => {
			// Argument errors get the usage exit status, before any querying
			eprintln!("authquery: {err}");
			std::process::exit(2);
		}
	};

	let resolver = resolver::build_resolver();

	// Nameserver names in deterministic order; a failure here is fatal
	let nsnames = resolver::enumerate_nameservers(&resolver, &spec.zone).await?;

	// Address resolution follows enumerator order; each name contributes
	// zero or more targets
	let mut targets = Vec::new();
	for name in &nsnames {
		for addr in resolver::resolve_addresses(&resolver, name, config.families).await {
			targets.push(ProbeTarget {
				ns_name: name.to_utf8(),
				addr: SocketAddr::new(addr, dispatch::DNS_PORT),
			});
		}
	}

	let entries = probe::run_probes(&targets, &spec, &config).await?;
	let report = report::assemble(&spec, entries);

	if cli.json {
		println!("{}", report::render_json(&report)?);
	} else {
		print!("{}", report::render_text(&report));
	}

	Ok(())
}
