use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::warn;

use crate::config::{QuerySpec, RunConfig};
use crate::dispatch::{self, Exchange};
use crate::dns::{build_query, normalize};
use crate::error::RunError;
use crate::report::{QueryOutcome, ReportEntry};

/// A nameserver address to query, tagged with the name it belongs to
#[derive(Debug, Clone)]
pub struct ProbeTarget {
	pub ns_name: String,
	pub addr: SocketAddr,
}

/// Query every target address and return outcomes in target order.
///
/// Targets run concurrently up to the configured in-flight cap, each
/// probe owning its own sockets and retry state. Outcomes are keyed by
/// target index, so completion order never leaks into the report. A
/// protocol error on any address aborts the run once the outstanding
/// probes have drained.
pub async fn run_probes(
	targets: &[ProbeTarget],
	spec: &QuerySpec,
	config: &RunConfig,
) -> Result<Vec<ReportEntry>, RunError> {
	let semaphore = Arc::new(Semaphore::new(config.max_inflight));
	let mut handles = Vec::new();

	for target in targets {
		let sem = semaphore.clone();
		let server = target.addr;
		let spec = spec.clone();
		let config = config.clone();

		handles.push(tokio::spawn(async move {
			let _permit = sem.acquire().await.unwrap();

			// Fresh transaction id per address; the same message is reused
			// across UDP retries and the TCP fallback
			let txid: u16 = rand::random();
			let query = build_query(&spec.qname, spec.qtype, txid, &config);

			let outcome = match dispatch::exchange(server, &query, &config).await? {
				Exchange::Response(response) => normalize(&response, config.edns),
				Exchange::NoResponse => QueryOutcome::unanswered(),
			};
			Ok::<QueryOutcome, RunError>(outcome)
		}));
	}

	let mut entries: BTreeMap<usize, ReportEntry> = BTreeMap::new();
	let mut fatal: Option<RunError> = None;

	for (index, handle) in handles.into_iter().enumerate() {
		let target = &targets[index];
		match handle.await {
			Ok(Ok(outcome)) => {
				entries.insert(index, ReportEntry {
					name: target.ns_name.clone(),
					ip: target.addr.ip(),
					outcome,
				});
			}
			Ok(Err(err)) => {
				if fatal.is_none() {
					fatal = Some(err);
				}
			}
			Err(err) => {
				// A lost task still gets an entry so every (name, address)
				// pair shows up exactly once
				warn!(name = %target.ns_name, ip = %target.addr.ip(), error = %err, "probe task failed");
				entries.insert(index, ReportEntry {
					name: target.ns_name.clone(),
					ip: target.addr.ip(),
					outcome: QueryOutcome::unanswered(),
				});
			}
		}
	}

	if let Some(err) = fatal {
		return Err(err);
	}
	Ok(entries.into_values().collect())
}
