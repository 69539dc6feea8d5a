use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use hickory_proto::op::ResponseCode;
use serde::Serialize;

use crate::config::QuerySpec;
use crate::dns::rcode_text;

/// Result of querying one server address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutcome {
	/// Response code, absent when no response was obtained at all
	pub rcode: Option<ResponseCode>,
	/// Lexicographically sorted textual answer records
	pub answers: Vec<String>,
	/// NSID string echoed by the server, when EDNS was enabled
	pub nsid: Option<String>,
	/// True when every transport attempt went unanswered
	pub failed: bool,
}

impl QueryOutcome {
	/// Outcome for an address that never responded.
	pub fn unanswered() -> Self {
		Self {
			rcode: None,
			answers: Vec::new(),
			nsid: None,
			failed: true,
		}
	}
}

/// One (nameserver name, server address) pair with its outcome
#[derive(Debug, Clone)]
pub struct ReportEntry {
	pub name: String,
	pub ip: IpAddr,
	pub outcome: QueryOutcome,
}

/// Aggregated run report.
///
/// Entries appear in enumerator-then-resolver order, one per resolved
/// address, failed outcomes included.
#[derive(Debug, Clone)]
pub struct Report {
	pub timestamp: f64,
	pub zone: String,
	pub qname: String,
	pub qtype: String,
	pub answer: Vec<ReportEntry>,
}

/// Assemble the final report from ordered per-address entries.
pub fn assemble(spec: &QuerySpec, entries: Vec<ReportEntry>) -> Report {
	let timestamp = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs_f64())
		.unwrap_or(0.0);

	Report {
		timestamp,
		zone: spec.zone.to_utf8(),
		qname: spec.qname.to_utf8(),
		qtype: spec.qtype.to_string(),
		answer: entries,
	}
}

#[derive(Serialize)]
struct JsonReport<'a> {
	timestamp: f64,
	query: JsonQuery<'a>,
	answer: Vec<JsonEntry>,
}

#[derive(Serialize)]
struct JsonQuery<'a> {
	zone: &'a str,
	qname: &'a str,
	qtype: &'a str,
}

#[derive(Serialize)]
struct JsonEntry {
	name: String,
	ip: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	nsid: Option<String>,
	rcode: String,
	answers: String,
}

/// Render the report as a single JSON document.
pub fn render_json(report: &Report) -> Result<String> {
	let answer = report
		.answer
		.iter()
		.map(|entry| JsonEntry {
			name: entry.name.clone(),
			ip: entry.ip.to_string(),
			nsid: entry.outcome.nsid.clone(),
			rcode: entry.outcome.rcode.map(rcode_text).unwrap_or_default(),
			answers: entry.outcome.answers.join(","),
		})
		.collect();

	let wire = JsonReport {
		timestamp: report.timestamp,
		query: JsonQuery {
			zone: &report.zone,
			qname: &report.qname,
			qtype: &report.qtype,
		},
		answer,
	};
	Ok(serde_json::to_string(&wire)?)
}

/// Render one line per entry: `<answers> <name> <ip> <nsid-or-empty>`.
pub fn render_text(report: &Report) -> String {
	let mut out = String::new();
	for entry in &report.answer {
		out.push_str(&format!(
			"{} {} {} {}\n",
			entry.outcome.answers.join(","),
			entry.name,
			entry.ip,
			entry.outcome.nsid.as_deref().unwrap_or(""),
		));
	}
	out
}
