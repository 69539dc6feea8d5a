use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::opt::{EdnsCode, EdnsOption};
use hickory_proto::rr::{Name, RecordType};

use crate::config::RunConfig;
use crate::report::QueryOutcome;

/// Build the query sent to every authoritative server.
///
/// The recursion-desired flag is cleared: queries go directly to the
/// zone's own servers, never through a recursive path. With EDNS enabled
/// the message advertises the configured UDP payload size and carries an
/// empty NSID option asking the server to identify itself.
pub fn build_query(qname: &Name, qtype: RecordType, txid: u16, config: &RunConfig) -> Message {
	let mut message = Message::new();
	message.set_id(txid);
	message.set_message_type(MessageType::Query);
	message.set_op_code(OpCode::Query);
	message.set_recursion_desired(false);
	message.add_query(Query::query(qname.clone(), qtype));

	if config.edns {
		let edns = message.extensions_mut().get_or_insert_with(Edns::new);
		edns.set_version(0);
		edns.set_max_payload(config.udp_payload);
		// Empty NSID option requests server identification (RFC 5001)
		edns.options_mut()
			.insert(EdnsOption::Unknown(u16::from(EdnsCode::NSID), Vec::new()));
	}

	message
}

/// Normalize a response into a deterministic outcome.
///
/// The order the server returned its answers in is not significant, so
/// the textual record set is sorted (and deduplicated) before it is
/// attached to the outcome. NSID is only reported when EDNS was enabled
/// for the run.
pub fn normalize(response: &Message, edns_enabled: bool) -> QueryOutcome {
	let nsid = if edns_enabled {
		extract_nsid(response)
	} else {
		None
	};

	let mut answers: Vec<String> = response
		.answers()
		.iter()
		.map(|record| record.data().to_string())
		.collect();
	answers.sort();
	answers.dedup();

	QueryOutcome {
		rcode: Some(response.response_code()),
		answers,
		nsid,
		failed: false,
	}
}

/// Decode the echoed NSID option as UTF-8, if the server sent one.
fn extract_nsid(response: &Message) -> Option<String> {
	let edns = response.extensions().as_ref()?;
	match edns.option(EdnsCode::NSID)? {
		EdnsOption::Unknown(_, bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
		_ => None,
	}
}

/// Symbolic rcode mnemonic used in reports (NOERROR, NXDOMAIN, ...).
pub fn rcode_text(rcode: ResponseCode) -> String {
	match rcode {
		ResponseCode::NoError => "NOERROR".into(),
		ResponseCode::FormErr => "FORMERR".into(),
		ResponseCode::ServFail => "SERVFAIL".into(),
		ResponseCode::NXDomain => "NXDOMAIN".into(),
		ResponseCode::NotImp => "NOTIMP".into(),
		ResponseCode::Refused => "REFUSED".into(),
		ResponseCode::YXDomain => "YXDOMAIN".into(),
		ResponseCode::YXRRSet => "YXRRSET".into(),
		ResponseCode::NXRRSet => "NXRRSET".into(),
		ResponseCode::NotAuth => "NOTAUTH".into(),
		ResponseCode::NotZone => "NOTZONE".into(),
		ResponseCode::Unknown(code) => code.to_string(),
		other => format!("{other:?}").to_uppercase(),
	}
}
