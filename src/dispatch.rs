use std::net::SocketAddr;
use std::time::Instant;

use hickory_proto::op::{Message, MessageType};
use hickory_proto::ProtoError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tracing::warn;

use crate::config::RunConfig;
use crate::error::RunError;

pub const DNS_PORT: u16 = 53;

/// Receive buffer large enough for EDNS-extended UDP responses
const RECV_BUF_SIZE: usize = 4096;

/// Terminal result of the per-address exchange
#[derive(Debug)]
pub enum Exchange {
	/// A response was obtained, over UDP or over the TCP fallback.
	Response(Message),
	/// Every attempt went unanswered.
	NoResponse,
}

/// Send one query to one server address.
///
/// UDP goes first with the configured retry budget. A truncated UDP
/// response triggers exactly one TCP attempt carrying the same query
/// bytes; the TCP attempt is never retried. Exhausting the UDP budget
/// without any response skips TCP entirely, since there is no truncation
/// flag to act on.
pub async fn exchange(
	server: SocketAddr,
	query: &Message,
	config: &RunConfig,
) -> Result<Exchange, RunError> {
	let query_bytes = query
		.to_vec()
		.map_err(|source| RunError::Protocol { server, source })?;

	match udp_exchange(server, &query_bytes, query.id(), config).await? {
		Some(response) if response.truncated() => {
			warn!(server = %server.ip(), "response was truncated; retrying over TCP");
			tcp_exchange(server, &query_bytes, query.id(), config).await
		}
		Some(response) => Ok(Exchange::Response(response)),
		None => Ok(Exchange::NoResponse),
	}
}

/// Run the UDP retry loop.
///
/// Returns the first response with a matching transaction id, or None
/// once the retry budget is exhausted. Each attempt opens a fresh socket
/// and gets the full per-attempt timeout; stray datagrams (wrong id, or
/// not a response at all) are ignored without consuming the budget.
async fn udp_exchange(
	server: SocketAddr,
	query_bytes: &[u8],
	txid: u16,
	config: &RunConfig,
) -> Result<Option<Message>, RunError> {
	for attempt in 1..=config.retries {
		let socket = match bind_udp(server).await {
			Ok(socket) => socket,
			Err(err) => {
				warn!(server = %server.ip(), attempt, error = %err, "UDP socket setup failed");
				continue;
			}
		};

		let start = Instant::now();
		if let Err(err) = socket.send_to(query_bytes, server).await {
			warn!(server = %server.ip(), attempt, error = %err, "UDP send failed");
			continue;
		}

		let mut buf = vec![0u8; RECV_BUF_SIZE];
		loop {
			let Some(remaining) = config.timeout.checked_sub(start.elapsed()) else {
				warn!(server = %server.ip(), attempt, "UDP query timeout");
				break;
			};

			match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
				Ok(Ok((len, _src))) => {
					let response = Message::from_vec(&buf[..len])
						.map_err(|source| RunError::Protocol { server, source })?;
					if response.id() != txid
						|| response.message_type() != MessageType::Response
					{
						continue;
					}
					return Ok(Some(response));
				}
				Ok(Err(err)) => {
					warn!(server = %server.ip(), attempt, error = %err, "UDP receive failed");
					break;
				}
				Err(_) => {
					warn!(server = %server.ip(), attempt, "UDP query timeout");
					break;
				}
			}
		}
	}

	Ok(None)
}

/// Single TCP attempt after truncation.
///
/// A timeout or connection failure here is terminal for the address; the
/// fallback is never retried.
async fn tcp_exchange(
	server: SocketAddr,
	query_bytes: &[u8],
	txid: u16,
	config: &RunConfig,
) -> Result<Exchange, RunError> {
	let raw = match tokio::time::timeout(config.timeout, tcp_roundtrip(server, query_bytes)).await {
		Ok(Ok(raw)) => raw,
		Ok(Err(err)) => {
			warn!(server = %server.ip(), error = %err, "TCP query failed");
			return Ok(Exchange::NoResponse);
		}
		Err(_) => {
			warn!(server = %server.ip(), "TCP query timeout");
			return Ok(Exchange::NoResponse);
		}
	};

	let response = Message::from_vec(&raw)
		.map_err(|source| RunError::Protocol { server, source })?;
	// The connection is ours alone, so a mismatched id means a broken peer
	if response.id() != txid {
		return Err(RunError::Protocol {
			server,
			source: ProtoError::from(format!(
				"transaction id mismatch: expected {txid}, got {}",
				response.id(),
			)),
		});
	}
	Ok(Exchange::Response(response))
}

/// One DNS-over-TCP round trip: two-byte length prefix, message, then a
/// single length-prefixed response.
async fn tcp_roundtrip(server: SocketAddr, query_bytes: &[u8]) -> std::io::Result<Vec<u8>> {
	let mut stream = TcpStream::connect(server).await?;

	let mut framed = Vec::with_capacity(query_bytes.len() + 2);
	framed.extend_from_slice(&(query_bytes.len() as u16).to_be_bytes());
	framed.extend_from_slice(query_bytes);
	stream.write_all(&framed).await?;

	let mut len_bytes = [0u8; 2];
	stream.read_exact(&mut len_bytes).await?;
	let len = u16::from_be_bytes(len_bytes) as usize;
	let mut body = vec![0u8; len];
	stream.read_exact(&mut body).await?;
	Ok(body)
}

async fn bind_udp(server: SocketAddr) -> std::io::Result<UdpSocket> {
	let bind_addr = if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
	UdpSocket::bind(bind_addr).await
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;
	use std::time::Duration;

	use hickory_proto::op::ResponseCode;
	use hickory_proto::rr::rdata::A;
	use hickory_proto::rr::{Name, RData, Record, RecordType};
	use tokio::net::TcpListener;

	use crate::config::{AddressFamily, RunConfig};
	use crate::dns::build_query;

	fn test_config(timeout_ms: u64, retries: u32) -> RunConfig {
		RunConfig {
			families: AddressFamily::Both,
			edns: true,
			udp_payload: 1420,
			timeout: Duration::from_millis(timeout_ms),
			retries,
			max_inflight: 4,
		}
	}

	fn test_query(txid: u16) -> Message {
		let name = Name::from_ascii("example.com.").unwrap();
		build_query(&name, RecordType::A, txid, &test_config(100, 2))
	}

	fn answer_record() -> Record {
		Record::from_rdata(
			Name::from_ascii("example.com.").unwrap(),
			60,
			RData::A(A::new(192, 0, 2, 7)),
		)
	}

	#[tokio::test]
	async fn test_udp_response_completes_exchange() {
		let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
		let server_addr = server.local_addr().unwrap();

		tokio::spawn(async move {
			let mut buf = vec![0u8; 4096];
			let (len, src) = server.recv_from(&mut buf).await.unwrap();
			let mut response = Message::from_vec(&buf[..len]).unwrap();
			response.set_message_type(MessageType::Response);
			response.add_answer(answer_record());
			server.send_to(&response.to_vec().unwrap(), src).await.unwrap();
		});

		let config = test_config(1000, 2);
		let query = test_query(4242);
		match exchange(server_addr, &query, &config).await.unwrap() {
			Exchange::Response(message) => {
				assert_eq!(message.id(), 4242);
				assert_eq!(message.response_code(), ResponseCode::NoError);
				assert_eq!(message.answer_count(), 1);
			}
			Exchange::NoResponse => panic!("expected a response"),
		}
	}

	#[tokio::test]
	async fn test_silent_server_consumes_exact_retry_budget() {
		let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
		let server_addr = server.local_addr().unwrap();
		let received = Arc::new(AtomicUsize::new(0));

		let counter = received.clone();
		tokio::spawn(async move {
			let mut buf = vec![0u8; 4096];
			loop {
				if server.recv_from(&mut buf).await.is_err() {
					return;
				}
				counter.fetch_add(1, Ordering::SeqCst);
			}
		});

		let config = test_config(50, 2);
		let query = test_query(7);
		let result = exchange(server_addr, &query, &config).await.unwrap();
		assert!(matches!(result, Exchange::NoResponse));

		// Two sends for R=2, never a third, and no TCP attempt was possible
		tokio::time::sleep(Duration::from_millis(60)).await;
		assert_eq!(received.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn test_stray_datagram_does_not_consume_budget() {
		let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
		let server_addr = server.local_addr().unwrap();

		tokio::spawn(async move {
			let mut buf = vec![0u8; 4096];
			let (len, src) = server.recv_from(&mut buf).await.unwrap();
			let query = Message::from_vec(&buf[..len]).unwrap();

			// First a response with the wrong transaction id, then the real one
			let mut bogus = query.clone();
			bogus.set_message_type(MessageType::Response);
			bogus.set_id(query.id().wrapping_add(1));
			server.send_to(&bogus.to_vec().unwrap(), src).await.unwrap();

			let mut response = query;
			response.set_message_type(MessageType::Response);
			response.add_answer(answer_record());
			server.send_to(&response.to_vec().unwrap(), src).await.unwrap();
		});

		let config = test_config(1000, 1);
		let query = test_query(9001);
		match exchange(server_addr, &query, &config).await.unwrap() {
			Exchange::Response(message) => assert_eq!(message.id(), 9001),
			Exchange::NoResponse => panic!("expected the matching response"),
		}
	}

	#[tokio::test]
	async fn test_truncated_udp_falls_back_to_tcp_once() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let udp = UdpSocket::bind(addr).await.unwrap();

		// UDP side answers with the truncation flag set and no records
		tokio::spawn(async move {
			let mut buf = vec![0u8; 4096];
			let (len, src) = udp.recv_from(&mut buf).await.unwrap();
			let mut response = Message::from_vec(&buf[..len]).unwrap();
			response.set_message_type(MessageType::Response);
			response.set_truncated(true);
			udp.send_to(&response.to_vec().unwrap(), src).await.unwrap();
		});

		// TCP side returns the full answer
		tokio::spawn(async move {
			let (mut stream, _) = listener.accept().await.unwrap();
			let mut len_bytes = [0u8; 2];
			stream.read_exact(&mut len_bytes).await.unwrap();
			let len = u16::from_be_bytes(len_bytes) as usize;
			let mut body = vec![0u8; len];
			stream.read_exact(&mut body).await.unwrap();

			let mut response = Message::from_vec(&body).unwrap();
			response.set_message_type(MessageType::Response);
			response.add_answer(answer_record());
			let bytes = response.to_vec().unwrap();
			let mut framed = Vec::with_capacity(bytes.len() + 2);
			framed.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
			framed.extend_from_slice(&bytes);
			stream.write_all(&framed).await.unwrap();
		});

		let config = test_config(1000, 2);
		let query = test_query(99);
		match exchange(addr, &query, &config).await.unwrap() {
			Exchange::Response(message) => {
				// The final outcome carries the TCP response's data
				assert!(!message.truncated());
				assert_eq!(message.answer_count(), 1);
			}
			Exchange::NoResponse => panic!("expected the TCP response"),
		}
	}

	#[tokio::test]
	async fn test_tcp_timeout_is_terminal() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let udp = UdpSocket::bind(addr).await.unwrap();
		let tcp_accepts = Arc::new(AtomicUsize::new(0));

		tokio::spawn(async move {
			let mut buf = vec![0u8; 4096];
			loop {
				let (len, src) = match udp.recv_from(&mut buf).await {
					Ok(v) => v,
					Err(_) => return,
				};
				let mut response = match Message::from_vec(&buf[..len]) {
					Ok(m) => m,
					Err(_) => continue,
				};
				response.set_message_type(MessageType::Response);
				response.set_truncated(true);
				let _ = udp.send_to(&response.to_vec().unwrap(), src).await;
			}
		});

		let accepts = tcp_accepts.clone();
		tokio::spawn(async move {
			let mut held = Vec::new();
			loop {
				let (stream, _) = match listener.accept().await {
					Ok(v) => v,
					Err(_) => return,
				};
				accepts.fetch_add(1, Ordering::SeqCst);
				// Hold the connection open without ever answering
				held.push(stream);
			}
		});

		let config = test_config(100, 2);
		let query = test_query(3);
		let result = exchange(addr, &query, &config).await.unwrap();
		assert!(matches!(result, Exchange::NoResponse));

		// Exactly one TCP connection, no retry after the timeout
		tokio::time::sleep(Duration::from_millis(150)).await;
		assert_eq!(tcp_accepts.load(Ordering::SeqCst), 1);
	}
}
