use std::collections::BTreeMap;
use std::net::IpAddr;

use hickory_proto::rr::{Name, RData, RecordType};
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::{ResolveError, Resolver, TokioResolver};
use tracing::warn;

use crate::config::AddressFamily;
use crate::error::RunError;

/// Build the recursive resolver used for NS and address lookups.
///
/// Prefers the system configuration (/etc/resolv.conf); falls back to a
/// well-known public resolver when none is available.
pub fn build_resolver() -> TokioResolver {
	match Resolver::builder_tokio() {
		Ok(builder) => builder.build(),
		Err(_) => Resolver::builder_with_config(
			ResolverConfig::cloudflare(),
			TokioConnectionProvider::default(),
		)
		.build(),
	}
}

/// Resolve the set of nameserver names authoritative for the zone.
///
/// The returned set is deduplicated and ordered lexicographically so a
/// fixed zone always yields the same iteration order. A failed lookup
/// here is fatal: without a server list there is nothing to query.
pub async fn enumerate_nameservers(
	resolver: &TokioResolver,
	zone: &Name,
) -> Result<Vec<Name>, RunError> {
	let lookup = resolver
		.lookup(zone.clone(), RecordType::NS)
		.await
		.map_err(|source| RunError::ZoneResolution {
			zone: zone.to_utf8(),
			source,
		})?;

	let targets = lookup.record_iter().filter_map(|record| match record.data() {
		RData::NS(ns) => Some(ns.0.clone()),
		_ => None,
	});
	Ok(ordered_names(targets))
}

/// Resolve one nameserver name to its addresses for the requested families.
///
/// Families resolve independently: a name with no records for one family
/// is a normal dual-stack gap and contributes nothing for it, while a
/// lookup failure is logged and skipped so the rest of the run proceeds.
pub async fn resolve_addresses(
	resolver: &TokioResolver,
	name: &Name,
	families: AddressFamily,
) -> Vec<IpAddr> {
	let mut addrs = Vec::new();

	for rrtype in families.record_types() {
		match rrtype {
			RecordType::AAAA => match resolver.ipv6_lookup(name.clone()).await {
				Ok(lookup) => addrs.extend(lookup.iter().map(|aaaa| IpAddr::V6(aaaa.0))),
				Err(e) if is_no_answer(&e) => {}
				Err(e) => warn!(name = %name, rrtype = "AAAA", error = %e, "address lookup failed"),
			},
			_ => match resolver.ipv4_lookup(name.clone()).await {
				Ok(lookup) => addrs.extend(lookup.iter().map(|a| IpAddr::V4(a.0))),
				Err(e) if is_no_answer(&e) => {}
				Err(e) => warn!(name = %name, rrtype = "A", error = %e, "address lookup failed"),
			},
		}
	}

	addrs
}

/// Deduplicate names and order them by lowercased textual form.
fn ordered_names(names: impl IntoIterator<Item = Name>) -> Vec<Name> {
	let mut unique: BTreeMap<String, Name> = BTreeMap::new();
	for name in names {
		unique.entry(name.to_utf8().to_ascii_lowercase()).or_insert(name);
	}
	unique.into_values().collect()
}

/// NODATA and NXDOMAIN surface as errors from hickory; for an address
/// lookup they are expected dual-stack gaps, not failures.
fn is_no_answer(err: &ResolveError) -> bool {
	let msg = err.to_string();
	msg.contains("no record found") || msg.contains("no records found")
}
