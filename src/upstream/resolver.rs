#[cfg(feature = "with-dns")]
use trust_dns_resolver::{
    Resolver,
    error::{ResolveError, ResolveErrorKind},
    lookup::TxtLookup,
    proto::rr::RecordType,
};

use super::MxRecord;
use crate::spf::SpfError;

/// Type code of the SPF RR that RFC 7208 retired.
#[cfg(feature = "with-dns")]
const LEGACY_SPF_RR: u16 = 99;

pub fn normalize_domain(domain: &str) -> Result<String, SpfError> {
    let trimmed = domain.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(SpfError::EmptyDomain);
    }
    idna::domain_to_ascii(trimmed).map_err(SpfError::idna)
}

pub fn fqdn(label: &str, domain: &str) -> String {
    let trimmed = label.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        domain.to_string()
    } else {
        format!("{}.{}", trimmed.to_ascii_lowercase(), domain)
    }
}

/// Raw DNS queries needed to build an [`UpstreamResponse`](super::UpstreamResponse).
///
/// Implementations answer "no records" (NXDOMAIN or NODATA) with an empty
/// result rather than an error; errors are reserved for resolver failures.
pub trait DnsLookup {
    fn lookup_txt(&self, name: &str) -> Result<Vec<String>, SpfError>;
    fn lookup_mx(&self, name: &str) -> Result<Vec<MxRecord>, SpfError>;
    /// Whether `name` has at least one A or AAAA record.
    fn lookup_host(&self, name: &str) -> Result<bool, SpfError>;
    /// Whether `name` still publishes the type 99 SPF record.
    fn lookup_legacy_spf(&self, name: &str) -> Result<bool, SpfError>;
}

impl<T> DnsLookup for &T
where
    T: DnsLookup + ?Sized,
{
    fn lookup_txt(&self, name: &str) -> Result<Vec<String>, SpfError> {
        (**self).lookup_txt(name)
    }

    fn lookup_mx(&self, name: &str) -> Result<Vec<MxRecord>, SpfError> {
        (**self).lookup_mx(name)
    }

    fn lookup_host(&self, name: &str) -> Result<bool, SpfError> {
        (**self).lookup_host(name)
    }

    fn lookup_legacy_spf(&self, name: &str) -> Result<bool, SpfError> {
        (**self).lookup_legacy_spf(name)
    }
}

#[cfg(feature = "with-dns")]
impl DnsLookup for Resolver {
    fn lookup_txt(&self, name: &str) -> Result<Vec<String>, SpfError> {
        let lookup = match Resolver::txt_lookup(self, name) {
            Ok(lookup) => lookup,
            Err(err) => {
                if should_treat_as_empty(&err) {
                    return Ok(Vec::new());
                }
                return Err(SpfError::lookup("TXT", name, err));
            }
        };
        collect_txt_records(name, &lookup)
    }

    fn lookup_mx(&self, name: &str) -> Result<Vec<MxRecord>, SpfError> {
        let lookup = match Resolver::mx_lookup(self, name) {
            Ok(lookup) => lookup,
            Err(err) if should_treat_as_empty(&err) => return Ok(Vec::new()),
            Err(err) => return Err(SpfError::lookup("MX", name, err)),
        };
        let mut records: Vec<MxRecord> = lookup
            .iter()
            .map(|mx| MxRecord::new(mx.preference(), normalize_exchange(&mx.exchange().to_utf8())))
            .collect();
        records.sort();
        records.dedup();
        Ok(records)
    }

    fn lookup_host(&self, name: &str) -> Result<bool, SpfError> {
        match Resolver::lookup_ip(self, name) {
            Ok(lookup) => Ok(lookup.iter().next().is_some()),
            Err(err) if should_treat_as_empty(&err) => Ok(false),
            Err(err) => Err(SpfError::lookup("A/AAAA", name, err)),
        }
    }

    fn lookup_legacy_spf(&self, name: &str) -> Result<bool, SpfError> {
        match Resolver::lookup(self, name, RecordType::from(LEGACY_SPF_RR)) {
            Ok(lookup) => Ok(lookup.iter().next().is_some()),
            Err(err) if should_treat_as_empty(&err) => Ok(false),
            Err(err) => Err(SpfError::lookup("SPF", name, err)),
        }
    }
}

#[cfg(feature = "with-dns")]
fn collect_txt_records(name: &str, lookup: &TxtLookup) -> Result<Vec<String>, SpfError> {
    let mut records = Vec::new();
    for txt in lookup.iter() {
        let mut record = String::new();
        for piece in txt.txt_data().iter() {
            let segment = std::str::from_utf8(piece.as_ref())
                .map_err(|err| SpfError::txt_data_utf8(name, err))?;
            record.push_str(segment);
        }
        records.push(record);
    }
    Ok(records)
}

#[cfg(feature = "with-dns")]
fn normalize_exchange(exchange: &str) -> String {
    exchange.trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(feature = "with-dns")]
fn should_treat_as_empty(err: &ResolveError) -> bool {
    matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_domain_converts_unicode_and_strips_root_dot() {
        assert_eq!(normalize_domain(" bücher.example. ").unwrap(), "xn--bcher-kva.example");
    }

    #[test]
    fn normalize_domain_rejects_blank_input() {
        assert!(matches!(normalize_domain("  "), Err(SpfError::EmptyDomain)));
    }

    #[test]
    fn fqdn_prefixes_label() {
        assert_eq!(fqdn("_DMARC.", "example.com"), "_dmarc.example.com");
        assert_eq!(fqdn("", "example.com"), "example.com");
    }
}
