//! Concurrent SPF, DMARC and MX fetch for a single domain.

use std::fmt;
use std::thread;

use crate::spf::{SpfAnalysis, SpfError, analyze_with_source};
use crate::upstream::{DnsLookup, MxRecord, SpfSource, fqdn};

#[cfg(feature = "with-dns")]
use crate::spf::AnalysisOptions;

/// Result of one independent fetch. A failure here never affects the others.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome<T> {
    Fetched(T),
    Failed { message: String },
}

impl<T> FetchOutcome<T> {
    pub fn is_fetched(&self) -> bool {
        matches!(self, Self::Fetched(_))
    }

    pub fn fetched(&self) -> Option<&T> {
        match self {
            Self::Fetched(value) => Some(value),
            Self::Failed { .. } => None,
        }
    }

    fn failed(message: impl fmt::Display) -> Self {
        Self::Failed {
            message: message.to_string(),
        }
    }
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPosture {
    pub domain: String,
    pub spf: SpfAnalysis,
    /// `v=DMARC1` TXT entries published at `_dmarc.<domain>`.
    pub dmarc: FetchOutcome<Vec<String>>,
    pub mx: FetchOutcome<Vec<MxRecord>>,
}

#[cfg(feature = "with-dns")]
pub fn check_domain_posture(
    domain: &str,
    options: &AnalysisOptions,
) -> Result<DomainPosture, SpfError> {
    use crate::upstream::{DnsSpfSource, normalize_domain};
    use trust_dns_resolver::Resolver;

    let ascii = normalize_domain(domain)?;
    let resolver = Resolver::from_system_conf().map_err(SpfError::resolver_init)?;
    let source = DnsSpfSource::new(&resolver, options.clone());
    Ok(check_posture(&source, &resolver, &ascii))
}

/// Fetches DMARC and MX on scoped threads while the SPF analysis runs on
/// the caller's thread.
pub fn check_posture<S, L>(spf_source: &S, dns: &L, domain: &str) -> DomainPosture
where
    S: SpfSource + ?Sized,
    L: DnsLookup + Sync + ?Sized,
{
    let dmarc_name = fqdn("_dmarc", domain);

    thread::scope(|scope| {
        let dmarc = scope.spawn(|| {
            dns.lookup_txt(&dmarc_name).map(|records| {
                records
                    .into_iter()
                    .map(|record| record.trim().to_string())
                    .filter(|record| is_dmarc_record(record))
                    .collect::<Vec<_>>()
            })
        });
        let mx = scope.spawn(|| {
            dns.lookup_mx(domain).map(|mut records| {
                records.sort();
                records.dedup();
                records
            })
        });

        let spf = analyze_with_source(spf_source, domain);
        let posture = DomainPosture {
            domain: domain.to_string(),
            spf,
            dmarc: outcome(dmarc.join()),
            mx: outcome(mx.join()),
        };

        #[cfg(feature = "with-tracing")]
        tracing::debug!(
            domain,
            dmarc = posture.dmarc.is_fetched(),
            mx = posture.mx.is_fetched(),
            "posture fan-out complete"
        );

        posture
    })
}

fn outcome<T>(joined: thread::Result<Result<T, SpfError>>) -> FetchOutcome<T> {
    match joined {
        Ok(Ok(value)) => FetchOutcome::Fetched(value),
        Ok(Err(err)) => FetchOutcome::failed(err),
        Err(_) => FetchOutcome::failed("lookup thread panicked"),
    }
}

fn is_dmarc_record(record: &str) -> bool {
    record
        .split(';')
        .next()
        .is_some_and(|tag| tag.trim().eq_ignore_ascii_case("v=DMARC1"))
}
