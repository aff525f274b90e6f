#[cfg(feature = "with-dns")]
use trust_dns_resolver::Resolver;

use super::{Diagnostic, DiagnosticSeverity, DnsLookup, MechanismPart, SpfSource, UpstreamResponse, codes};
use crate::spf::{AnalysisOptions, MechanismKind, SpfError, is_version_token, parse_record, tokenize};

/// [`SpfSource`] that builds responses from live DNS answers.
///
/// Besides the domain's own TXT entries it walks nested `include:` and
/// `redirect=` records to count secondary lookups, and probes mechanism
/// targets for void lookups.
#[derive(Debug)]
pub struct DnsSpfSource<L> {
    lookup: L,
    options: AnalysisOptions,
}

#[cfg(feature = "with-dns")]
impl DnsSpfSource<Resolver> {
    pub fn from_system_conf(options: AnalysisOptions) -> Result<Self, SpfError> {
        let resolver = Resolver::from_system_conf().map_err(SpfError::resolver_init)?;
        Ok(Self::new(resolver, options))
    }
}

impl<L> DnsSpfSource<L>
where
    L: DnsLookup,
{
    pub fn new(lookup: L, options: AnalysisOptions) -> Self {
        Self { lookup, options }
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    fn legacy_record_diagnostic(&self, domain: &str) -> Option<Diagnostic> {
        match self.lookup.lookup_legacy_spf(domain) {
            Ok(true) => Some(Diagnostic::new(
                codes::LEGACY_RR_TYPE,
                format!("{domain} publishes a type 99 SPF RR alongside its TXT record"),
                DiagnosticSeverity::Warning,
            )),
            Ok(false) => None,
            // Many resolvers refuse type 99 outright; that says nothing about the policy.
            Err(_err) => {
                #[cfg(feature = "with-tracing")]
                tracing::debug!(domain, error = %_err, "type 99 query failed");
                None
            }
        }
    }

    fn walk(&self, parts: &[MechanismPart], path: &mut Vec<String>, tally: &mut Walk) {
        let Some(current) = path.last().cloned() else {
            return;
        };
        for part in parts {
            let Some(kind) = MechanismKind::from_name(part.mechanism.trim()) else {
                continue;
            };
            let target = target_of(part);
            // Macro-expanded names depend on the sender and cannot be probed here.
            if target.contains('%') {
                continue;
            }
            match kind {
                MechanismKind::Include | MechanismKind::Redirect => {
                    if !target.is_empty() {
                        self.follow(kind, &target, path, tally);
                    }
                }
                MechanismKind::A => {
                    let host = if target.is_empty() { current.clone() } else { target };
                    match self.lookup.lookup_host(&host) {
                        Ok(true) => {}
                        Ok(false) => tally.record_void(
                            format!("a:{host}"),
                            "does not resolve (nxdomain)".to_string(),
                            DiagnosticSeverity::Warning,
                        ),
                        Err(err) => tally.dns_error(format!("a:{host}"), err),
                    }
                }
                MechanismKind::Mx => {
                    let host = if target.is_empty() { current.clone() } else { target };
                    match self.lookup.lookup_mx(&host) {
                        Ok(records) if records.is_empty() => tally.record_void(
                            format!("mx:{host}"),
                            "has no MX records (nxdomain)".to_string(),
                            DiagnosticSeverity::Warning,
                        ),
                        Ok(_) => {}
                        Err(err) => tally.dns_error(format!("mx:{host}"), err),
                    }
                }
                _ => {}
            }
        }
    }

    fn follow(&self, kind: MechanismKind, target: &str, path: &mut Vec<String>, tally: &mut Walk) {
        let term = format!("{kind}:{target}");
        if path.iter().any(|seen| seen == target) {
            tally.diagnostics.push(
                Diagnostic::new(
                    codes::INCLUDE_LOOP,
                    format!("{term} loops back through {}", path.join(" -> ")),
                    DiagnosticSeverity::Error,
                )
                .with_target(term),
            );
            return;
        }
        if path.len() > self.options.max_depth() {
            return;
        }

        #[cfg(feature = "with-tracing")]
        tracing::debug!(domain = target, depth = path.len(), "resolving nested SPF record");

        let records = match self.lookup.lookup_txt(target) {
            Ok(records) => records,
            Err(err) => {
                tally.dns_error(term, err);
                return;
            }
        };
        if records.is_empty() {
            tally.record_void(
                term,
                "has no TXT records (nxdomain)".to_string(),
                DiagnosticSeverity::Error,
            );
            return;
        }
        let Some(record) = records.iter().map(|r| r.trim()).find(|r| is_spf_entry(r)) else {
            tally.diagnostics.push(
                Diagnostic::new(
                    codes::NXDOMAIN,
                    format!("{term} publishes no SPF record"),
                    DiagnosticSeverity::Error,
                )
                .with_target(term),
            );
            return;
        };

        let nested = tokenize(record);
        tally.secondary += parse_record(record).lookup_count;
        path.push(target.to_string());
        self.walk(&nested, path, tally);
        path.pop();
    }
}

impl<L> SpfSource for DnsSpfSource<L>
where
    L: DnsLookup,
{
    fn resolve_spf(&self, domain: &str) -> Result<UpstreamResponse, SpfError> {
        let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
        if domain.is_empty() {
            return Err(SpfError::EmptyDomain);
        }

        let entries: Vec<String> = self
            .lookup
            .lookup_txt(&domain)?
            .into_iter()
            .map(|entry| entry.trim().to_string())
            .filter(|entry| is_spf_entry(entry))
            .collect();

        let mut diagnostics = Vec::new();
        if self.options.checks_legacy_rr() {
            diagnostics.extend(self.legacy_record_diagnostic(&domain));
        }

        let Some(first) = entries.first() else {
            return Ok(UpstreamResponse {
                diagnostics,
                ..UpstreamResponse::empty()
            });
        };

        let mut response = UpstreamResponse::from_record(first);
        let mut tally = Walk::default();
        if self.options.counts_nested_lookups() {
            let mut path = vec![domain.clone()];
            self.walk(&response.mechanism_parts, &mut path, &mut tally);
        }

        diagnostics.extend(tally.diagnostics);
        response.raw_record_entries = entries;
        response.secondary_lookup_count = tally.secondary;
        response.void_lookup_count = tally.void;
        response.diagnostics = diagnostics;
        Ok(response)
    }
}

#[derive(Debug, Default)]
struct Walk {
    secondary: u32,
    void: u32,
    diagnostics: Vec<Diagnostic>,
}

impl Walk {
    fn record_void(&mut self, term: String, outcome: String, severity: DiagnosticSeverity) {
        self.void += 1;
        self.diagnostics.push(
            Diagnostic::new(codes::NXDOMAIN, format!("{term} {outcome}"), severity).with_target(term),
        );
    }

    fn dns_error(&mut self, term: String, err: SpfError) {
        self.diagnostics.push(
            Diagnostic::new(
                codes::DNS_ERROR,
                format!("{term} lookup failed (dns error): {err}"),
                DiagnosticSeverity::Warning,
            )
            .with_target(term),
        );
    }
}

fn is_spf_entry(entry: &str) -> bool {
    entry.split_whitespace().next().is_some_and(is_version_token)
}

fn target_of(part: &MechanismPart) -> String {
    let value = part.value.trim();
    let host = value.split_once('/').map(|(host, _)| host).unwrap_or(value);
    host.trim_end_matches('.').to_ascii_lowercase()
}
