mod complexity;
mod error;
mod lookups;
mod options;
mod parser;
mod rules;
mod services;
mod tree;
mod types;

pub use complexity::{
    HostCount, LARGE_RECORD_BYTES, WIDE_IP4_PREFIX, WIDE_IP6_PREFIX, analyze as analyze_complexity,
    authorized_hosts, is_wide_block, rate as rate_complexity,
};
pub use error::SpfError;
pub use lookups::{LookupBudget, MAX_LOOKUPS, MAX_VOID_LOOKUPS, count_lookups, lookup_cost};
pub use options::AnalysisOptions;
pub use parser::{parse_record, parse_record_parts, tokenize};
pub(crate) use parser::is_version_token;
pub use rules::{RULES, Rule, RuleInput, evaluate as evaluate_rules};
pub use services::detect_services;
pub use tree::{IncludeTree, IncludeTreeNode, NodeState};
pub use types::{
    AnalysisStatus, Check, CheckCategory, CheckStatus, ComplexityAnalysis, ComplexityRating,
    DetectedService, Mechanism, MechanismKind, ParseIssue, ParsedRecord, Qualifier,
    ServiceCategory, ServiceStatus, SpfAnalysis,
};

use crate::upstream::{Diagnostic, DiagnosticSeverity, MechanismPart, SpfSource, UpstreamResponse};

#[cfg(feature = "with-dns")]
use crate::upstream::{DnsSpfSource, normalize_domain};

/// Resolves `domain` with the system resolver and analyses its SPF policy.
#[cfg(feature = "with-dns")]
pub fn analyze_domain(domain: &str) -> Result<SpfAnalysis, SpfError> {
    analyze_domain_with_options(domain, &AnalysisOptions::default())
}

#[cfg(feature = "with-dns")]
pub fn analyze_domain_with_options(
    domain: &str,
    options: &AnalysisOptions,
) -> Result<SpfAnalysis, SpfError> {
    let ascii = normalize_domain(domain)?;
    let source = DnsSpfSource::from_system_conf(options.clone())?;
    Ok(analyze_with_source(&source, &ascii))
}

/// One resolver call, then the full pipeline. Never fails: resolver errors
/// become a `fail` check on an [`AnalysisStatus::Error`] result.
pub fn analyze_with_source<S>(source: &S, domain: &str) -> SpfAnalysis
where
    S: SpfSource + ?Sized,
{
    #[cfg(feature = "with-tracing")]
    tracing::debug!(domain, "resolving SPF policy");

    let response = source.resolve_spf(domain);

    #[cfg(feature = "with-tracing")]
    if let Err(err) = &response {
        tracing::warn!(domain, error = %err, "SPF resolution failed");
    }

    analyze_response(domain, response)
}

/// Analyses a literal record as if a resolver had returned it alone.
pub fn analyze_record(domain: &str, record: &str) -> SpfAnalysis {
    analyze_response(domain, Ok(UpstreamResponse::from_record(record)))
}

pub fn analyze_response(
    domain: &str,
    response: Result<UpstreamResponse, SpfError>,
) -> SpfAnalysis {
    let upstream = match response {
        Ok(upstream) => upstream,
        Err(err) => return lookup_failure(domain, &err),
    };
    let forwarded = forward_diagnostics(&upstream.diagnostics);

    let Some(record) = select_record(&upstream.raw_record_entries) else {
        return missing_record(domain, forwarded);
    };

    let tokenized: Vec<MechanismPart>;
    let parts: &[MechanismPart] = if upstream.mechanism_parts.is_empty() {
        tokenized = tokenize(&record);
        &tokenized
    } else {
        &upstream.mechanism_parts
    };
    let record_size = if upstream.record_size_bytes > 0 {
        upstream.record_size_bytes
    } else {
        record.len()
    };
    let mut parsed = parse_record_parts(parts, record_size)
        .with_nested_counts(upstream.secondary_lookup_count, upstream.void_lookup_count);
    if parsed.redirected_to.is_none() {
        parsed.redirected_to = upstream.redirected_to.clone();
    }

    let mut checks = Vec::with_capacity(forwarded.len() + 3 + RULES.len());
    checks.push(
        Check::new(
            "spf-record",
            CheckCategory::Record,
            CheckStatus::Pass,
            "SPF record found",
        )
        .with_details(record.clone()),
    );
    checks.extend(forwarded);
    checks.push(lookups::lookup_check(&parsed));
    checks.push(all_mechanism_check(&parsed));
    checks.extend(rules::evaluate(&RuleInput {
        domain,
        parsed: &parsed,
        raw: &record,
        upstream: &upstream,
    }));

    let published = rules::spf_entries(&upstream.raw_record_entries).len();
    let status = if published > 1 || !parsed.issues.is_empty() {
        AnalysisStatus::Invalid
    } else {
        AnalysisStatus::Valid
    };

    SpfAnalysis {
        domain: domain.to_string(),
        status,
        score: score(status, &parsed),
        recommendations: recommendations(&checks, &parsed),
        complexity: Some(complexity::analyze(&parsed)),
        services: detect_services(&parsed),
        record: Some(record),
        parsed: Some(parsed),
        checks,
    }
}

fn select_record(entries: &[String]) -> Option<String> {
    entries
        .iter()
        .map(|entry| entry.trim())
        .find(|entry| {
            entry
                .split_whitespace()
                .next()
                .is_some_and(is_version_token)
        })
        .map(str::to_string)
}

fn lookup_failure(domain: &str, err: &SpfError) -> SpfAnalysis {
    SpfAnalysis {
        domain: domain.to_string(),
        status: AnalysisStatus::Error,
        score: 0,
        record: None,
        parsed: None,
        checks: vec![
            Check::new(
                "spf-lookup",
                CheckCategory::Record,
                CheckStatus::Fail,
                "Failed to lookup SPF record",
            )
            .with_details(err.to_string()),
        ],
        recommendations: vec![
            "Check that the domain exists and its name servers answer TXT queries".to_string(),
        ],
        complexity: None,
        services: Vec::new(),
    }
}

fn missing_record(domain: &str, forwarded: Vec<Check>) -> SpfAnalysis {
    let mut checks = vec![Check::new(
        "spf-record",
        CheckCategory::Record,
        CheckStatus::Fail,
        "No SPF record found",
    )];
    checks.extend(forwarded);
    SpfAnalysis {
        domain: domain.to_string(),
        status: AnalysisStatus::Missing,
        score: 0,
        record: None,
        parsed: None,
        checks,
        recommendations: vec![format!(
            "Publish a TXT record at {domain} such as \"v=spf1 include:<provider> -all\" listing every service that sends mail for the domain"
        )],
        complexity: None,
        services: Vec::new(),
    }
}

/// One `upstream-<code>` check per diagnostic code, in first-seen order.
/// Repeated codes are folded: the worst severity wins and every message
/// ends up in the details.
fn forward_diagnostics(diagnostics: &[Diagnostic]) -> Vec<Check> {
    let mut groups: Vec<(&str, Vec<&Diagnostic>)> = Vec::new();
    for diagnostic in diagnostics {
        match groups.iter_mut().find(|(code, _)| *code == diagnostic.code) {
            Some((_, members)) => members.push(diagnostic),
            None => groups.push((diagnostic.code.as_str(), vec![diagnostic])),
        }
    }

    groups
        .into_iter()
        .map(|(code, members)| {
            let status = members
                .iter()
                .map(|diagnostic| severity_status(diagnostic.severity))
                .max_by_key(|status| status_rank(*status))
                .unwrap_or(CheckStatus::Info);
            let id = format!("upstream-{code}");
            match members.as_slice() {
                [single] => Check::new(id, CheckCategory::Upstream, status, single.message.clone()),
                _ => Check::new(
                    id,
                    CheckCategory::Upstream,
                    status,
                    format!("{} resolver diagnostics with code '{code}'", members.len()),
                )
                .with_details(
                    members
                        .iter()
                        .map(|diagnostic| diagnostic.message.as_str())
                        .collect::<Vec<_>>()
                        .join("; "),
                ),
            }
        })
        .collect()
}

fn severity_status(severity: DiagnosticSeverity) -> CheckStatus {
    match severity {
        DiagnosticSeverity::Error => CheckStatus::Fail,
        DiagnosticSeverity::Warning => CheckStatus::Warning,
        DiagnosticSeverity::Info => CheckStatus::Info,
    }
}

fn status_rank(status: CheckStatus) -> u8 {
    match status {
        CheckStatus::Pass => 0,
        CheckStatus::Info => 1,
        CheckStatus::Warning => 2,
        CheckStatus::Fail => 3,
    }
}

fn all_mechanism_check(parsed: &ParsedRecord) -> Check {
    let (status, message) = match parsed.all_qualifier {
        Some(Qualifier::Fail) => (
            CheckStatus::Pass,
            "Record ends with -all: unauthorized senders fail SPF".to_string(),
        ),
        Some(Qualifier::SoftFail) => (
            CheckStatus::Pass,
            "Record ends with ~all: unauthorized senders soft-fail SPF".to_string(),
        ),
        Some(Qualifier::Neutral) => (
            CheckStatus::Warning,
            "?all gives unauthorized senders a neutral result and offers no protection".to_string(),
        ),
        Some(Qualifier::Pass) => (
            CheckStatus::Fail,
            "+all authorizes every host on the internet to send mail for this domain".to_string(),
        ),
        None => {
            return match &parsed.redirected_to {
                Some(target) => Check::new(
                    "missing-all",
                    CheckCategory::Enforcement,
                    CheckStatus::Info,
                    format!("No 'all' mechanism; enforcement is delegated to redirect={target}"),
                ),
                None => Check::new(
                    "missing-all",
                    CheckCategory::Enforcement,
                    CheckStatus::Warning,
                    "No 'all' mechanism: mail from unlisted servers is not rejected",
                ),
            };
        }
    };
    Check::new("all-mechanism", CheckCategory::Enforcement, status, message)
}

/// Each threshold requires the previous one; the first unmet step caps the score.
fn score(status: AnalysisStatus, parsed: &ParsedRecord) -> u8 {
    if status != AnalysisStatus::Valid {
        return 0;
    }
    let lookups = parsed.total_lookups();
    if lookups > MAX_LOOKUPS {
        return 1;
    }
    if !parsed.all_qualifier.is_some_and(Qualifier::is_enforcing) {
        return 2;
    }
    if lookups > 8 {
        return 3;
    }
    if lookups > 5 {
        return 4;
    }
    5
}

fn recommendations(checks: &[Check], parsed: &ParsedRecord) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for check in checks
        .iter()
        .filter(|check| matches!(check.status, CheckStatus::Fail | CheckStatus::Warning))
    {
        let Some(text) = recommendation_for(check, parsed) else {
            continue;
        };
        if !out.contains(&text) {
            out.push(text);
        }
    }
    if parsed.all_qualifier == Some(Qualifier::SoftFail) {
        out.push("Move from ~all to -all once every legitimate sender is listed".to_string());
    }
    out
}

fn recommendation_for(check: &Check, parsed: &ParsedRecord) -> Option<String> {
    let text = match check.id.as_str() {
        "dns-lookups" => format!(
            "Reduce DNS lookups (currently {}) by flattening includes or replacing a/mx with ip4/ip6",
            parsed.total_lookups()
        ),
        "all-mechanism" => {
            let current = parsed.all_qualifier.map(Qualifier::as_all_term)?;
            format!("Replace '{current}' with '~all' or '-all'")
        }
        "missing-all" => "End the record with '~all' or '-all'".to_string(),
        "syntax" => "Fix the syntax errors so receivers do not return permerror".to_string(),
        "multiple-records" => "Merge every SPF policy into a single TXT record".to_string(),
        "unresolvable-hostnames" => {
            "Remove or fix mechanisms pointing at names that do not resolve".to_string()
        }
        "deprecated-record-type" => {
            "Delete the type 99 SPF record and keep only the TXT record".to_string()
        }
        "redirect-position" => {
            "Use either redirect= or an all mechanism, and place redirect= last".to_string()
        }
        "record-size" => "Shorten the record by moving senders behind include subdomains".to_string(),
        "wide-cidr" => "Restrict ip4/ip6 ranges to the addresses your mail servers use".to_string(),
        "excess-includes" => {
            "Review include mechanisms and remove services you no longer use".to_string()
        }
        "legacy-sender-id" => "Remove the obsolete spf2.0 Sender ID record".to_string(),
        "ptr-mechanism" => "Replace ptr with explicit ip4/ip6 or a mechanisms".to_string(),
        "excess-a-mx" => "Replace a/mx mechanisms with ip4/ip6 where addresses are stable".to_string(),
        "void-lookups" => "Remove mechanisms that reference names with no DNS records".to_string(),
        _ => return None,
    };
    Some(text)
}

#[cfg(test)]
mod tests;
