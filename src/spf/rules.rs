//! Best-practice rules. Each rule is a pure function returning at most one
//! [`Check`]; [`RULES`] fixes their evaluation order.

use crate::upstream::{Diagnostic, UpstreamResponse, codes};

use super::complexity::{authorized_hosts, is_wide_block};
use super::lookups::MAX_VOID_LOOKUPS;
use super::parser::is_version_token;
use super::services::detect_services;
use super::types::{Check, CheckCategory, CheckStatus, Mechanism, MechanismKind, ParsedRecord};

pub const RECORD_SIZE_WARNING: usize = 255;
pub const RECORD_SIZE_LIMIT: usize = 400;
pub const MAX_INCLUDES: usize = 5;
pub const MAX_A_MX: usize = 2;

pub struct RuleInput<'a> {
    /// Domain the record was published at; bare `a`/`mx` refer to it.
    pub domain: &'a str,
    pub parsed: &'a ParsedRecord,
    pub raw: &'a str,
    pub upstream: &'a UpstreamResponse,
}

pub type Rule = fn(&RuleInput<'_>) -> Option<Check>;

pub const RULES: &[Rule] = &[
    parsing_errors,
    multiple_records,
    unresolvable_hostnames,
    deprecated_record_type,
    redirect_position,
    record_size,
    wide_cidr_blocks,
    excess_includes,
    legacy_sender_id,
    ptr_mechanism,
    excess_a_mx,
    void_lookups,
    monitoring,
];

pub fn evaluate(input: &RuleInput<'_>) -> Vec<Check> {
    RULES.iter().filter_map(|rule| rule(input)).collect()
}

fn parsing_errors(input: &RuleInput<'_>) -> Option<Check> {
    let issues = &input.parsed.issues;
    if issues.is_empty() {
        return None;
    }
    let details = issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    Some(
        Check::new(
            "syntax",
            CheckCategory::Syntax,
            CheckStatus::Fail,
            "SPF record has parsing errors",
        )
        .with_details(details),
    )
}

/// Entries of `raw_record_entries` that are SPF policies; other TXT data is ignored.
pub(crate) fn spf_entries(entries: &[String]) -> Vec<&str> {
    entries
        .iter()
        .map(|entry| entry.trim())
        .filter(|entry| {
            entry
                .split_whitespace()
                .next()
                .is_some_and(is_version_token)
        })
        .collect()
}

fn multiple_records(input: &RuleInput<'_>) -> Option<Check> {
    let entries = spf_entries(&input.upstream.raw_record_entries);
    if entries.len() <= 1 {
        return None;
    }
    Some(
        Check::new(
            "multiple-records",
            CheckCategory::Syntax,
            CheckStatus::Fail,
            format!(
                "{} SPF records published; receivers return permerror when more than one exists",
                entries.len()
            ),
        )
        .with_details(entries.join(" | ")),
    )
}

fn is_resolution_failure(diagnostic: &Diagnostic) -> bool {
    let message = diagnostic.message.to_ascii_lowercase();
    diagnostic.code == codes::NXDOMAIN
        || diagnostic.code == codes::DNS_ERROR
        || message.contains("nxdomain")
        || message.contains("dns error")
}

/// `kind:host` looked up for `mechanism`, without any `/cidr` suffix.
fn lookup_key(mechanism: &Mechanism, domain: &str) -> String {
    let target = mechanism.target();
    let host = if target.is_empty() { domain } else { target };
    format!(
        "{}:{}",
        mechanism.kind,
        host.trim_end_matches('.').to_ascii_lowercase()
    )
}

fn unresolvable_hostnames(input: &RuleInput<'_>) -> Option<Check> {
    let failed: Vec<String> = input
        .upstream
        .diagnostics
        .iter()
        .filter(|diagnostic| is_resolution_failure(diagnostic))
        .filter_map(Diagnostic::lookup_target)
        .collect();
    if failed.is_empty() {
        return None;
    }

    let mut terms: Vec<String> = Vec::new();
    for mechanism in input.parsed.mechanisms.iter().filter(|m| {
        matches!(
            m.kind,
            MechanismKind::Include | MechanismKind::A | MechanismKind::Mx
        )
    }) {
        let key = lookup_key(mechanism, input.domain);
        if failed.contains(&key) && !terms.contains(&key) {
            terms.push(key);
        }
    }
    if terms.is_empty() {
        return None;
    }

    Some(
        Check::new(
            "unresolvable-hostnames",
            CheckCategory::Syntax,
            CheckStatus::Fail,
            format!("{} mechanism target(s) do not resolve in DNS", terms.len()),
        )
        .with_details(terms.join(", ")),
    )
}

fn deprecated_record_type(input: &RuleInput<'_>) -> Option<Check> {
    let detected = input.upstream.diagnostics.iter().any(|diagnostic| {
        let message = diagnostic.message.to_ascii_lowercase();
        diagnostic.code == codes::LEGACY_RR_TYPE
            || message.contains("type 99")
            || message.contains("spf rr")
    });
    detected.then(|| {
        Check::new(
            "deprecated-record-type",
            CheckCategory::Deprecated,
            CheckStatus::Warning,
            "Domain publishes the obsolete SPF (type 99) DNS record",
        )
        .with_details("RFC 7208 removed the SPF RR type; publish the policy as a TXT record only")
    })
}

fn redirect_position(input: &RuleInput<'_>) -> Option<Check> {
    let mechanisms = &input.parsed.mechanisms;
    let index = mechanisms
        .iter()
        .position(|m| m.kind == MechanismKind::Redirect)?;
    let target = &mechanisms[index].value;

    let message = if input.parsed.has(MechanismKind::All) {
        format!("redirect={target} is ignored because the record also contains an 'all' mechanism")
    } else if index + 1 != mechanisms.len() {
        format!("redirect={target} should be the last term of the record")
    } else {
        return None;
    };
    Some(Check::new(
        "redirect-position",
        CheckCategory::Syntax,
        CheckStatus::Warning,
        message,
    ))
}

fn record_size(input: &RuleInput<'_>) -> Option<Check> {
    let size = input.parsed.record_size;
    if size > RECORD_SIZE_LIMIT {
        Some(Check::new(
            "record-size",
            CheckCategory::Performance,
            CheckStatus::Fail,
            format!(
                "SPF record is {size} characters, over the {RECORD_SIZE_LIMIT} character limit that fits reliably in a DNS response"
            ),
        ))
    } else if size > RECORD_SIZE_WARNING {
        Some(Check::new(
            "record-size",
            CheckCategory::Performance,
            CheckStatus::Warning,
            format!(
                "SPF record is {size} characters; TXT strings over {RECORD_SIZE_WARNING} characters must be split"
            ),
        ))
    } else {
        None
    }
}

fn wide_cidr_blocks(input: &RuleInput<'_>) -> Option<Check> {
    let offenders: Vec<String> = input
        .parsed
        .mechanisms
        .iter()
        .filter(|m| is_wide_block(m))
        .filter_map(|m| authorized_hosts(m).map(|hosts| format!("{m} ({hosts} addresses)")))
        .collect();
    if offenders.is_empty() {
        return None;
    }
    Some(
        Check::new(
            "wide-cidr",
            CheckCategory::OverAuthorization,
            CheckStatus::Warning,
            format!(
                "{} CIDR block(s) authorize very large address ranges",
                offenders.len()
            ),
        )
        .with_details(offenders.join(", ")),
    )
}

fn excess_includes(input: &RuleInput<'_>) -> Option<Check> {
    let count = input.parsed.count(MechanismKind::Include);
    (count > MAX_INCLUDES).then(|| {
        Check::new(
            "excess-includes",
            CheckCategory::OverAuthorization,
            CheckStatus::Warning,
            format!(
                "{count} include mechanisms authorize many third parties; audit them periodically and drop unused senders"
            ),
        )
    })
}

fn legacy_sender_id(input: &RuleInput<'_>) -> Option<Check> {
    let is_sender_id = |text: &str| text.to_ascii_lowercase().contains("spf2.0");
    let detected = is_sender_id(input.raw)
        || input
            .upstream
            .raw_record_entries
            .iter()
            .any(|entry| is_sender_id(entry));
    detected.then(|| {
        Check::new(
            "legacy-sender-id",
            CheckCategory::Deprecated,
            CheckStatus::Warning,
            "Legacy Sender ID (spf2.0) syntax detected; Sender ID is obsolete and ignored by receivers",
        )
    })
}

fn ptr_mechanism(input: &RuleInput<'_>) -> Option<Check> {
    input.parsed.has(MechanismKind::Ptr).then(|| {
        Check::new(
            "ptr-mechanism",
            CheckCategory::Deprecated,
            CheckStatus::Warning,
            "ptr mechanism is deprecated (RFC 7208 section 5.5); list the addresses with ip4/ip6 instead",
        )
    })
}

fn excess_a_mx(input: &RuleInput<'_>) -> Option<Check> {
    let count = input.parsed.count(MechanismKind::A) + input.parsed.count(MechanismKind::Mx);
    (count > MAX_A_MX).then(|| {
        Check::new(
            "excess-a-mx",
            CheckCategory::Performance,
            CheckStatus::Warning,
            format!(
                "{count} a/mx mechanisms each cost a DNS lookup; use ip4/ip6 for hosts with stable addresses"
            ),
        )
    })
}

fn void_lookups(input: &RuleInput<'_>) -> Option<Check> {
    let count = input.parsed.void_lookup_count;
    if count > MAX_VOID_LOOKUPS {
        Some(Check::new(
            "void-lookups",
            CheckCategory::Performance,
            CheckStatus::Fail,
            format!("{count} void lookups exceed the RFC 7208 limit of {MAX_VOID_LOOKUPS}"),
        ))
    } else if count > 0 {
        Some(Check::new(
            "void-lookups",
            CheckCategory::Performance,
            CheckStatus::Warning,
            format!("{count} lookup(s) returned no answer (limit is {MAX_VOID_LOOKUPS})"),
        ))
    } else {
        None
    }
}

fn monitoring(input: &RuleInput<'_>) -> Option<Check> {
    let check = Check::new(
        "monitoring",
        CheckCategory::Monitoring,
        CheckStatus::Pass,
        "Monitor SPF results with DMARC aggregate reports (rua=) to spot unauthorized or broken senders",
    );
    let services = detect_services(input.parsed);
    if services.is_empty() {
        return Some(check);
    }
    let names = services
        .iter()
        .map(|service| service.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    Some(check.with_details(format!("Senders to watch in aggregate reports: {names}")))
}
