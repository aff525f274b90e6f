use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

use ipnet::{Ipv4Net, Ipv6Net};
use regex::Regex;

use crate::upstream::MechanismPart;

use super::types::{Mechanism, MechanismKind, ParseIssue, ParsedRecord, Qualifier};

// qualifier? name ( ':' | '=' | '/' ) value?
static TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<qualifier>[^A-Za-z0-9])?(?P<name>[A-Za-z][A-Za-z0-9._-]*)(?:(?P<sep>[:=/])(?P<value>.*))?$")
        .expect("term pattern compiles")
});

/// Parses a raw `v=spf1 ...` string. Never fails: defects end up in
/// [`ParsedRecord::issues`].
pub fn parse_record(raw: &str) -> ParsedRecord {
    let trimmed = raw.trim();
    let mut issues = Vec::new();
    match trimmed.split_whitespace().next() {
        Some(token) if is_version_token(token) => {}
        found => issues.push(ParseIssue::InvalidVersion {
            found: found.unwrap_or_default().to_string(),
        }),
    }

    let parts = tokenize(trimmed);
    let (mechanisms, parsed_issues) = parse_parts(&parts);
    issues.extend(parsed_issues);
    ParsedRecord::new(mechanisms, issues, trimmed.len())
}

/// Builds a record from the resolver's pre-tokenized parts.
pub fn parse_record_parts(parts: &[MechanismPart], record_size: usize) -> ParsedRecord {
    let (mechanisms, issues) = parse_parts(parts);
    ParsedRecord::new(mechanisms, issues, record_size)
}

/// Splits a record into `(mechanism, qualifier, value)` triples, skipping the
/// version tag and modifiers other than `redirect` (RFC 7208 §6: unknown
/// modifiers are ignored).
pub fn tokenize(record: &str) -> Vec<MechanismPart> {
    record
        .split_whitespace()
        .filter(|token| !is_version_token(token))
        .filter_map(tokenize_term)
        .collect()
}

fn tokenize_term(term: &str) -> Option<MechanismPart> {
    let Some(caps) = TERM.captures(term) else {
        return Some(MechanismPart::new(term, "", ""));
    };
    let qualifier = caps.name("qualifier").map(|m| m.as_str()).unwrap_or("");
    let name = caps
        .name("name")
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_default();
    let separator = caps.name("sep").map(|m| m.as_str());
    let value = caps.name("value").map(|m| m.as_str()).unwrap_or("");

    let kind = MechanismKind::from_name(&name);
    if separator == Some("=") && kind.is_none() {
        return None;
    }

    let value = if separator == Some("/") {
        format!("/{value}")
    } else {
        value.to_string()
    };
    Some(MechanismPart::new(name, qualifier, value))
}

fn parse_parts(parts: &[MechanismPart]) -> (Vec<Mechanism>, Vec<ParseIssue>) {
    let mut mechanisms = Vec::with_capacity(parts.len());
    let mut issues = Vec::new();
    let mut seen_redirect = false;

    for part in parts {
        let name = part.mechanism.trim();
        if name.is_empty() || is_version_token(name) || name.eq_ignore_ascii_case("v") {
            continue;
        }
        let term = part.to_term();
        let Some(kind) = MechanismKind::from_name(name) else {
            issues.push(ParseIssue::UnknownTerm { term });
            continue;
        };

        let qualifier = match parse_qualifier(&part.qualifier) {
            Some(qualifier) => qualifier,
            None => {
                issues.push(ParseIssue::InvalidQualifier {
                    term: term.clone(),
                    qualifier: part.qualifier.trim().to_string(),
                });
                Qualifier::Pass
            }
        };

        let value = part.value.trim().to_string();
        match kind {
            MechanismKind::Include | MechanismKind::Exists | MechanismKind::Redirect
                if value.is_empty() =>
            {
                issues.push(ParseIssue::MissingValue { term: term.clone() });
            }
            MechanismKind::Ip4 | MechanismKind::Ip6 if cidr_prefix(kind, &value).is_none() => {
                issues.push(ParseIssue::InvalidCidr { term: term.clone() });
            }
            _ => {}
        }
        if kind == MechanismKind::Redirect {
            if seen_redirect {
                issues.push(ParseIssue::DuplicateRedirect { term });
            }
            seen_redirect = true;
        }

        mechanisms.push(Mechanism::new(kind, qualifier, value));
    }

    (mechanisms, issues)
}

fn parse_qualifier(raw: &str) -> Option<Qualifier> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(Qualifier::Pass);
    }
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Qualifier::from_char(c),
        _ => None,
    }
}

pub(crate) fn is_version_token(token: &str) -> bool {
    token.eq_ignore_ascii_case("v=spf1")
}

/// Prefix length of an `ip4`/`ip6` value, `None` when it does not parse.
pub(crate) fn cidr_prefix(kind: MechanismKind, value: &str) -> Option<u8> {
    let value = value.trim();
    match kind {
        MechanismKind::Ip4 if value.contains('/') => {
            value.parse::<Ipv4Net>().ok().map(|net| net.prefix_len())
        }
        MechanismKind::Ip4 => value.parse::<Ipv4Addr>().ok().map(|_| 32),
        MechanismKind::Ip6 if value.contains('/') => {
            value.parse::<Ipv6Net>().ok().map(|net| net.prefix_len())
        }
        MechanismKind::Ip6 => value.parse::<Ipv6Addr>().ok().map(|_| 128),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_version_and_defaults_qualifier() {
        let parsed = parse_record("v=spf1 include:_spf.example.net ip4:192.0.2.0/24 -all");
        assert!(parsed.issues.is_empty(), "{:?}", parsed.issues);
        assert_eq!(parsed.mechanisms.len(), 3);
        assert_eq!(parsed.mechanisms[0].kind, MechanismKind::Include);
        assert_eq!(parsed.mechanisms[0].qualifier, Qualifier::Pass);
        assert_eq!(parsed.mechanisms[0].value, "_spf.example.net");
        assert_eq!(parsed.mechanisms[2].qualifier, Qualifier::Fail);
        assert_eq!(parsed.all_qualifier, Some(Qualifier::Fail));
    }

    #[test]
    fn bare_a_and_mx_keep_empty_or_cidr_value() {
        let parsed = parse_record("v=spf1 a mx/24 a:mail.example.com/28 ~all");
        let values: Vec<&str> = parsed.mechanisms.iter().map(|m| m.value.as_str()).collect();
        assert_eq!(values, vec!["", "/24", "mail.example.com/28", ""]);
        assert_eq!(parsed.mechanisms[2].target(), "mail.example.com");
        assert_eq!(parsed.lookup_count, 3);
    }

    #[test]
    fn redirect_is_kept_as_mechanism() {
        let parsed = parse_record("v=spf1 redirect=_spf.example.org");
        assert_eq!(parsed.mechanisms.len(), 1);
        assert_eq!(parsed.mechanisms[0].kind, MechanismKind::Redirect);
        assert_eq!(parsed.redirected_to.as_deref(), Some("_spf.example.org"));
        assert_eq!(parsed.all_qualifier, None);
    }

    #[test]
    fn unknown_modifiers_are_ignored_but_unknown_mechanisms_reported() {
        let parsed = parse_record("v=spf1 exp=explain.example.com foo:bar ip4:192.0.2.1 -all");
        assert_eq!(parsed.mechanisms.len(), 2);
        assert_eq!(
            parsed.issues,
            vec![ParseIssue::UnknownTerm {
                term: "foo:bar".to_string()
            }]
        );
    }

    #[test]
    fn lenient_on_bad_qualifier_and_cidr() {
        let parsed = parse_record("v=spf1 !include:bad.example ip4:300.1.1.1 ip6:2001:db8::/129 -all");
        assert_eq!(parsed.mechanisms.len(), 4);
        assert_eq!(parsed.mechanisms[0].qualifier, Qualifier::Pass);
        assert!(matches!(
            parsed.issues[0],
            ParseIssue::InvalidQualifier { ref qualifier, .. } if qualifier == "!"
        ));
        assert!(matches!(parsed.issues[1], ParseIssue::InvalidCidr { .. }));
        assert!(matches!(parsed.issues[2], ParseIssue::InvalidCidr { .. }));
    }

    #[test]
    fn invalid_version_is_reported() {
        let parsed = parse_record("spf2.0/pra include:example.com ~all");
        assert!(matches!(
            parsed.issues[0],
            ParseIssue::InvalidVersion { ref found } if found == "spf2.0/pra"
        ));
    }

    #[test]
    fn empty_input_yields_empty_record() {
        let parsed = parse_record("");
        assert!(parsed.mechanisms.is_empty());
        assert_eq!(parsed.record_size, 0);
        assert_eq!(parsed.issues.len(), 1);
    }

    #[test]
    fn cidr_prefix_defaults_to_host_route() {
        assert_eq!(cidr_prefix(MechanismKind::Ip4, "192.0.2.1"), Some(32));
        assert_eq!(cidr_prefix(MechanismKind::Ip4, "10.0.0.0/8"), Some(8));
        assert_eq!(cidr_prefix(MechanismKind::Ip6, "2001:db8::1"), Some(128));
        assert_eq!(cidr_prefix(MechanismKind::Ip6, "2001:db8::/32"), Some(32));
        assert_eq!(cidr_prefix(MechanismKind::Include, "example.com"), None);
    }

    #[test]
    fn parts_round_trip_through_tokenizer() {
        let parts = tokenize("v=spf1 ?include:example.com redirect=_spf.example.com");
        assert_eq!(parts[0], MechanismPart::new("include", "?", "example.com"));
        assert_eq!(parts[1], MechanismPart::new("redirect", "", "_spf.example.com"));
        let parsed = parse_record_parts(&parts, 52);
        assert_eq!(parsed.mechanisms[0].qualifier, Qualifier::Neutral);
        assert_eq!(parsed.record_size, 52);
    }
}
