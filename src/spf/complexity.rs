use std::fmt;

use super::types::{ComplexityAnalysis, ComplexityRating, Mechanism, MechanismKind, ParsedRecord};

/// `ip4` blocks at or wider than this prefix are considered over-broad.
pub const WIDE_IP4_PREFIX: u8 = 16;
/// `ip6` blocks at or wider than this prefix are considered over-broad.
pub const WIDE_IP6_PREFIX: u8 = 48;
/// Past this size a single TXT answer gets uncomfortably close to UDP limits.
pub const LARGE_RECORD_BYTES: usize = 450;

const MAX_IP4_ENTRIES: usize = 3;
const MAX_IP6_ENTRIES: usize = 2;

/// Number of addresses a CIDR block authorizes.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCount {
    Exact(u128),
    /// `2^n` when the value does not fit in 128 bits (`ip6:::/0`).
    PowerOfTwo(u32),
}

impl HostCount {
    fn for_bits(bits: u32) -> Self {
        1u128
            .checked_shl(bits)
            .map(Self::Exact)
            .unwrap_or(Self::PowerOfTwo(bits))
    }
}

impl fmt::Display for HostCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(count) => f.write_str(&group_thousands(*count)),
            Self::PowerOfTwo(bits) => write!(f, "2^{bits}"),
        }
    }
}

fn group_thousands(value: u128) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// `2^(32-prefix)` for `ip4`, `2^(128-prefix)` for `ip6`; `None` for anything else.
pub fn authorized_hosts(mechanism: &Mechanism) -> Option<HostCount> {
    let prefix = u32::from(mechanism.prefix_len()?);
    let width = match mechanism.kind {
        MechanismKind::Ip4 => 32,
        MechanismKind::Ip6 => 128,
        _ => return None,
    };
    Some(HostCount::for_bits(width - prefix.min(width)))
}

pub fn is_wide_block(mechanism: &Mechanism) -> bool {
    match (mechanism.kind, mechanism.prefix_len()) {
        (MechanismKind::Ip4, Some(prefix)) => prefix <= WIDE_IP4_PREFIX,
        (MechanismKind::Ip6, Some(prefix)) => prefix <= WIDE_IP6_PREFIX,
        _ => false,
    }
}

pub fn rate(mechanism_count: usize, lookup_count: u32) -> ComplexityRating {
    if mechanism_count > 10 || lookup_count > 8 {
        ComplexityRating::Complex
    } else if mechanism_count > 5 || lookup_count > 5 {
        ComplexityRating::Moderate
    } else {
        ComplexityRating::Simple
    }
}

/// Rates the record and collects qualitative suggestions. Has no failure mode.
pub fn analyze(parsed: &ParsedRecord) -> ComplexityAnalysis {
    let mechanism_count = parsed.mechanisms.len();
    let lookup_count = parsed.total_lookups();
    let rating = rate(mechanism_count, lookup_count);
    let mut suggestions = Vec::new();

    for mechanism in parsed.mechanisms.iter().filter(|m| is_wide_block(m)) {
        if let Some(hosts) = authorized_hosts(mechanism) {
            suggestions.push(format!(
                "Narrow {mechanism}: it authorizes {hosts} addresses, more than any sending fleet needs"
            ));
        }
    }

    let ip4_count = parsed.count(MechanismKind::Ip4);
    if ip4_count > MAX_IP4_ENTRIES {
        suggestions.push(format!(
            "Consolidate the {ip4_count} ip4 entries into fewer CIDR ranges"
        ));
    }
    let ip6_count = parsed.count(MechanismKind::Ip6);
    if ip6_count > MAX_IP6_ENTRIES {
        suggestions.push(format!(
            "Consolidate the {ip6_count} ip6 entries into fewer CIDR ranges"
        ));
    }

    if lookup_count > 8 {
        suggestions.push(
            "Flatten include chains or replace a/mx with ip4/ip6 to free DNS lookups".to_string(),
        );
    }
    if mechanism_count > 10 {
        suggestions.push(format!(
            "{mechanism_count} mechanisms make the policy hard to audit; remove senders you no longer use"
        ));
    }
    if parsed.record_size > LARGE_RECORD_BYTES {
        suggestions.push(format!(
            "Record is {} bytes, close to practical DNS TXT limits; move groups of senders behind include subdomains",
            parsed.record_size
        ));
    }

    if suggestions.is_empty() && rating == ComplexityRating::Simple && lookup_count <= 5 {
        suggestions.push("SPF record is well optimized".to_string());
    }

    ComplexityAnalysis {
        rating,
        mechanism_count,
        lookup_count,
        record_size: parsed.record_size,
        suggestions,
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use proptest::prelude::*;

    use super::*;
    use crate::spf::parser::parse_record;
    use crate::spf::types::Qualifier;

    #[test]
    fn host_counts_are_grouped() {
        let slash8 = Mechanism::new(MechanismKind::Ip4, Qualifier::Pass, "10.0.0.0/8");
        assert_snapshot!(authorized_hosts(&slash8).unwrap().to_string(), @"16,777,216");
        let host = Mechanism::new(MechanismKind::Ip4, Qualifier::Pass, "192.0.2.1");
        assert_snapshot!(authorized_hosts(&host).unwrap().to_string(), @"1");
        let v6 = Mechanism::new(MechanismKind::Ip6, Qualifier::Pass, "2001:db8::/96");
        assert_snapshot!(authorized_hosts(&v6).unwrap().to_string(), @"4,294,967,296");
        let everything = Mechanism::new(MechanismKind::Ip6, Qualifier::Pass, "::/0");
        assert_snapshot!(authorized_hosts(&everything).unwrap().to_string(), @"2^128");
    }

    #[test]
    fn wide_thresholds_are_inclusive() {
        let v4 = |v: &str| Mechanism::new(MechanismKind::Ip4, Qualifier::Pass, v);
        let v6 = |v: &str| Mechanism::new(MechanismKind::Ip6, Qualifier::Pass, v);
        assert!(is_wide_block(&v4("172.16.0.0/16")));
        assert!(!is_wide_block(&v4("172.16.0.0/17")));
        assert!(is_wide_block(&v6("2001:db8::/48")));
        assert!(!is_wide_block(&v6("2001:db8::/56")));
    }

    #[test]
    fn simple_record_gets_single_positive_suggestion() {
        let analysis = analyze(&parse_record("v=spf1 ip4:192.0.2.0/24 -all"));
        assert_eq!(analysis.rating, ComplexityRating::Simple);
        assert_eq!(analysis.mechanism_count, 2);
        assert_eq!(analysis.lookup_count, 0);
        assert_eq!(analysis.suggestions, vec!["SPF record is well optimized".to_string()]);
    }

    #[test]
    fn consolidation_and_wide_block_suggestions() {
        let analysis = analyze(&parse_record(
            "v=spf1 ip4:10.0.0.0/8 ip4:192.0.2.1 ip4:192.0.2.2 ip4:192.0.2.3 ip6:2001:db8::1 ip6:2001:db8::2 ip6:2001:db8::3 -all",
        ));
        assert_eq!(analysis.rating, ComplexityRating::Moderate);
        assert!(analysis.suggestions[0].starts_with("Narrow ip4:10.0.0.0/8"));
        assert!(analysis.suggestions.iter().any(|s| s.contains("4 ip4 entries")));
        assert!(analysis.suggestions.iter().any(|s| s.contains("3 ip6 entries")));
    }

    #[test]
    fn large_record_suggestion() {
        let mut raw = String::from("v=spf1");
        while raw.len() <= LARGE_RECORD_BYTES {
            raw.push_str(" ip4:192.0.2.1");
        }
        raw.push_str(" -all");
        let analysis = analyze(&parse_record(&raw));
        assert!(analysis.suggestions.iter().any(|s| s.contains("close to practical DNS TXT limits")));
    }

    proptest! {
        #[test]
        fn many_mechanisms_or_lookups_are_complex(mechanisms in 0usize..30, lookups in 0u32..30) {
            let rating = rate(mechanisms, lookups);
            if mechanisms > 10 || lookups > 8 {
                prop_assert_eq!(rating, ComplexityRating::Complex);
            } else if mechanisms > 5 || lookups > 5 {
                prop_assert_eq!(rating, ComplexityRating::Moderate);
            } else {
                prop_assert_eq!(rating, ComplexityRating::Simple);
            }
        }
    }
}
