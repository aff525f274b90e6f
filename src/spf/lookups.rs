//! DNS-lookup accounting per RFC 7208 §4.6.4.

use super::types::{Check, CheckCategory, CheckStatus, Mechanism, MechanismKind, ParsedRecord};

/// Hard ceiling on DNS-querying terms evaluated for one record.
pub const MAX_LOOKUPS: u32 = 10;
/// Lookups returning NXDOMAIN or no answer tolerated before a permerror.
pub const MAX_VOID_LOOKUPS: u32 = 2;
/// First count of the "approaching the limit" band.
pub const WARNING_THRESHOLD: u32 = 8;

/// `include`, `a`, `mx`, `exists`, `redirect` and `ptr` cost one query each,
/// whatever they resolve to.
pub fn lookup_cost(kind: MechanismKind) -> u8 {
    match kind {
        MechanismKind::Include
        | MechanismKind::A
        | MechanismKind::Mx
        | MechanismKind::Exists
        | MechanismKind::Redirect
        | MechanismKind::Ptr => 1,
        MechanismKind::Ip4 | MechanismKind::Ip6 | MechanismKind::All => 0,
    }
}

pub fn count_lookups(mechanisms: &[Mechanism]) -> u32 {
    mechanisms
        .iter()
        .map(|mechanism| u32::from(mechanism.lookup_cost))
        .sum()
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "kebab-case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LookupBudget {
    /// 0..=7
    Safe,
    /// 8..=9
    Approaching,
    /// exactly 10: still accepted, no headroom left
    AtLimit,
    /// 11 and above
    Exceeded,
}

impl LookupBudget {
    pub fn classify(total: u32) -> Self {
        match total {
            t if t > MAX_LOOKUPS => Self::Exceeded,
            MAX_LOOKUPS => Self::AtLimit,
            t if t >= WARNING_THRESHOLD => Self::Approaching,
            _ => Self::Safe,
        }
    }

    /// The UI flags ten or more lookups as critical.
    pub fn is_critical(self) -> bool {
        matches!(self, Self::AtLimit | Self::Exceeded)
    }

    /// Receivers return permerror past this point.
    pub fn is_exceeded(self) -> bool {
        self == Self::Exceeded
    }

    pub fn within_limit(self) -> bool {
        !self.is_exceeded()
    }
}

pub(crate) fn lookup_check(parsed: &ParsedRecord) -> Check {
    let total = parsed.total_lookups();
    let budget = LookupBudget::classify(total);
    let (status, message) = match budget {
        LookupBudget::Safe => (
            CheckStatus::Pass,
            format!("{total} DNS lookups (limit is {MAX_LOOKUPS})"),
        ),
        LookupBudget::Approaching => (
            CheckStatus::Warning,
            format!("{total} DNS lookups, approaching the limit of {MAX_LOOKUPS}"),
        ),
        LookupBudget::AtLimit => (
            CheckStatus::Warning,
            format!("{total} DNS lookups, at the RFC 7208 limit of {MAX_LOOKUPS}: any new include will break SPF"),
        ),
        LookupBudget::Exceeded => (
            CheckStatus::Fail,
            format!(
                "{total} DNS lookups exceeds the RFC 7208 limit of {MAX_LOOKUPS}; receiving mail systems will likely reject the record"
            ),
        ),
    };

    let check = Check::new("dns-lookups", CheckCategory::Lookups, status, message);
    if parsed.secondary_lookup_count > 0 || parsed.void_lookup_count > 0 {
        check.with_details(format!(
            "{} top-level, {} nested, {} void",
            parsed.lookup_count, parsed.secondary_lookup_count, parsed.void_lookup_count
        ))
    } else {
        check
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::spf::parser::parse_record;

    #[test]
    fn budget_boundaries() {
        assert_eq!(LookupBudget::classify(0), LookupBudget::Safe);
        assert_eq!(LookupBudget::classify(7), LookupBudget::Safe);
        assert_eq!(LookupBudget::classify(8), LookupBudget::Approaching);
        assert_eq!(LookupBudget::classify(9), LookupBudget::Approaching);
        assert_eq!(LookupBudget::classify(10), LookupBudget::AtLimit);
        assert_eq!(LookupBudget::classify(11), LookupBudget::Exceeded);
        assert!(LookupBudget::classify(10).within_limit());
        assert!(LookupBudget::classify(10).is_critical());
        assert!(!LookupBudget::classify(9).is_critical());
        assert!(!LookupBudget::classify(11).within_limit());
    }

    fn record_with_includes(count: usize) -> ParsedRecord {
        let mut raw = String::from("v=spf1");
        for idx in 0..count {
            raw.push_str(&format!(" include:s{idx}.example.net"));
        }
        raw.push_str(" -all");
        parse_record(&raw)
    }

    #[test]
    fn check_status_follows_budget() {
        assert_eq!(lookup_check(&record_with_includes(9)).status, CheckStatus::Warning);
        let at_limit = lookup_check(&record_with_includes(10));
        assert_ne!(at_limit.status, CheckStatus::Fail);
        let exceeded = lookup_check(&record_with_includes(11));
        assert_eq!(exceeded.status, CheckStatus::Fail);
        assert!(exceeded.message.starts_with("11 DNS lookups"));
    }

    #[test]
    fn nested_counts_end_up_in_details() {
        let parsed = record_with_includes(2).with_nested_counts(7, 1);
        let check = lookup_check(&parsed);
        assert_eq!(check.status, CheckStatus::Warning);
        assert!(check.message.starts_with("9 DNS lookups"));
        assert_eq!(check.details.as_deref(), Some("2 top-level, 7 nested, 1 void"));
    }

    // (term, lookups it costs)
    fn term() -> impl Strategy<Value = (&'static str, u32)> {
        prop_oneof![
            Just(("include:a.example.com", 1)),
            Just(("a", 1)),
            Just(("-mx:mail.example.com/24", 1)),
            Just(("exists:%{i}.example.com", 1)),
            Just(("?ptr", 1)),
            Just(("redirect=x.example", 1)),
            Just(("ip4:192.0.2.0/24", 0)),
            Just(("ip6:2001:db8::/32", 0)),
            Just(("exp=explain.example.com", 0)),
            Just(("~all", 0)),
        ]
    }

    proptest! {
        #[test]
        fn lookup_count_matches_costly_terms(terms in proptest::collection::vec(term(), 0..20)) {
            let raw = format!(
                "v=spf1 {}",
                terms.iter().map(|(text, _)| *text).collect::<Vec<_>>().join(" ")
            );
            let expected: u32 = terms.iter().map(|(_, cost)| cost).sum();
            prop_assert_eq!(parse_record(&raw).lookup_count, expected);
        }
    }
}
