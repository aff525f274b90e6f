use proptest::prelude::*;

use super::*;
use crate::upstream::{Diagnostic, DiagnosticSeverity, codes};

fn summary(analysis: &SpfAnalysis) -> String {
    analysis
        .checks
        .iter()
        .map(|check| format!("{} {}", check.status.as_str(), check.id))
        .collect::<Vec<_>>()
        .join("\n")
}

fn status_of(analysis: &SpfAnalysis, id: &str) -> Option<CheckStatus> {
    analysis.check(id).map(|check| check.status)
}

fn with_lookups(n: usize) -> String {
    let mut record = String::from("v=spf1");
    for i in 0..n {
        record.push_str(&format!(" a:host{i}.example.com"));
    }
    record.push_str(" -all");
    record
}

#[test]
fn single_network_record_scores_full_marks() {
    let analysis = analyze_record("example.com", "v=spf1 ip4:192.0.2.0/24 -all");

    assert_eq!(analysis.status, AnalysisStatus::Valid);
    assert_eq!(analysis.score, 5);
    let parsed = analysis.parsed.as_ref().expect("parsed");
    assert_eq!(parsed.lookup_count, 0);
    assert_eq!(parsed.all_qualifier, Some(Qualifier::Fail));
    let complexity = analysis.complexity.as_ref().expect("complexity");
    assert_eq!(complexity.rating, ComplexityRating::Simple);
    insta::assert_snapshot!(summary(&analysis), @r"
    pass spf-record
    pass dns-lookups
    pass all-mechanism
    pass monitoring
    ");
    assert!(analysis.recommendations.is_empty());
}

#[test]
fn six_includes_without_all() {
    let analysis = analyze_record(
        "example.com",
        "v=spf1 include:one.example include:two.example include:three.example \
         include:four.example include:five.example include:six.example",
    );

    let parsed = analysis.parsed.as_ref().expect("parsed");
    assert!(parsed.lookup_count >= 6);
    assert_eq!(status_of(&analysis, "excess-includes"), Some(CheckStatus::Warning));
    assert!(analysis.check("all-mechanism").is_none());
    assert_eq!(status_of(&analysis, "missing-all"), Some(CheckStatus::Warning));
    assert_eq!(analysis.score, 2);
}

#[test]
fn slash_eight_is_flagged_but_softfail_passes() {
    let analysis = analyze_record("example.com", "v=spf1 ip4:10.0.0.0/8 ~all");

    let wide = analysis.check("wide-cidr").expect("wide-cidr");
    assert_eq!(wide.status, CheckStatus::Warning);
    assert_eq!(wide.details.as_deref(), Some("ip4:10.0.0.0/8 (16,777,216 addresses)"));
    assert_eq!(status_of(&analysis, "all-mechanism"), Some(CheckStatus::Pass));
    assert!(analysis
        .recommendations
        .iter()
        .any(|text| text.starts_with("Move from ~all to -all")));
}

#[test]
fn oversized_record_fails_with_exact_length() {
    let mut record = String::from("v=spf1");
    for i in 0..30 {
        record.push_str(&format!(" ip4:192.0.2.{i}"));
    }
    record.push_str(" -all");
    assert!(record.len() > 400);

    let analysis = analyze_record("example.com", &record);
    let size = analysis.check("record-size").expect("record-size");
    assert_eq!(size.status, CheckStatus::Fail);
    assert!(size.message.contains(&format!("{} characters", record.len())));
}

#[test]
fn two_txt_entries_fail_regardless_of_content() {
    let upstream = UpstreamResponse::from_record("v=spf1 -all")
        .with_entries(["v=spf1 -all", "v=spf1 ip4:192.0.2.1 -all"]);
    let analysis = analyze_response("example.com", Ok(upstream));

    assert_eq!(status_of(&analysis, "multiple-records"), Some(CheckStatus::Fail));
    assert_eq!(analysis.status, AnalysisStatus::Invalid);
    assert_eq!(analysis.score, 0);
}

#[test]
fn lookup_ceiling_boundaries() {
    let nine = analyze_record("example.com", &with_lookups(9));
    let ten = analyze_record("example.com", &with_lookups(10));
    let eleven = analyze_record("example.com", &with_lookups(11));

    assert_eq!(status_of(&nine, "dns-lookups"), Some(CheckStatus::Warning));
    assert_ne!(status_of(&ten, "dns-lookups"), Some(CheckStatus::Fail));
    assert_eq!(status_of(&eleven, "dns-lookups"), Some(CheckStatus::Fail));

    assert_eq!(nine.score, 3);
    assert_eq!(ten.score, 3);
    assert_eq!(eleven.score, 1);
}

#[test]
fn nested_lookups_count_against_the_ceiling() {
    let upstream = UpstreamResponse::from_record("v=spf1 include:_spf.example.net -all")
        .with_nested_counts(10, 0);
    let analysis = analyze_response("example.com", Ok(upstream));

    let check = analysis.check("dns-lookups").expect("dns-lookups");
    assert_eq!(check.status, CheckStatus::Fail);
    assert_eq!(check.details.as_deref(), Some("1 top-level, 10 nested, 0 void"));
    assert_eq!(analysis.score, 1);
}

#[test]
fn score_steps_follow_enforcement_and_lookups() {
    let score = |record: &str| analyze_record("example.com", record).score;

    assert_eq!(score("v=spf1 ip4:192.0.2.1 ?all"), 2);
    assert_eq!(score("v=spf1 ip4:192.0.2.1 +all"), 2);
    assert_eq!(score(&with_lookups(5)), 5);
    assert_eq!(score(&with_lookups(6)), 4);
    assert_eq!(score(&with_lookups(8)), 4);
    assert_eq!(score(&with_lookups(9)), 3);
}

#[test]
fn all_qualifier_outcomes() {
    let status = |record: &str| status_of(&analyze_record("example.com", record), "all-mechanism");

    assert_eq!(status("v=spf1 -all"), Some(CheckStatus::Pass));
    assert_eq!(status("v=spf1 ~all"), Some(CheckStatus::Pass));
    assert_eq!(status("v=spf1 ?all"), Some(CheckStatus::Warning));
    assert_eq!(status("v=spf1 +all"), Some(CheckStatus::Fail));
}

#[test]
fn redirect_delegates_enforcement() {
    let analysis = analyze_record("example.com", "v=spf1 redirect=_spf.example.net");

    assert_eq!(status_of(&analysis, "missing-all"), Some(CheckStatus::Info));
    let parsed = analysis.parsed.as_ref().expect("parsed");
    assert_eq!(parsed.redirected_to.as_deref(), Some("_spf.example.net"));
}

#[test]
fn missing_record_is_reported() {
    let upstream = UpstreamResponse::empty().with_entries(["google-site-verification=abc"]);
    let analysis = analyze_response("example.com", Ok(upstream));

    assert_eq!(analysis.status, AnalysisStatus::Missing);
    assert_eq!(analysis.score, 0);
    assert!(analysis.parsed.is_none());
    assert_eq!(status_of(&analysis, "spf-record"), Some(CheckStatus::Fail));
    assert_eq!(analysis.recommendations.len(), 1);
}

#[test]
fn unrelated_txt_next_to_the_policy_is_not_a_second_record() {
    let upstream = UpstreamResponse::from_record("v=spf1 -all")
        .with_entries(["google-site-verification=abc", "v=spf1 -all"]);
    let analysis = analyze_response("example.com", Ok(upstream));

    assert_eq!(analysis.status, AnalysisStatus::Valid);
    assert_eq!(status_of(&analysis, "multiple-records"), None);
    assert_eq!(analysis.score, 5);
}

#[test]
fn repeated_diagnostic_codes_fold_into_one_check() {
    let upstream = UpstreamResponse::from_record("v=spf1 include:gone.example.net a -all")
        .with_diagnostic(Diagnostic::new(
            codes::NXDOMAIN,
            "a:example.com does not resolve (nxdomain)",
            DiagnosticSeverity::Warning,
        ))
        .with_diagnostic(Diagnostic::new(
            codes::NXDOMAIN,
            "include:gone.example.net has no TXT records (nxdomain)",
            DiagnosticSeverity::Error,
        ));
    let analysis = analyze_response("example.com", Ok(upstream));

    let ids: Vec<_> = analysis.checks.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(&ids[..3], ["spf-record", "upstream-nxdomain", "dns-lookups"]);
    let folded = &analysis.checks[1];
    assert_eq!(folded.status, CheckStatus::Fail);
    assert_eq!(folded.message, "2 resolver diagnostics with code 'nxdomain'");
    assert_eq!(
        status_of(&analysis, "unresolvable-hostnames"),
        Some(CheckStatus::Fail)
    );
}

#[test]
fn resolver_failure_is_a_single_fail_check() {
    let analysis = analyze_response(
        "example.com",
        Err(SpfError::upstream("example.com", "timed out")),
    );

    assert_eq!(analysis.status, AnalysisStatus::Error);
    assert_eq!(analysis.checks.len(), 1);
    let check = &analysis.checks[0];
    assert_eq!(check.status, CheckStatus::Fail);
    assert_eq!(check.message, "Failed to lookup SPF record");
    assert_eq!(
        check.details.as_deref(),
        Some("resolver failed for example.com: timed out")
    );
}

#[test]
fn upstream_diagnostics_follow_the_record_check() {
    let upstream = UpstreamResponse::from_record("v=spf1 -all")
        .with_diagnostic(Diagnostic::new(
            codes::LEGACY_RR_TYPE,
            "example.com publishes a type 99 SPF RR",
            DiagnosticSeverity::Warning,
        ))
        .with_diagnostic(Diagnostic::new("note", "cached answer", DiagnosticSeverity::Info));
    let analysis = analyze_response("example.com", Ok(upstream));

    let ids: Vec<_> = analysis.checks.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(
        &ids[..4],
        ["spf-record", "upstream-spf-rr-type", "upstream-note", "dns-lookups"]
    );
    assert_eq!(status_of(&analysis, "upstream-note"), Some(CheckStatus::Info));
    assert_eq!(
        status_of(&analysis, "deprecated-record-type"),
        Some(CheckStatus::Warning)
    );
}

#[test]
fn record_is_picked_case_insensitively_among_other_txt() {
    let upstream = UpstreamResponse::empty().with_entries(["V=SPF1 mx -all"]);
    let analysis = analyze_response("example.com", Ok(upstream));

    assert_eq!(analysis.record.as_deref(), Some("V=SPF1 mx -all"));
    let parsed = analysis.parsed.as_ref().expect("parsed");
    assert_eq!(parsed.lookup_count, 1);
    assert_eq!(parsed.record_size, "V=SPF1 mx -all".len());
}

#[test]
fn parse_issues_make_the_record_invalid() {
    let analysis = analyze_record("example.com", "v=spf1 ip4:999.0.0.1 -all");

    assert_eq!(analysis.status, AnalysisStatus::Invalid);
    assert_eq!(analysis.score, 0);
    assert_eq!(status_of(&analysis, "syntax"), Some(CheckStatus::Fail));
}

#[test]
fn recommendations_track_failing_checks() {
    let analysis = analyze_record(
        "example.com",
        "v=spf1 ptr include:_spf.google.com ip4:10.0.0.0/8 +all",
    );

    assert_eq!(
        analysis.recommendations,
        [
            "Replace '+all' with '~all' or '-all'",
            "Restrict ip4/ip6 ranges to the addresses your mail servers use",
            "Replace ptr with explicit ip4/ip6 or a mechanisms",
        ]
    );
    assert_eq!(analysis.services[0].name, "Google Workspace");
}

proptest! {
    #[test]
    fn analysis_is_total_and_deterministic(raw in "v=spf1( [-~?+]?(all|a|mx|ptr|include:[a-z]{1,8}\\.com|ip4:10\\.[0-9]{1,2}\\.0\\.0/[0-9]{1,2}))*") {
        let first = analyze_record("example.com", &raw);
        let second = analyze_record("example.com", &raw);
        prop_assert_eq!(&first, &second);
        prop_assert!(first.score <= 5);
        prop_assert_eq!(first.checks[0].id.as_str(), "spf-record");
    }
}
