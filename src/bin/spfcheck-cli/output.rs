#[cfg(any(feature = "with-serde", feature = "with-csv"))]
use anyhow::Context;
use anyhow::{Result, bail};

use crate::args::Cli;
use spfcheck_lib::{
    AnalysisStatus, FetchOutcome, IncludeTree, IncludeTreeNode, MxRecord, NodeState,
    SpfAnalysis, SpfError, SpfSource, UpstreamResponse, analyze_record,
};

#[cfg(feature = "with-csv")]
use spfcheck_lib::CheckStatus;
#[cfg(feature = "with-dns")]
use spfcheck_lib::{DnsLookup, analyze_with_source, check_posture};

#[cfg_attr(feature = "with-serde", derive(serde::Serialize))]
pub struct ReportRow {
    #[cfg_attr(feature = "with-serde", serde(flatten))]
    pub analysis: SpfAnalysis,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub tree: Option<IncludeTreeNode>,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub dmarc: Option<FetchOutcome<Vec<String>>>,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub mx: Option<FetchOutcome<Vec<MxRecord>>>,
}

/// Source used for literal records: nested domains are never resolved.
struct Offline;

impl SpfSource for Offline {
    fn resolve_spf(&self, domain: &str) -> Result<UpstreamResponse, SpfError> {
        Err(SpfError::upstream(domain, "hors ligne (--record)"))
    }
}

#[cfg(feature = "with-dns")]
pub fn make_row<S, L>(source: &S, dns: &L, domain: &str, cli: &Cli) -> ReportRow
where
    S: SpfSource + Sync,
    L: DnsLookup + Sync,
{
    let (analysis, dmarc, mx) = if cli.posture {
        let posture = check_posture(source, dns, domain);
        (posture.spf, Some(posture.dmarc), Some(posture.mx))
    } else {
        (analyze_with_source(source, domain), None, None)
    };
    let tree = cli.tree.then(|| expand_tree(source, &analysis, cli));
    ReportRow {
        analysis,
        tree,
        dmarc,
        mx,
    }
}

pub fn make_literal_row(domain: &str, record: &str, cli: &Cli) -> ReportRow {
    let analysis = analyze_record(domain, record);
    let tree = cli.tree.then(|| expand_tree(&Offline, &analysis, cli));
    ReportRow {
        analysis,
        tree,
        dmarc: None,
        mx: None,
    }
}

fn expand_tree<S>(source: &S, analysis: &SpfAnalysis, cli: &Cli) -> IncludeTreeNode
where
    S: SpfSource + Sync,
{
    let tree = IncludeTree::new(source, cli.options());
    let root = tree.root(analysis);
    tree.expand_all(&root, cli.max_depth)
}

pub fn write_reports(rows: &[ReportRow], cli: &Cli) -> Result<()> {
    match cli.format.as_str() {
        "human" => write_human(rows),
        "json" => write_json(rows, cli),
        "ndjson" => write_ndjson(rows, cli),
        "csv" => write_csv(rows, cli),
        other => bail!("unknown --format '{other}', use: human|json|ndjson|csv"),
    }
}

pub fn any_invalid(rows: &[ReportRow]) -> bool {
    rows.iter().any(|row| !row.analysis.is_valid())
}

fn write_human(rows: &[ReportRow]) -> Result<()> {
    for row in rows {
        for line in human_lines(row) {
            println!("{line}");
        }
    }
    Ok(())
}

fn human_lines(row: &ReportRow) -> Vec<String> {
    let analysis = &row.analysis;
    let tag = match analysis.status {
        AnalysisStatus::Valid => "[OK]     ",
        AnalysisStatus::Invalid => "[INVALID]",
        AnalysisStatus::Missing => "[MISSING]",
        AnalysisStatus::Error => "[ERROR]  ",
    };
    let mut lines = vec![format!("{tag} {} :: score {}/5", analysis.domain, analysis.score)];

    if let Some(record) = &analysis.record {
        lines.push(format!("        record: {record}"));
    }
    if let Some(parsed) = &analysis.parsed {
        let complexity = analysis
            .complexity
            .as_ref()
            .map(|c| c.rating.as_str())
            .unwrap_or("-");
        lines.push(format!(
            "        lookups: {}/{} (void {}), complexity: {complexity}",
            parsed.total_lookups(),
            parsed.max_lookups,
            parsed.void_lookup_count
        ));
    }
    for check in &analysis.checks {
        let mut line = format!("        {:<7} {:<24} {}", check.status.as_str(), check.id, check.message);
        if let Some(details) = &check.details {
            line.push_str(&format!(" [{details}]"));
        }
        lines.push(line);
    }
    if !analysis.services.is_empty() {
        let names: Vec<&str> = analysis.services.iter().map(|s| s.name.as_str()).collect();
        lines.push(format!("        services: {}", names.join(", ")));
    }
    for recommendation in &analysis.recommendations {
        lines.push(format!("        -> {recommendation}"));
    }
    if let Some(dmarc) = &row.dmarc {
        lines.push(format!("        dmarc: {}", outcome_summary(dmarc, |r| r.join(" | "))));
    }
    if let Some(mx) = &row.mx {
        lines.push(format!(
            "        mx: {}",
            outcome_summary(mx, |records| {
                records
                    .iter()
                    .map(|mx| format!("{} {}", mx.preference, mx.exchange))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
        ));
    }
    if let Some(tree) = &row.tree {
        lines.push("        tree:".to_string());
        tree_lines(tree, &mut lines);
    }
    lines
}

fn outcome_summary<T>(outcome: &FetchOutcome<T>, render: impl Fn(&T) -> String) -> String {
    match outcome {
        FetchOutcome::Fetched(value) => {
            let rendered = render(value);
            if rendered.is_empty() {
                "none".to_string()
            } else {
                rendered
            }
        }
        FetchOutcome::Failed { message } => format!("failed ({message})"),
    }
}

fn tree_lines(node: &IncludeTreeNode, lines: &mut Vec<String>) {
    let label = match &node.mechanism {
        Some(mechanism) => mechanism.to_string(),
        None => node.domain.clone(),
    };
    let state = match &node.state {
        NodeState::Expanded | NodeState::Unexpanded => String::new(),
        NodeState::Empty => " (no mechanisms found)".to_string(),
        NodeState::Failed { message } => format!(" (failed to load: {message})"),
        NodeState::Cycle => " (loop)".to_string(),
        NodeState::DepthLimit => " (depth limit)".to_string(),
    };
    lines.push(format!(
        "          {}{label} [{} lookups]{state}",
        "  ".repeat(node.depth),
        node.lookups
    ));
    for child in &node.children {
        tree_lines(child, lines);
    }
}

#[cfg(feature = "with-serde")]
fn write_json(rows: &[ReportRow], cli: &Cli) -> Result<()> {
    let s = serde_json::to_string_pretty(rows)?;
    if let Some(path) = &cli.out {
        write_all_atomically(path, s.as_bytes())?;
    } else {
        println!("{s}");
    }
    Ok(())
}

#[cfg(not(feature = "with-serde"))]
fn write_json(_: &[ReportRow], _: &Cli) -> Result<()> {
    bail!("format=json nécessite la feature 'with-serde'")
}

#[cfg(feature = "with-serde")]
fn write_ndjson(rows: &[ReportRow], cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.out {
        let mut buf = Vec::new();
        for row in rows {
            let line = serde_json::to_string(row)?;
            buf.extend_from_slice(line.as_bytes());
            buf.push(b'\n');
        }
        write_all_atomically(path, &buf)?;
    } else {
        for row in rows {
            println!("{}", serde_json::to_string(row)?);
        }
    }
    Ok(())
}

#[cfg(not(feature = "with-serde"))]
fn write_ndjson(_: &[ReportRow], _: &Cli) -> Result<()> {
    bail!("format=ndjson nécessite la feature 'with-serde'")
}

#[cfg(feature = "with-csv")]
fn write_csv(rows: &[ReportRow], cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.out {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(CSV_HEADER)?;
        for row in rows {
            wtr.write_record(&csv_record(row))?;
        }
        let data = wtr.into_inner()?;
        write_all_atomically(path, &data)?;
    } else {
        let mut wtr = csv::Writer::from_writer(std::io::stdout());
        wtr.write_record(CSV_HEADER)?;
        for row in rows {
            wtr.write_record(&csv_record(row))?;
        }
        wtr.flush()?;
    }
    Ok(())
}

#[cfg(not(feature = "with-csv"))]
fn write_csv(_: &[ReportRow], _: &Cli) -> Result<()> {
    bail!("format=csv nécessite la feature 'with-csv'")
}

#[cfg(feature = "with-csv")]
const CSV_HEADER: [&str; 10] = [
    "domain",
    "status",
    "score",
    "lookups",
    "void_lookups",
    "complexity",
    "fail",
    "warning",
    "services",
    "recommendations",
];

#[cfg(feature = "with-csv")]
fn csv_record(row: &ReportRow) -> Vec<String> {
    let analysis = &row.analysis;
    let (lookups, void) = analysis
        .parsed
        .as_ref()
        .map(|p| (p.total_lookups().to_string(), p.void_lookup_count.to_string()))
        .unwrap_or_default();
    let complexity = analysis
        .complexity
        .as_ref()
        .map(|c| c.rating.as_str())
        .unwrap_or("");
    let ids_with = |status: CheckStatus| {
        analysis
            .checks_with_status(status)
            .map(|check| check.id.as_str())
            .collect::<Vec<_>>()
            .join("|")
    };

    vec![
        analysis.domain.clone(),
        analysis.status.as_str().to_string(),
        analysis.score.to_string(),
        lookups,
        void,
        complexity.to_string(),
        ids_with(CheckStatus::Fail),
        ids_with(CheckStatus::Warning),
        analysis
            .services
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join("|"),
        analysis.recommendations.join("|"),
    ]
}

#[cfg(any(feature = "with-serde", feature = "with-csv"))]
fn write_all_atomically(path: &str, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let tmp = format!("{path}.tmp");
    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path).with_context(|| format!("rename {tmp} -> {path}"))?;
    Ok(())
}
