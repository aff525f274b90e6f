mod args;
mod output;

use anyhow::{Context, Result, bail};

use std::io::{self, BufRead};

use args::Cli;
use output::{ReportRow, any_invalid, make_literal_row, write_reports};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut domains = cli.domains.clone();
    if cli.stdin {
        for line in io::stdin().lock().lines() {
            let line = line.context("read stdin")?;
            let domain = line.trim();
            if !domain.is_empty() && !domain.starts_with('#') {
                domains.push(domain.to_string());
            }
        }
    }

    let rows = if let Some(record) = &cli.record {
        if cli.posture {
            bail!("--posture nécessite une résolution DNS, incompatible avec --record");
        }
        let domain = domains.first().map(String::as_str).unwrap_or("literal");
        vec![make_literal_row(domain, record, &cli)]
    } else if domains.is_empty() {
        Cli::clap_command().print_help()?;
        println!();
        return Ok(());
    } else {
        resolve_domains(&domains, &cli)?
    };

    write_reports(&rows, &cli)?;

    // codes de sortie : 0 OK, 2 invalides, 1 fatal
    if any_invalid(&rows) {
        std::process::exit(2);
    }
    Ok(())
}

#[cfg(feature = "with-dns")]
fn resolve_domains(domains: &[String], cli: &Cli) -> Result<Vec<ReportRow>> {
    use spfcheck_lib::DnsSpfSource;
    use spfcheck_lib::upstream::normalize_domain;
    use trust_dns_resolver::Resolver;

    let resolver = Resolver::from_system_conf().context("init system resolver")?;
    let source = DnsSpfSource::new(&resolver, cli.options());

    let mut rows = Vec::with_capacity(domains.len());
    for domain in domains {
        let ascii =
            normalize_domain(domain).with_context(|| format!("invalid domain '{domain}'"))?;
        rows.push(output::make_row(&source, &resolver, &ascii, cli));
    }
    Ok(rows)
}

#[cfg(not(feature = "with-dns"))]
fn resolve_domains(_: &[String], _: &Cli) -> Result<Vec<ReportRow>> {
    bail!("la résolution DNS nécessite la feature 'with-dns' (sinon utiliser --record)")
}
