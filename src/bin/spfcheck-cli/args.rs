use clap::Parser;
use spfcheck_lib::AnalysisOptions;

#[derive(Parser)]
#[command(name = "spfcheck-cli")]
pub struct Cli {
    /// domaines à analyser
    pub domains: Vec<String>,

    /// lit des domaines depuis stdin (un par ligne)
    #[arg(long)]
    pub stdin: bool,

    /// analyse cet enregistrement SPF au lieu d'interroger le DNS
    #[arg(long)]
    pub record: Option<String>,

    /// write report to file (JSON/NDJSON/CSV selon --format)
    #[arg(long)]
    pub out: Option<String>,

    /// format: human|json|ndjson|csv
    #[arg(long, default_value = "human")]
    pub format: String,

    /// développe l'arbre include/redirect
    #[arg(long)]
    pub tree: bool,

    /// profondeur maximale (arbre et comptage des includes imbriqués)
    #[arg(long = "max-depth", default_value_t = 10)]
    pub max_depth: usize,

    /// récupère aussi DMARC et MX en parallèle
    #[arg(long)]
    pub posture: bool,

    /// ne compte pas les lookups des includes imbriqués
    #[arg(long = "no-nested")]
    pub no_nested: bool,

    /// développe l'arbre sans threads
    #[arg(long)]
    pub sequential: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn clap_command() -> clap::Command {
        <Self as clap::CommandFactory>::command()
    }

    pub fn options(&self) -> AnalysisOptions {
        AnalysisOptions::new()
            .with_max_depth(self.max_depth)
            .count_nested_lookups(!self.no_nested)
            .parallel_expansion(!self.sequential)
    }
}
