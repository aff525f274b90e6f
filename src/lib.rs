#![forbid(unsafe_code)]
//! spfcheck_lib — SPF policy analysis: parsing, RFC 7208 lookup accounting,
//! best-practice rules and include tree expansion.

pub mod posture;
pub mod spf;
pub mod upstream;

pub use posture::{DomainPosture, FetchOutcome, check_posture};
pub use spf::{
    AnalysisOptions, AnalysisStatus, Check, CheckCategory, CheckStatus, ComplexityAnalysis,
    ComplexityRating, DetectedService, IncludeTree, IncludeTreeNode, LookupBudget, Mechanism,
    MechanismKind, NodeState, ParsedRecord, Qualifier, SpfAnalysis, SpfError, analyze_record,
    analyze_response, analyze_with_source,
};
pub use upstream::{
    Diagnostic, DiagnosticSeverity, DnsLookup, DnsSpfSource, MechanismPart, MxRecord, SpfSource,
    UpstreamResponse,
};

#[cfg(feature = "with-dns")]
pub use posture::check_domain_posture;
#[cfg(feature = "with-dns")]
pub use spf::{analyze_domain, analyze_domain_with_options};
