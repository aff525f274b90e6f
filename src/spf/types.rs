use std::fmt;

use super::lookups::{self, MAX_LOOKUPS};

/// Mechanism (or `redirect` modifier) names understood by the parser.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MechanismKind {
    All,
    Include,
    A,
    Mx,
    Ip4,
    Ip6,
    Exists,
    Ptr,
    Redirect,
}

impl MechanismKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "include" => Some(Self::Include),
            "a" => Some(Self::A),
            "mx" => Some(Self::Mx),
            "ip4" => Some(Self::Ip4),
            "ip6" => Some(Self::Ip6),
            "exists" => Some(Self::Exists),
            "ptr" => Some(Self::Ptr),
            "redirect" => Some(Self::Redirect),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Include => "include",
            Self::A => "a",
            Self::Mx => "mx",
            Self::Ip4 => "ip4",
            Self::Ip6 => "ip6",
            Self::Exists => "exists",
            Self::Ptr => "ptr",
            Self::Redirect => "redirect",
        }
    }

    /// `include` and `redirect` hand evaluation over to another domain.
    pub fn is_delegation(self) -> bool {
        matches!(self, Self::Include | Self::Redirect)
    }
}

impl fmt::Display for MechanismKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Qualifier {
    #[default]
    Pass,
    Fail,
    SoftFail,
    Neutral,
}

impl Qualifier {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Self::Pass),
            '-' => Some(Self::Fail),
            '~' => Some(Self::SoftFail),
            '?' => Some(Self::Neutral),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Pass => '+',
            Self::Fail => '-',
            Self::SoftFail => '~',
            Self::Neutral => '?',
        }
    }

    /// `-all` and `~all` are the only endings that actually protect the domain.
    pub fn is_enforcing(self) -> bool {
        matches!(self, Self::Fail | Self::SoftFail)
    }

    /// Renders the qualifier as the `all` term carrying it (`-all`, `~all`, ...).
    pub fn as_all_term(self) -> &'static str {
        match self {
            Self::Pass => "+all",
            Self::Fail => "-all",
            Self::SoftFail => "~all",
            Self::Neutral => "?all",
        }
    }
}

/// One clause of an SPF record, in source order.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mechanism {
    pub kind: MechanismKind,
    pub qualifier: Qualifier,
    pub value: String,
    pub lookup_cost: u8,
}

impl Mechanism {
    pub fn new(kind: MechanismKind, qualifier: Qualifier, value: impl Into<String>) -> Self {
        Self {
            kind,
            qualifier,
            value: value.into(),
            lookup_cost: lookups::lookup_cost(kind),
        }
    }

    /// Domain part of the value, without any `/cidr` suffix.
    pub fn target(&self) -> &str {
        self.value
            .split_once('/')
            .map(|(host, _)| host)
            .unwrap_or(&self.value)
            .trim()
    }

    /// Prefix length of an `ip4`/`ip6` value; bare addresses count as host routes.
    pub fn prefix_len(&self) -> Option<u8> {
        super::parser::cidr_prefix(self.kind, &self.value)
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == MechanismKind::Redirect {
            return write!(f, "redirect={}", self.value);
        }
        if self.qualifier != Qualifier::Pass {
            write!(f, "{}", self.qualifier.as_char())?;
        }
        f.write_str(self.kind.as_str())?;
        if self.value.is_empty() {
            Ok(())
        } else if self.value.starts_with('/') {
            f.write_str(&self.value)
        } else {
            write!(f, ":{}", self.value)
        }
    }
}

/// Defects the lenient parser noticed; reported by the `syntax` rule.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseIssue {
    InvalidVersion { found: String },
    UnknownTerm { term: String },
    InvalidQualifier { term: String, qualifier: String },
    MissingValue { term: String },
    InvalidCidr { term: String },
    DuplicateRedirect { term: String },
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidVersion { found } => write!(f, "invalid version tag '{found}'"),
            Self::UnknownTerm { term } => write!(f, "unknown term '{term}'"),
            Self::InvalidQualifier { term, qualifier } => {
                write!(f, "invalid qualifier '{qualifier}' in '{term}'")
            }
            Self::MissingValue { term } => write!(f, "'{term}' requires a domain value"),
            Self::InvalidCidr { term } => write!(f, "invalid address or prefix in '{term}'"),
            Self::DuplicateRedirect { term } => write!(f, "duplicate redirect modifier '{term}'"),
        }
    }
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    pub version: String,
    pub mechanisms: Vec<Mechanism>,
    pub all_qualifier: Option<Qualifier>,
    /// Sum of `lookup_cost` over top-level mechanisms.
    pub lookup_count: u32,
    pub secondary_lookup_count: u32,
    pub void_lookup_count: u32,
    pub max_lookups: u32,
    pub record_size: usize,
    pub redirected_to: Option<String>,
    pub issues: Vec<ParseIssue>,
}

impl ParsedRecord {
    pub(crate) fn new(mechanisms: Vec<Mechanism>, issues: Vec<ParseIssue>, record_size: usize) -> Self {
        let all_qualifier = mechanisms
            .iter()
            .find(|mechanism| mechanism.kind == MechanismKind::All)
            .map(|mechanism| mechanism.qualifier);
        let redirected_to = mechanisms
            .iter()
            .find(|mechanism| mechanism.kind == MechanismKind::Redirect)
            .map(|mechanism| mechanism.value.clone())
            .filter(|target| !target.is_empty());
        let lookup_count = lookups::count_lookups(&mechanisms);

        Self {
            version: "spf1".to_string(),
            mechanisms,
            all_qualifier,
            lookup_count,
            secondary_lookup_count: 0,
            void_lookup_count: 0,
            max_lookups: MAX_LOOKUPS,
            record_size,
            redirected_to,
            issues,
        }
    }

    pub(crate) fn with_nested_counts(mut self, secondary: u32, void: u32) -> Self {
        self.secondary_lookup_count = secondary;
        self.void_lookup_count = void;
        self
    }

    /// Lookups charged against the RFC 7208 budget, nested includes included.
    pub fn total_lookups(&self) -> u32 {
        self.lookup_count + self.secondary_lookup_count
    }

    pub fn count(&self, kind: MechanismKind) -> usize {
        self.mechanisms.iter().filter(|m| m.kind == kind).count()
    }

    pub fn has(&self, kind: MechanismKind) -> bool {
        self.mechanisms.iter().any(|m| m.kind == kind)
    }

    pub fn of_kind(&self, kind: MechanismKind) -> impl Iterator<Item = &Mechanism> {
        self.mechanisms.iter().filter(move |m| m.kind == kind)
    }
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckStatus {
    Pass,
    Warning,
    Fail,
    Info,
}

impl CheckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Warning => "warning",
            Self::Fail => "fail",
            Self::Info => "info",
        }
    }
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "kebab-case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckCategory {
    Record,
    Upstream,
    Lookups,
    Enforcement,
    Syntax,
    OverAuthorization,
    Deprecated,
    Performance,
    Monitoring,
}

/// An immutable finding produced by one step of an analysis pass.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub id: String,
    pub category: CheckCategory,
    pub status: CheckStatus,
    pub message: String,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub details: Option<String>,
}

impl Check {
    pub(crate) fn new(
        id: impl Into<String>,
        category: CheckCategory,
        status: CheckStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            status,
            message: message.into(),
            details: None,
        }
    }

    pub(crate) fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ComplexityRating {
    Simple,
    Moderate,
    Complex,
}

impl ComplexityRating {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
        }
    }
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexityAnalysis {
    pub rating: ComplexityRating,
    pub mechanism_count: usize,
    pub lookup_count: u32,
    pub record_size: usize,
    pub suggestions: Vec<String>,
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "kebab-case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceCategory {
    EmailProvider,
    Transactional,
    Marketing,
    Crm,
    Support,
    Security,
    Hosting,
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceStatus {
    Recognized,
    /// The provider no longer needs an SPF include to deliver mail.
    Redundant,
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedService {
    pub name: String,
    pub include: String,
    pub category: ServiceCategory,
    pub status: ServiceStatus,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub note: Option<String>,
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStatus {
    Valid,
    Invalid,
    Missing,
    Error,
}

impl AnalysisStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Missing => "missing",
            Self::Error => "error",
        }
    }
}

/// Best-effort result of analysing one domain's SPF policy.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpfAnalysis {
    pub domain: String,
    pub status: AnalysisStatus,
    pub score: u8,
    pub record: Option<String>,
    pub parsed: Option<ParsedRecord>,
    pub checks: Vec<Check>,
    pub recommendations: Vec<String>,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub complexity: Option<ComplexityAnalysis>,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub services: Vec<DetectedService>,
}

impl SpfAnalysis {
    pub fn is_valid(&self) -> bool {
        self.status == AnalysisStatus::Valid
    }

    pub fn check(&self, id: &str) -> Option<&Check> {
        self.checks.iter().find(|check| check.id == id)
    }

    pub fn checks_with_status(&self, status: CheckStatus) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(move |check| check.status == status)
    }
}
