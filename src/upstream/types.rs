use crate::spf::{parse_record, tokenize};

/// One `(mechanism, qualifier, value)` triple as tokenized by the resolver.
/// An empty `qualifier` means none was written.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MechanismPart {
    pub mechanism: String,
    pub qualifier: String,
    pub value: String,
}

impl MechanismPart {
    pub fn new(
        mechanism: impl Into<String>,
        qualifier: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            mechanism: mechanism.into(),
            qualifier: qualifier.into(),
            value: value.into(),
        }
    }

    /// Source text of the term, as far as it can be reconstructed.
    pub fn to_term(&self) -> String {
        let head = format!("{}{}", self.qualifier.trim(), self.mechanism.trim());
        if self.value.is_empty() {
            head
        } else if self.value.starts_with('/') {
            format!("{head}{}", self.value)
        } else if self.mechanism.eq_ignore_ascii_case("redirect") {
            format!("{head}={}", self.value)
        } else {
            format!("{head}:{}", self.value)
        }
    }
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Info,
}

/// Well-known diagnostic codes emitted by [`DnsSpfSource`](super::DnsSpfSource).
pub mod codes {
    pub const NXDOMAIN: &str = "nxdomain";
    pub const DNS_ERROR: &str = "dns-error";
    pub const LEGACY_RR_TYPE: &str = "spf-rr-type";
    pub const INCLUDE_LOOP: &str = "include-loop";
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    pub severity: DiagnosticSeverity,
    /// `kind:host` of the lookup that produced the diagnostic, e.g.
    /// `a:mail.example.com`. Bare `a`/`mx` name the domain they were
    /// evaluated for.
    #[cfg_attr(
        feature = "with-serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub target: Option<String>,
}

impl Diagnostic {
    pub fn new(code: impl Into<String>, message: impl Into<String>, severity: DiagnosticSeverity) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            severity,
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into().to_ascii_lowercase());
        self
    }

    /// The `kind:host` this diagnostic is about: the explicit target, or a
    /// leading `kind:host` token of the message.
    pub fn lookup_target(&self) -> Option<String> {
        if let Some(target) = &self.target {
            return Some(target.clone());
        }
        let token = self.message.split_whitespace().next()?;
        let (kind, host) = token.split_once(':')?;
        let host = host
            .trim_end_matches(|c: char| matches!(c, ',' | ';' | ':' | '.'))
            .to_ascii_lowercase();
        (!kind.is_empty() && !host.is_empty())
            .then(|| format!("{}:{host}", kind.to_ascii_lowercase()))
    }
}

/// What the resolver collaborator reports for one domain.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpstreamResponse {
    pub raw_record_entries: Vec<String>,
    pub mechanism_parts: Vec<MechanismPart>,
    pub lookup_count: u32,
    pub secondary_lookup_count: u32,
    pub void_lookup_count: u32,
    pub record_size_bytes: usize,
    pub all_qualifier: Option<String>,
    pub redirected_to: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl UpstreamResponse {
    /// Response for a domain publishing no SPF record.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Response for a domain publishing exactly `record`, with no nested data.
    pub fn from_record(record: &str) -> Self {
        let record = record.trim();
        let parsed = parse_record(record);
        Self {
            raw_record_entries: vec![record.to_string()],
            mechanism_parts: tokenize(record),
            lookup_count: parsed.lookup_count,
            secondary_lookup_count: 0,
            void_lookup_count: 0,
            record_size_bytes: record.len(),
            all_qualifier: parsed
                .all_qualifier
                .map(|qualifier| qualifier.as_all_term().to_string()),
            redirected_to: parsed.redirected_to,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_entries<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.raw_record_entries = entries.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_nested_counts(mut self, secondary: u32, void: u32) -> Self {
        self.secondary_lookup_count = secondary;
        self.void_lookup_count = void;
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostics.push(diagnostic);
        self
    }
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MxRecord {
    pub preference: u16,
    pub exchange: String,
}

impl MxRecord {
    pub fn new(preference: u16, exchange: impl Into<String>) -> Self {
        Self {
            preference,
            exchange: exchange.into(),
        }
    }
}
