use thiserror::Error;

/// Errors raised while normalising a domain or talking to the resolver.
#[derive(Debug, Error)]
pub enum SpfError {
    #[error("domain is empty")]
    EmptyDomain,
    #[error("domain IDNA conversion failed")]
    IdnaConversion {
        #[source]
        source: idna::Errors,
    },
    #[error("resolver initialization failed: {source}")]
    ResolverInit {
        #[source]
        source: std::io::Error,
    },
    #[cfg(feature = "with-dns")]
    #[error("{record_type} lookup failed for {name}: {source}")]
    Lookup {
        record_type: &'static str,
        name: String,
        #[source]
        source: trust_dns_resolver::error::ResolveError,
    },
    #[error("TXT record {name} contains invalid UTF-8 data: {source}")]
    TxtDataUtf8 {
        name: String,
        #[source]
        source: std::str::Utf8Error,
    },
    #[error("resolver failed for {domain}: {message}")]
    Upstream { domain: String, message: String },
}

impl SpfError {
    pub(crate) fn idna(source: idna::Errors) -> Self {
        Self::IdnaConversion { source }
    }

    #[cfg(feature = "with-dns")]
    pub(crate) fn resolver_init(source: std::io::Error) -> Self {
        Self::ResolverInit { source }
    }

    #[cfg(feature = "with-dns")]
    pub(crate) fn lookup(
        record_type: &'static str,
        name: impl Into<String>,
        source: trust_dns_resolver::error::ResolveError,
    ) -> Self {
        Self::Lookup {
            record_type,
            name: name.into(),
            source,
        }
    }

    #[cfg(feature = "with-dns")]
    pub(crate) fn txt_data_utf8(name: impl Into<String>, source: std::str::Utf8Error) -> Self {
        Self::TxtDataUtf8 {
            name: name.into(),
            source,
        }
    }

    /// Failure reported by a resolver that is not backed by DNS.
    pub fn upstream(domain: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            domain: domain.into(),
            message: message.into(),
        }
    }
}
