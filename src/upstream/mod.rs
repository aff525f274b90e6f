mod resolver;
mod source;
mod types;

pub use resolver::{DnsLookup, fqdn, normalize_domain};
pub use source::DnsSpfSource;
pub use types::{Diagnostic, DiagnosticSeverity, MechanismPart, MxRecord, UpstreamResponse, codes};

use crate::spf::SpfError;

/// The resolver collaborator: answers once per domain the analysis needs,
/// whether that is the root or an include being expanded.
pub trait SpfSource {
    fn resolve_spf(&self, domain: &str) -> Result<UpstreamResponse, SpfError>;
}

impl<T> SpfSource for &T
where
    T: SpfSource + ?Sized,
{
    fn resolve_spf(&self, domain: &str) -> Result<UpstreamResponse, SpfError> {
        (**self).resolve_spf(domain)
    }
}
