use phf::phf_ordered_map;

use super::types::{DetectedService, MechanismKind, ParsedRecord, ServiceCategory, ServiceStatus};

#[derive(Debug)]
struct Signature {
    name: &'static str,
    category: ServiceCategory,
    status: ServiceStatus,
    note: Option<&'static str>,
}

const fn recognized(name: &'static str, category: ServiceCategory) -> Signature {
    Signature {
        name,
        category,
        status: ServiceStatus::Recognized,
        note: None,
    }
}

const fn redundant(name: &'static str, category: ServiceCategory, note: &'static str) -> Signature {
    Signature {
        name,
        category,
        status: ServiceStatus::Redundant,
        note: Some(note),
    }
}

// Substring patterns, matched in table order against lowercase include targets.
static KNOWN_SERVICES: phf::OrderedMap<&'static str, Signature> = phf_ordered_map! {
    "_spf.google.com" => recognized("Google Workspace", ServiceCategory::EmailProvider),
    "spf.protection.outlook.com" => recognized("Microsoft 365", ServiceCategory::EmailProvider),
    "zoho." => recognized("Zoho Mail", ServiceCategory::EmailProvider),
    "messagingengine.com" => recognized("Fastmail", ServiceCategory::EmailProvider),
    "emailsrvr.com" => recognized("Rackspace Email", ServiceCategory::Hosting),
    "secureserver.net" => recognized("GoDaddy", ServiceCategory::Hosting),
    "amazonses.com" => recognized("Amazon SES", ServiceCategory::Transactional),
    "sendgrid.net" => recognized("SendGrid", ServiceCategory::Transactional),
    "mailgun.org" => recognized("Mailgun", ServiceCategory::Transactional),
    "mtasv.net" => recognized("Postmark", ServiceCategory::Transactional),
    "sparkpostmail.com" => recognized("SparkPost", ServiceCategory::Transactional),
    "mandrillapp.com" => recognized("Mandrill", ServiceCategory::Transactional),
    "servers.mcsv.net" => redundant(
        "Mailchimp",
        ServiceCategory::Marketing,
        "Mailchimp sends from its own return-path domain; this include is not needed",
    ),
    "mailjet.com" => recognized("Mailjet", ServiceCategory::Marketing),
    "sendinblue.com" => recognized("Brevo", ServiceCategory::Marketing),
    "brevo.com" => recognized("Brevo", ServiceCategory::Marketing),
    "mktomail.com" => recognized("Marketo", ServiceCategory::Marketing),
    "hubspotemail.net" => recognized("HubSpot", ServiceCategory::Marketing),
    "_spf.salesforce.com" => recognized("Salesforce", ServiceCategory::Crm),
    "zendesk.com" => recognized("Zendesk", ServiceCategory::Support),
    "freshdesk.com" => recognized("Freshdesk", ServiceCategory::Support),
    "intercom.io" => recognized("Intercom", ServiceCategory::Support),
    "mimecast.com" => recognized("Mimecast", ServiceCategory::Security),
    "pphosted.com" => recognized("Proofpoint", ServiceCategory::Security),
};

/// Attributes `include:` targets to known providers. First matching pattern
/// wins per include, and each provider is reported once.
pub fn detect_services(parsed: &ParsedRecord) -> Vec<DetectedService> {
    let mut detected: Vec<DetectedService> = Vec::new();
    for mechanism in parsed.of_kind(MechanismKind::Include) {
        let target = mechanism.value.to_ascii_lowercase();
        let Some(signature) = match_signature(&target) else {
            continue;
        };
        if detected.iter().any(|service| service.name == signature.name) {
            continue;
        }
        detected.push(DetectedService {
            name: signature.name.to_string(),
            include: mechanism.value.clone(),
            category: signature.category,
            status: signature.status,
            note: signature.note.map(str::to_string),
        });
    }
    detected
}

fn match_signature(target: &str) -> Option<&'static Signature> {
    KNOWN_SERVICES
        .entries()
        .find(|(pattern, _)| target.contains(*pattern))
        .map(|(_, signature)| signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spf::parser::parse_record;

    #[test]
    fn detects_known_providers_case_insensitively() {
        let parsed = parse_record(
            "v=spf1 include:_SPF.Google.com include:sendgrid.net include:unknown.example -all",
        );
        let services = detect_services(&parsed);
        let names: Vec<&str> = services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Google Workspace", "SendGrid"]);
        assert_eq!(services[0].include, "_SPF.Google.com");
        assert_eq!(services[0].category, ServiceCategory::EmailProvider);
    }

    #[test]
    fn provider_attributed_once() {
        let parsed = parse_record("v=spf1 include:spf.sendinblue.com include:spf.brevo.com ~all");
        let services = detect_services(&parsed);
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].include, "spf.sendinblue.com");
    }

    #[test]
    fn redundant_include_carries_note() {
        let parsed = parse_record("v=spf1 include:servers.mcsv.net ~all");
        let services = detect_services(&parsed);
        assert_eq!(services[0].status, ServiceStatus::Redundant);
        assert!(services[0].note.is_some());
    }

    #[test]
    fn only_include_mechanisms_are_considered() {
        let parsed = parse_record("v=spf1 a:mail.sendgrid.net redirect=_spf.google.com");
        assert!(detect_services(&parsed).is_empty());
    }
}
