//! Default canonical taxonomy. Order here is the canonical processing order.

use crate::model::Category;

pub fn default_categories() -> Vec<Category> {
    vec![
        Category::new("governance", "Governance & Leadership").with_keywords(&[
            "governance",
            "leadership",
            "top management",
            "security policy",
            "information security policy",
            "policy",
            "roles and responsibilities",
            "responsibilities",
            "management commitment",
            "management body",
        ]),
        Category::new("risk_management", "Risk Management").with_keywords(&[
            "risk assessment",
            "risk treatment",
            "risk management",
            "risk",
            "threat",
        ]),
        Category::new("asset_management", "Asset Management").with_keywords(&[
            "asset",
            "inventory",
            "hardware",
            "software inventory",
            "unauthorized software",
            "acceptable use",
        ]),
        Category::new("access_control", "Identity & Access Management").with_keywords(&[
            "access control",
            "access rights",
            "access",
            "privilege",
            "privileged",
            "authentication",
            "multi-factor",
            "mfa",
            "password",
            "account",
            "identity",
        ]),
        Category::new("cryptography", "Cryptography & Key Management").with_keywords(&[
            "cryptograph",
            "encrypt",
            "key management",
            "cryptographic key",
            "tls",
            "certificate",
        ]),
        Category::new("physical_security", "Physical & Environmental Security").with_keywords(&[
            "physical",
            "premises",
            "facility",
            "facilities",
            "perimeter",
            "environmental",
            "clear desk",
        ]),
        Category::new("secure_configuration", "Secure Configuration").with_keywords(&[
            "configuration",
            "baseline",
            "hardening",
            "default settings",
        ]),
        Category::new("vulnerability_management", "Vulnerability & Patch Management")
            .with_keywords(&[
                "vulnerability",
                "vulnerabilities",
                "patch",
                "penetration test",
                "technical vulnerabilities",
            ]),
        Category::new("malware_protection", "Malware Protection").with_keywords(&[
            "malware",
            "anti-malware",
            "antivirus",
            "anti-virus",
            "malicious code",
        ]),
        Category::new("network_security", "Network Security").with_keywords(&[
            "network",
            "firewall",
            "segmentation",
            "segregation of networks",
            "wireless",
            "remote access",
        ]),
        Category::new("email_web_security", "Email & Web Security").with_keywords(&[
            "email",
            "e-mail",
            "web browser",
            "browser",
            "web filtering",
            "dns filtering",
        ]),
        Category::new("logging_monitoring", "Logging & Monitoring").with_keywords(&[
            "logging",
            "audit log",
            "event log",
            "log",
            "monitoring",
            "monitor",
            "clock synchronization",
        ]),
        Category::new("incident_response", "Incident Management").with_keywords(&[
            "incident",
            "breach",
            "notification",
            "notify",
            "csirt",
            "early warning",
        ]),
        Category::new("business_continuity", "Business Continuity & Resilience").with_keywords(&[
            "continuity",
            "backup",
            "recovery",
            "disaster",
            "redundancy",
            "resilience",
        ]),
        Category::new("supplier_management", "Supplier & Third-Party Management").with_keywords(&[
            "supplier",
            "third party",
            "third-party",
            "vendor",
            "service provider",
            "supply chain",
            "outsourc",
        ]),
        Category::new("hr_security", "Human Resources Security").with_keywords(&[
            "personnel",
            "employee",
            "employment",
            "screening",
            "termination",
            "disciplinary",
            "human resource",
        ]),
        Category::new("awareness_training", "Security Awareness & Training").with_keywords(&[
            "awareness",
            "training",
            "education",
            "skills",
            "phishing",
        ]),
        Category::new("secure_development", "Secure Development").with_keywords(&[
            "development",
            "secure coding",
            "source code",
            "application security",
            "software development",
            "testing",
            "change management",
        ]),
        Category::new("data_protection", "Data Protection & Privacy").with_keywords(&[
            "personal data",
            "privacy",
            "data protection",
            "retention",
            "classification",
            "data leakage",
            "pii",
            "data subject",
        ]),
        Category::new("compliance_audit", "Compliance & Audit").with_keywords(&[
            "compliance",
            "internal audit",
            "audit",
            "legal",
            "regulatory",
            "independent review",
            "contractual",
        ]),
    ]
}
