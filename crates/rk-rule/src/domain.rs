use error::Result;
use regex::{Regex, RegexBuilder};

/// How one domain pattern is compared against a lowercased host.
#[derive(Debug, Clone)]
pub enum DomainCriterion {
    Prefix(String),
    Suffix(String),
    Keyword(String),
    Regex(Regex),
}

impl DomainCriterion {
    pub fn prefix(p: &str) -> Self {
        DomainCriterion::Prefix(p.to_ascii_lowercase())
    }

    pub fn suffix(s: &str) -> Self {
        DomainCriterion::Suffix(s.to_ascii_lowercase())
    }

    pub fn keyword(k: &str) -> Self {
        DomainCriterion::Keyword(k.to_ascii_lowercase())
    }

    /// Compiled case-insensitive and anchored at both ends.
    pub fn regex(pattern: &str) -> Result<Self> {
        let re = RegexBuilder::new(&format!("^(?:{})$", pattern))
            .case_insensitive(true)
            .build()?;
        Ok(DomainCriterion::Regex(re))
    }

    /// Parse an inline criterion such as `s:.google.com`.
    pub fn parse(raw: &str) -> Option<Result<Self>> {
        let (kind, value) = raw.split_once(':')?;
        if value.is_empty() {
            return None;
        }
        match kind {
            "s" => Some(Ok(Self::suffix(value))),
            "k" => Some(Ok(Self::keyword(value))),
            "p" => Some(Ok(Self::prefix(value))),
            "r" => Some(Self::regex(value)),
            _ => None,
        }
    }

    pub fn matches(&self, host: &str) -> bool {
        match self {
            DomainCriterion::Prefix(p) => host.starts_with(p.as_str()),
            DomainCriterion::Suffix(s) => host.ends_with(s.as_str()),
            DomainCriterion::Keyword(k) => host.contains(k.as_str()),
            DomainCriterion::Regex(re) => re.is_match(host),
        }
    }
}
