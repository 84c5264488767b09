mod country;
mod domain;
mod ip_range;
mod manager;
mod parser;

pub use country::{CidrCountryLookup, CountryLookup, NoCountryLookup};
pub use domain::DomainCriterion;
pub use ip_range::IpRange;
pub use manager::RuleManager;
pub use parser::parse_rules;

use rk_common::Session;

/// One routing rule bound to the adapter factory it selects.
#[derive(Debug, Clone)]
pub enum Rule<F> {
    All {
        adapter: F,
    },
    Country {
        code: String,
        matches: bool,
        adapter: F,
    },
    DomainList {
        criteria: Vec<DomainCriterion>,
        adapter: F,
    },
    IpRangeList {
        ranges: Vec<IpRange>,
        adapter: F,
    },
    DnsFail {
        adapter: F,
    },
}

impl<F> Rule<F> {
    pub fn adapter(&self) -> &F {
        match self {
            Rule::All { adapter }
            | Rule::Country { adapter, .. }
            | Rule::DomainList { adapter, .. }
            | Rule::IpRangeList { adapter, .. }
            | Rule::DnsFail { adapter } => adapter,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Rule::All { .. } => "all",
            Rule::Country { .. } => "country",
            Rule::DomainList { .. } => "domainlist",
            Rule::IpRangeList { .. } => "iplist",
            Rule::DnsFail { .. } => "dnsfail",
        }
    }

    /// Whether this rule can only be decided once the host is resolved.
    pub fn needs_ip(&self) -> bool {
        matches!(
            self,
            Rule::Country { .. } | Rule::IpRangeList { .. } | Rule::DnsFail { .. }
        )
    }

    pub fn matches(&self, session: &Session, country: &dyn CountryLookup) -> bool {
        match self {
            Rule::All { .. } => true,
            Rule::Country { code, matches, .. } => {
                let Some(ip) = session.ip() else {
                    return false;
                };
                let same = country
                    .country(ip)
                    .is_some_and(|c| c.eq_ignore_ascii_case(code));
                same == *matches
            }
            Rule::DomainList { criteria, .. } => {
                let host = session.host().to_ascii_lowercase();
                criteria.iter().any(|c| c.matches(&host))
            }
            Rule::IpRangeList { ranges, .. } => match session.ip() {
                Some(ip) => ranges.iter().any(|r| r.contains(ip)),
                None => false,
            },
            Rule::DnsFail { .. } => session.dns_failed(),
        }
    }
}
