use std::path::Path;

use config::RuleDescriptor;
use error::{Error, Result};
use tracing::info;

use crate::{DomainCriterion, IpRange, Rule};

/// Build rules from their descriptors. `adapter_for` looks an adapter id up
/// in the registry (case-sensitive).
pub fn parse_rules<F, L>(descriptors: &[RuleDescriptor], adapter_for: L) -> Result<Vec<Rule<F>>>
where
    L: Fn(&str) -> Option<F>,
{
    let rules = descriptors
        .iter()
        .enumerate()
        .map(|(i, d)| parse_rule(i, d, &adapter_for))
        .collect::<Result<Vec<_>>>()?;
    info!("parsed {} rules", rules.len());
    Ok(rules)
}

fn parse_rule<F, L>(index: usize, descriptor: &RuleDescriptor, adapter_for: &L) -> Result<Rule<F>>
where
    L: Fn(&str) -> Option<F>,
{
    let field = |name: &str| format!("rules[{}].{}", index, name);
    let kind = descriptor
        .kind
        .as_deref()
        .ok_or_else(|| Error::config(field("type"), "rule type is required"))?
        .to_lowercase();

    let adapter = {
        let id = descriptor
            .adapter
            .as_ref()
            .ok_or_else(|| Error::config(field("adapter"), "an adapter id is required"))?
            .to_string();
        adapter_for(&id)
            .ok_or_else(|| Error::config(field("adapter"), format!("unknown adapter id {}", id)))?
    };

    match kind.as_str() {
        "all" => Ok(Rule::All { adapter }),
        "dnsfail" => Ok(Rule::DnsFail { adapter }),
        "country" => {
            let code = descriptor
                .country
                .clone()
                .ok_or_else(|| Error::config(field("country"), "country code is required"))?;
            let matches = descriptor
                .matches
                .ok_or_else(|| Error::config(field("match"), "match is required for country rule"))?;
            Ok(Rule::Country {
                code,
                matches,
                adapter,
            })
        }
        "list" | "domainlist" => {
            let criteria = match (&descriptor.file, &descriptor.criteria) {
                (Some(file), _) => read_lines(file, &field("file"))?
                    .into_iter()
                    .map(|(n, line)| {
                        DomainCriterion::regex(&line).map_err(|e| {
                            Error::config(field("file"), format!("line {}: {}", n, e))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
                (None, Some(raw)) => raw
                    .iter()
                    .enumerate()
                    .map(|(j, c)| {
                        let name = field(&format!("criteria[{}]", j));
                        match DomainCriterion::parse(c) {
                            Some(Ok(criterion)) => Ok(criterion),
                            Some(Err(e)) => Err(Error::config(name, e.to_string())),
                            None => Err(Error::config(name, format!("invalid criterion {}", c))),
                        }
                    })
                    .collect::<Result<Vec<_>>>()?,
                (None, None) => {
                    return Err(Error::config(field("criteria"), "file or criteria is required"));
                }
            };
            Ok(Rule::DomainList { criteria, adapter })
        }
        "iplist" => {
            let ranges = match (&descriptor.file, &descriptor.criteria) {
                (Some(file), _) => read_lines(file, &field("file"))?
                    .into_iter()
                    .map(|(n, line)| {
                        IpRange::parse(&line).map_err(|e| {
                            Error::config(field("file"), format!("line {}: {}", n, e))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
                (None, Some(raw)) => raw
                    .iter()
                    .enumerate()
                    .map(|(j, c)| {
                        IpRange::parse(c)
                            .map_err(|e| Error::config(field(&format!("criteria[{}]", j)), e.to_string()))
                    })
                    .collect::<Result<Vec<_>>>()?,
                (None, None) => {
                    return Err(Error::config(field("criteria"), "file or criteria is required"));
                }
            };
            Ok(Rule::IpRangeList { ranges, adapter })
        }
        _ => Err(Error::config(field("type"), format!("unknown rule type {}", kind))),
    }
}

/// Non-empty lines with their 1-based line numbers.
fn read_lines(path: &Path, field: &str) -> Result<Vec<(usize, String)>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::config(field, format!("{}: {}", path.display(), e)))?;
    Ok(content
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim().to_string()))
        .filter(|(_, l)| !l.is_empty())
        .collect())
}
