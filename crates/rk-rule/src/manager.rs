use std::sync::Arc;

use error::{Error, Result};
use rk_common::Session;
use tracing::debug;

use crate::{CountryLookup, NoCountryLookup, Rule};

/// Ordered rule set. The first matching rule decides, and with
/// `append_direct` a session nothing matched goes to `direct`.
pub struct RuleManager<F> {
    rules: Vec<Rule<F>>,
    direct: F,
    append_direct: bool,
    country: Arc<dyn CountryLookup + Send + Sync>,
}

impl<F: Clone> RuleManager<F> {
    pub fn new(rules: Vec<Rule<F>>, direct: F, append_direct: bool) -> Self {
        Self {
            rules,
            direct,
            append_direct,
            country: Arc::new(NoCountryLookup),
        }
    }

    pub fn with_country_lookup(mut self, country: Arc<dyn CountryLookup + Send + Sync>) -> Self {
        self.country = country;
        self
    }

    pub fn rules(&self) -> &[Rule<F>] {
        &self.rules
    }

    /// Whether resolving the host can change the outcome.
    pub fn needs_ip(&self) -> bool {
        self.rules.iter().any(|r| r.needs_ip())
    }

    pub fn resolve(&self, session: &Session) -> Result<F> {
        for (i, rule) in self.rules.iter().enumerate() {
            if rule.matches(session, self.country.as_ref()) {
                debug!("{} matched rule #{} ({})", session, i, rule.kind());
                return Ok(rule.adapter().clone());
            }
        }
        if self.append_direct {
            debug!("{} matched no rule, connect directly", session);
            return Ok(self.direct.clone());
        }
        Err(Error::NoRuleMatched(session.to_string()))
    }
}
