//! Rule Matcher: turns a raw log line into a ban request.
//!
//! Rules are scanned in configuration order and the first rule whose match
//! pattern hits the line decides the outcome. If that rule cannot extract an
//! address (e.g. `IPpos: 2` on a line with a single address), the anomaly is
//! logged and scanning continues with the following rules.

use regex::Regex;
use tracing::warn;

/// Generic IPv4-shaped token. Shape only; the engine validates octet ranges.
const IPV4_SHAPE: &str = r"\b(?:\d{1,3}\.){3}\d{1,3}\b";

/// How a rule extracts the offending address from a matching line.
#[derive(Debug, Clone)]
pub enum Extraction {
    /// N-th (zero-indexed) IPv4-shaped substring of the line
    Position(usize),
    /// Fixed pattern: first capture group if present, whole match otherwise
    Pattern(Regex),
}

/// A named detection rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub pattern: Regex,
    pub extraction: Extraction,
}

impl Rule {
    pub fn new(name: impl Into<String>, pattern: Regex, extraction: Extraction) -> Self {
        Self {
            name: name.into(),
            pattern,
            extraction,
        }
    }
}

/// A matched line: who to ban and which rule said so.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    /// Candidate address, not yet validated
    pub address: String,
    pub rule: String,
}

/// Ordered, immutable rule list.
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    rules: Vec<Rule>,
    ipv4: Regex,
}

impl RuleMatcher {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            ipv4: ipv4_shape(),
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Evaluate a raw (possibly non-UTF-8) log line.
    pub fn evaluate_bytes(&self, line: &[u8]) -> Option<Detection> {
        self.evaluate(&String::from_utf8_lossy(line))
    }

    /// First rule that both matches `line` and yields an address wins.
    pub fn evaluate(&self, line: &str) -> Option<Detection> {
        for rule in &self.rules {
            if !rule.pattern.is_match(line) {
                continue;
            }
            match self.extract(rule, line) {
                Some(address) => {
                    return Some(Detection {
                        address,
                        rule: rule.name.clone(),
                    })
                }
                None => {
                    warn!(rule = %rule.name, "no address found ({}) in: {}", describe(&rule.extraction), line);
                }
            }
        }
        None
    }

    fn extract(&self, rule: &Rule, line: &str) -> Option<String> {
        match &rule.extraction {
            Extraction::Position(n) => self
                .ipv4
                .find_iter(line)
                .nth(*n)
                .map(|m| m.as_str().to_string()),
            Extraction::Pattern(re) => {
                let caps = re.captures(line)?;
                caps.get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().to_string())
            }
        }
    }
}

fn describe(extraction: &Extraction) -> String {
    match extraction {
        Extraction::Position(n) => format!("position {}", n),
        Extraction::Pattern(re) => format!("pattern {}", re.as_str()),
    }
}

/// Compiled generic IPv4 pattern.
pub fn ipv4_shape() -> Regex {
    Regex::new(IPV4_SHAPE).expect("IPv4 shape pattern is valid")
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn ipv4_string_strategy() -> impl Strategy<Value = String> {
        (0u8..=255, 0u8..=255, 0u8..=255, 0u8..=255)
            .prop_map(|(a, b, c, d)| format!("{}.{}.{}.{}", a, b, c, d))
    }

    proptest! {
        /// Evaluation never panics, whatever the line
        #[test]
        fn prop_evaluate_arbitrary_no_panic(line in ".*", pos in 0usize..4) {
            let matcher = RuleMatcher::new(vec![
                Rule::new("any", Regex::new(".").unwrap(), Extraction::Position(pos)),
            ]);
            let _ = matcher.evaluate(&line);
        }

        /// The n-th embedded address is the one extracted
        #[test]
        fn prop_position_extracts_embedded_address(
            ips in prop::collection::vec(ipv4_string_strategy(), 1..5),
            pick in 0usize..5,
        ) {
            let line = format!("auth failure: {}", ips.join(" then "));
            let matcher = RuleMatcher::new(vec![
                Rule::new("auth", Regex::new("auth failure").unwrap(), Extraction::Position(pick)),
            ]);
            let result = matcher.evaluate(&line);
            if pick < ips.len() {
                prop_assert_eq!(result.map(|d| d.address), Some(ips[pick].clone()));
            } else {
                prop_assert_eq!(result, None);
            }
        }
    }
}
