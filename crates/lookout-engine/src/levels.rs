use lookout_common::config::LevelPattern;
use lookout_common::types::{AlertLevel, Rule};

/// Resolves an alert level for a rule.
///
/// A level set on the rule wins. Otherwise the rule name is matched
/// case-insensitively against an ordered pattern table (first hit wins),
/// and anything unmatched is `Low`, so resolution is total. The table can be
/// replaced from configuration for deployments whose rule names use other
/// tokens.
pub struct LevelMatcher {
    patterns: Vec<LevelPattern>,
}

impl LevelMatcher {
    pub fn new(patterns: Vec<LevelPattern>) -> Self {
        if patterns.is_empty() {
            Self {
                patterns: Self::default_patterns(),
            }
        } else {
            Self { patterns }
        }
    }

    fn pattern(tokens: &[&str], level: AlertLevel) -> LevelPattern {
        LevelPattern {
            contains: tokens.iter().map(|t| t.to_string()).collect(),
            level,
        }
    }

    fn default_patterns() -> Vec<LevelPattern> {
        vec![
            Self::pattern(&["system component", "error"], AlertLevel::Critical),
            Self::pattern(&["security"], AlertLevel::Critical),
            Self::pattern(&["fatal"], AlertLevel::Critical),
            Self::pattern(&["panic"], AlertLevel::Critical),
            Self::pattern(&["error"], AlertLevel::High),
            Self::pattern(&["system component", "warning"], AlertLevel::High),
            Self::pattern(&["warning"], AlertLevel::Medium),
        ]
    }

    pub fn resolve(&self, rule: &Rule) -> AlertLevel {
        if let Some(level) = rule.level {
            tracing::debug!(rule = %rule.name, level = %level, "using level from rule");
            return level;
        }

        let name = rule.name.to_lowercase();
        for pattern in &self.patterns {
            if pattern
                .contains
                .iter()
                .all(|token| name.contains(&token.to_lowercase()))
            {
                tracing::debug!(rule = %rule.name, level = %pattern.level, "level derived from name");
                return pattern.level;
            }
        }
        AlertLevel::Low
    }
}

impl Default for LevelMatcher {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
