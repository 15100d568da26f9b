use anyhow::Context;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use lookout_common::types::Rule;

/// Loads rule records from a folder of YAML files, one rule per file.
///
/// Disabled rules are skipped here so the engine only ever sees runnable
/// records. Rule names are the cross-replica coordination identity, so
/// duplicates are dropped (first file wins) with a warning. Zero-valued
/// timeframe/threshold take the configured defaults.
pub fn load_rules(
    folder: &Path,
    default_timeframe: i64,
    default_threshold: i64,
) -> anyhow::Result<Vec<Rule>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(folder)
        .with_context(|| format!("cannot read rules folder {}", folder.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .collect();
    paths.sort();

    let mut rules = Vec::new();
    let mut seen = HashSet::new();

    for path in paths {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read rule file {}", path.display()))?;
        let mut rule: Rule = serde_yaml::from_str(&text)
            .with_context(|| format!("cannot parse rule file {}", path.display()))?;

        if !rule.enabled {
            tracing::debug!(rule = %rule.name, file = %path.display(), "skipping disabled rule");
            continue;
        }
        if !seen.insert(rule.name.clone()) {
            tracing::warn!(
                rule = %rule.name,
                file = %path.display(),
                "duplicate rule name, keeping the first definition"
            );
            continue;
        }

        if rule.timeframe == 0 {
            rule.timeframe = default_timeframe;
        }
        if rule.threshold == 0 {
            rule.threshold = default_threshold;
        }

        tracing::debug!(rule = %rule.name, kind = %rule.rule_type, "rule loaded");
        rules.push(rule);
    }

    Ok(rules)
}
