use lookout_common::types::{Rule, RuleType, SearchResponse};

/// Applies a rule's trigger predicate to the window's hit count.
///
/// `hits.total.value` is authoritative; the returned hits are only example
/// material for the renderer. `spike` and `change` keep their simplified
/// single-window semantics; unknown types fall back to the frequency
/// predicate.
pub fn should_trigger(rule: &Rule, response: &SearchResponse) -> bool {
    let count = response.total();

    match rule.rule_type {
        RuleType::Frequency => count >= rule.threshold,
        RuleType::Any => count > 0,
        RuleType::Spike => count >= rule.threshold,
        RuleType::Flatline => count < rule.threshold,
        RuleType::Change => count > 0,
        RuleType::Unknown => count >= rule.threshold,
    }
}
