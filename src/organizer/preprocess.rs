//! Member preprocessing
//!
//! Applies each configured member's rules to its raw sequence, in order:
//! unique_consecutive, trim_whitespace, remove_empty, not_reorder, not,
//! then cyclic block capture. Members are visited in dependency order so a
//! `not`/`not_reorder` target is already processed when it is read.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::extractors::SelectorMap;
use crate::schema::{GroupSchema, NotMode};

/// Sequence of text occurrences; `None` marks padding from length reconciliation
pub type Values = Vec<Option<String>>;

/// Selector map after member rules, plus the captured cyclic blocks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessedSelectorMap {
    entries: BTreeMap<String, Values>,
    cyclic_blocks: BTreeMap<String, Values>,
    #[serde(skip)]
    missing: Vec<String>,
}

impl ProcessedSelectorMap {
    /// Full processed sequence; empty when the key is unknown
    pub fn sequence(&self, key: &str) -> &[Option<String>] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn cyclic_block(&self, key: &str) -> Option<&[Option<String>]> {
        self.cyclic_blocks.get(key).map(Vec::as_slice)
    }

    /// Value at a logical index; cyclic members wrap over their block
    #[cfg(test)]
    fn value_at(&self, key: &str, index: usize) -> Option<&str> {
        match self.cyclic_block(key) {
            Some([]) => None,
            Some(block) => block[index % block.len()].as_deref(),
            None => self.sequence(key).get(index).and_then(|v| v.as_deref()),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Source selectors referenced by the schema but absent from the pages
    pub fn missing_selectors(&self) -> &[String] {
        &self.missing
    }
}

/// Apply every member rule in `schema` to `map`
pub fn preprocess(
    map: &SelectorMap,
    schema: &GroupSchema,
) -> Result<ProcessedSelectorMap, ConfigError> {
    let order = schema.member_order()?;

    let mut processed = ProcessedSelectorMap::default();
    for (selector, values) in map.iter() {
        processed.entries.insert(selector.to_string(), values.to_vec());
    }

    for (member, rule) in order {
        let source = rule.source_key(member);
        let raw: &[Option<String>] = match map.get(&source) {
            Some(values) => values,
            None => {
                debug!(member, selector = %source, "selector missing from pages");
                processed.missing.push(source);
                &[]
            }
        };

        let mut values: Values = raw.to_vec();

        if rule.unique_consecutive {
            values.dedup();
        }
        if rule.trim_whitespace {
            for text in values.iter_mut().flatten() {
                *text = text.trim().to_string();
            }
        }
        if rule.remove_empty {
            values.retain(|v| v.as_deref().is_some_and(|text| !text.trim().is_empty()));
        }

        if let Some(target) = rule.not_reorder.as_deref() {
            values = reconcile_length(
                values,
                processed.sequence(target),
                processed.cyclic_block(target),
            );
        }

        if let Some(target) = rule.not.as_deref() {
            let trim = rule.trim_whitespace;
            match rule.not_mode {
                NotMode::Position => {
                    subtract_by_position(&mut values, processed.sequence(target), trim)
                }
                NotMode::Global => subtract_global(&mut values, processed.sequence(target), trim),
                NotMode::Cyclic => {
                    let needles = processed
                        .cyclic_block(target)
                        .unwrap_or_else(|| processed.sequence(target));
                    subtract_cyclic(&mut values, needles, trim)
                }
            }
        }

        if rule.cyclic {
            let size = rule.cyclic_block_size.unwrap_or(values.len()).min(values.len());
            processed
                .cyclic_blocks
                .insert(member.to_string(), values[..size].to_vec());
        }

        processed.entries.insert(member.to_string(), values);
    }

    Ok(processed)
}

/// Match `values` to the target's length.
///
/// A cyclic target is matched block-wise: re-chunking into target-sized
/// blocks and flattening the tail keeps the sequence as it is. Any other
/// target pads with `None` or truncates.
fn reconcile_length(
    mut values: Values,
    target: &[Option<String>],
    target_block: Option<&[Option<String>]>,
) -> Values {
    if target_block.is_some_and(|block| !block.is_empty()) {
        return values;
    }
    values.resize(target.len(), None);
    values
}

/// Remove target[i] from values[i] over the overlapping prefix
pub fn subtract_by_position(values: &mut [Option<String>], target: &[Option<String>], trim: bool) {
    for (value, needle) in values.iter_mut().zip(target) {
        if let (Some(text), Some(needle)) = (value.as_mut(), needle.as_deref()) {
            *text = remove_text(text, needle, trim);
        }
    }
}

/// Remove every non-empty target text from every value, longest first
pub fn subtract_global(values: &mut [Option<String>], target: &[Option<String>], trim: bool) {
    let mut needles: Vec<&str> = Vec::new();
    for needle in target.iter().flatten() {
        if !needle.is_empty() && !needles.contains(&needle.as_str()) {
            needles.push(needle);
        }
    }
    // Stable: equal lengths keep target order
    needles.sort_by(|a, b| b.len().cmp(&a.len()));

    for text in values.iter_mut().flatten() {
        for needle in &needles {
            *text = remove_text(text, needle, trim);
        }
    }
}

/// Remove target[i mod len] from values[i]
pub fn subtract_cyclic(values: &mut [Option<String>], target: &[Option<String>], trim: bool) {
    if target.is_empty() {
        return;
    }
    for (index, value) in values.iter_mut().enumerate() {
        let needle = target[index % target.len()].as_deref();
        if let (Some(text), Some(needle)) = (value.as_mut(), needle) {
            *text = remove_text(text, needle, trim);
        }
    }
}

/// Strip every occurrence of `needle`; empty needles are a no-op
pub(crate) fn remove_text(text: &str, needle: &str, trim: bool) -> String {
    if needle.is_empty() || !text.contains(needle) {
        return text.to_string();
    }
    let stripped = text.replace(needle, "");
    if trim {
        stripped.trim().to_string()
    } else {
        stripped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{GroupNode, MemberRule};

    fn raw(entries: &[(&str, &[&str])]) -> SelectorMap {
        let mut map = SelectorMap::new();
        for (selector, values) in entries {
            for value in *values {
                map.push(*selector, *value);
            }
        }
        map
    }

    fn schema(members: Vec<(&str, MemberRule)>) -> GroupSchema {
        let group = members
            .into_iter()
            .fold(GroupNode::default(), |group, (key, rule)| group.with_member(key, rule));
        GroupSchema::new().with_group("g", group)
    }

    fn texts(values: &[Option<String>]) -> Vec<Option<&str>> {
        values.iter().map(|v| v.as_deref()).collect()
    }

    #[test]
    fn test_unique_consecutive() {
        let map = raw(&[(".a", &["a", "a", "b", "b", "a"])]);
        let rule = MemberRule {
            unique_consecutive: true,
            ..Default::default()
        };
        let processed = preprocess(&map, &schema(vec![(".a", rule.clone())])).unwrap();
        assert_eq!(texts(processed.sequence(".a")), vec![Some("a"), Some("b"), Some("a")]);

        // Feeding the result back in changes nothing
        let mut again = SelectorMap::new();
        for value in processed.sequence(".a").iter().flatten() {
            again.push(".a", value.as_str());
        }
        let twice = preprocess(&again, &schema(vec![(".a", rule)])).unwrap();
        assert_eq!(twice.sequence(".a"), processed.sequence(".a"));
    }

    #[test]
    fn test_trim_and_remove_empty() {
        let map = raw(&[(".a", &[" x ", "   ", "y"])]);

        let processed = preprocess(&map, &schema(vec![(".a", MemberRule::default())])).unwrap();
        assert_eq!(texts(processed.sequence(".a")), vec![Some("x"), Some(""), Some("y")]);

        let rule = MemberRule {
            remove_empty: true,
            ..Default::default()
        };
        let processed = preprocess(&map, &schema(vec![(".a", rule)])).unwrap();
        assert_eq!(texts(processed.sequence(".a")), vec![Some("x"), Some("y")]);

        let rule = MemberRule {
            trim_whitespace: false,
            ..Default::default()
        };
        let processed = preprocess(&map, &schema(vec![(".a", rule)])).unwrap();
        assert_eq!(texts(processed.sequence(".a")), vec![Some(" x "), Some("   "), Some("y")]);
    }

    #[test]
    fn test_not_position() {
        let map = raw(&[(".main", &["x1 foo", "y1"]), (".target", &["x1", "z"])]);
        let rule = MemberRule {
            not: Some(".target".into()),
            not_mode: NotMode::Position,
            ..Default::default()
        };
        let processed = preprocess(&map, &schema(vec![(".main", rule)])).unwrap();
        assert_eq!(texts(processed.sequence(".main")), vec![Some("foo"), Some("y1")]);
    }

    #[test]
    fn test_not_position_beyond_overlap() {
        let mut values = vec![
            Some("a-x".to_string()),
            Some("b-x".to_string()),
            Some("c-x".to_string()),
        ];
        subtract_by_position(&mut values, &[Some("-x".to_string())], true);
        assert_eq!(texts(&values), vec![Some("a"), Some("b-x"), Some("c-x")]);
    }

    #[test]
    fn test_not_global() {
        let map = raw(&[(".main", &["a-foo", "b-foo"]), (".target", &["foo"])]);
        let rule = MemberRule {
            not: Some(".target".into()),
            ..Default::default()
        };
        let processed = preprocess(&map, &schema(vec![(".main", rule)])).unwrap();
        assert_eq!(texts(processed.sequence(".main")), vec![Some("a-"), Some("b-")]);
    }

    #[test]
    fn test_not_global_prefers_longer_needles() {
        let mut values = vec![Some("Price: 10 EUR".to_string())];
        let target = vec![Some("Price".to_string()), Some("Price:".to_string())];
        subtract_global(&mut values, &target, true);
        assert_eq!(texts(&values), vec![Some("10 EUR")]);
    }

    #[test]
    fn test_not_cyclic() {
        let map = raw(&[
            (".cell", &["Name: A", "Age: 1", "Name: B", "Age: 2"]),
            (".label", &["Name:", "Age:"]),
        ]);
        let rule = MemberRule {
            not: Some(".label".into()),
            not_mode: NotMode::Cyclic,
            ..Default::default()
        };
        let processed = preprocess(&map, &schema(vec![(".cell", rule)])).unwrap();
        assert_eq!(
            texts(processed.sequence(".cell")),
            vec![Some("A"), Some("1"), Some("B"), Some("2")]
        );
    }

    #[test]
    fn test_not_cyclic_uses_target_block() {
        let map = raw(&[
            (".cell", &["Name: A", "Age: 1", "Name: B", "Age: 2"]),
            (".label", &["Name:", "Age:", "Name:", "Age:", "Footer"]),
        ]);
        let label = MemberRule {
            cyclic: true,
            cyclic_block_size: Some(2),
            ..Default::default()
        };
        let cell = MemberRule {
            not: Some(".label".into()),
            not_mode: NotMode::Cyclic,
            ..Default::default()
        };
        let schema = schema(vec![(".cell", cell), (".label", label)]);
        let processed = preprocess(&map, &schema).unwrap();
        assert_eq!(
            texts(processed.sequence(".cell")),
            vec![Some("A"), Some("1"), Some("B"), Some("2")]
        );
    }

    #[test]
    fn test_not_reads_processed_target() {
        // The target trims duplicates first; subtraction sees the processed form
        let map = raw(&[(".main", &["x-a", "y-b"]), (".target", &[" -a ", " -a ", "-b"])]);
        let target = MemberRule {
            unique_consecutive: true,
            ..Default::default()
        };
        let main = MemberRule {
            not: Some(".target".into()),
            not_mode: NotMode::Position,
            ..Default::default()
        };
        let schema = schema(vec![(".main", main), (".target", target)]);
        let processed = preprocess(&map, &schema).unwrap();
        assert_eq!(texts(processed.sequence(".target")), vec![Some("-a"), Some("-b")]);
        assert_eq!(texts(processed.sequence(".main")), vec![Some("x"), Some("y")]);
    }

    #[test]
    fn test_not_reorder_pads_and_truncates() {
        let map = raw(&[(".short", &["a"]), (".long", &["1", "2", "3"])]);

        let pad = MemberRule {
            not_reorder: Some(".long".into()),
            ..Default::default()
        };
        let processed = preprocess(&map, &schema(vec![(".short", pad)])).unwrap();
        assert_eq!(texts(processed.sequence(".short")), vec![Some("a"), None, None]);

        let truncate = MemberRule {
            not_reorder: Some(".short".into()),
            ..Default::default()
        };
        let processed = preprocess(&map, &schema(vec![(".long", truncate)])).unwrap();
        assert_eq!(texts(processed.sequence(".long")), vec![Some("1")]);
    }

    #[test]
    fn test_not_reorder_against_cyclic_target_keeps_length() {
        let map = raw(&[
            (".head", &["h1", "h2", "h3", "h4"]),
            (".row", &["1", "2", "3", "4", "5"]),
        ]);
        let head = MemberRule {
            cyclic: true,
            cyclic_block_size: Some(2),
            ..Default::default()
        };
        let row = MemberRule {
            not_reorder: Some(".head".into()),
            ..Default::default()
        };
        let processed = preprocess(&map, &schema(vec![(".head", head), (".row", row)])).unwrap();
        assert_eq!(processed.sequence(".row").len(), 5);
    }

    #[test]
    fn test_cyclic_block_lookup() {
        let values: Vec<String> = (0..10).map(|i| format!("v{i}")).collect();
        let mut map = SelectorMap::new();
        for value in &values {
            map.push(".c", value.as_str());
        }
        let rule = MemberRule {
            cyclic: true,
            cyclic_block_size: Some(3),
            ..Default::default()
        };
        let processed = preprocess(&map, &schema(vec![(".c", rule)])).unwrap();

        assert_eq!(processed.cyclic_block(".c").map(<[_]>::len), Some(3));
        assert_eq!(processed.value_at(".c", 7), processed.value_at(".c", 7 % 3));
        assert_eq!(processed.value_at(".c", 7), Some("v1"));
        // The full sequence stays available
        assert_eq!(processed.sequence(".c").len(), 10);
    }

    #[test]
    fn test_cyclic_without_size_captures_everything() {
        let map = raw(&[(".c", &["a", "b"])]);
        let rule = MemberRule {
            cyclic: true,
            ..Default::default()
        };
        let processed = preprocess(&map, &schema(vec![(".c", rule)])).unwrap();
        assert_eq!(processed.value_at(".c", 5), Some("b"));

        // A block larger than the sequence is clamped
        let rule = MemberRule {
            cyclic: true,
            cyclic_block_size: Some(8),
            ..Default::default()
        };
        let processed = preprocess(&map, &schema(vec![(".c", rule)])).unwrap();
        assert_eq!(processed.cyclic_block(".c").map(<[_]>::len), Some(2));
    }

    #[test]
    fn test_missing_selector_is_empty() {
        let map = raw(&[(".present", &["x"])]);
        let schema = schema(vec![(".absent", MemberRule::default())]);
        let processed = preprocess(&map, &schema).unwrap();

        assert!(processed.sequence(".absent").is_empty());
        assert_eq!(processed.value_at(".absent", 0), None);
        assert_eq!(processed.missing_selectors(), [".absent".to_string()]);
    }

    #[test]
    fn test_empty_query_slots_kept_unless_removed() {
        let mut map = SelectorMap::new();
        map.push_slot("selector:a@href", Some("/1".into()));
        map.push_slot("selector:a@href", None);
        map.push_slot("selector:a@href", Some(" ".into()));

        let processed =
            preprocess(&map, &schema(vec![("selector:a@href", MemberRule::default())])).unwrap();
        assert_eq!(texts(processed.sequence("selector:a@href")), vec![Some("/1"), None, Some("")]);

        let rule = MemberRule {
            remove_empty: true,
            ..Default::default()
        };
        let processed = preprocess(&map, &schema(vec![("selector:a@href", rule)])).unwrap();
        assert_eq!(texts(processed.sequence("selector:a@href")), vec![Some("/1")]);
    }

    #[test]
    fn test_unconfigured_selectors_pass_through() {
        let map = raw(&[(".other", &["  keep  ", "  keep  "])]);
        let processed = preprocess(&map, &schema(vec![])).unwrap();
        assert_eq!(texts(processed.sequence(".other")), vec![Some("  keep  "), Some("  keep  ")]);
    }

    #[test]
    fn test_alias_reads_source_selector() {
        let map = raw(&[("#list .title", &["A", "B"])]);
        let rule = MemberRule {
            selector: Some("#list .title".into()),
            ..Default::default()
        };
        let processed = preprocess(&map, &schema(vec![("title", rule)])).unwrap();
        assert_eq!(texts(processed.sequence("title")), vec![Some("A"), Some("B")]);
        assert!(processed.contains("#list .title"));
    }
}
