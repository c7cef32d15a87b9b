//! Group materialization
//!
//! Recursive descent over the hierarchy. Every group becomes an array of
//! item objects: one entry per member plus one entry per child group.
//!
//! A [`MaterializeContext`] says which share of each (non-cyclic) member
//! sequence a group instance may see. The root sees everything; a child of
//! item `k` out of `count` sees the `k`-th of `count` contiguous shares of
//! its parent's share.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use super::hierarchy::{GroupTree, HierarchyNode};
use super::preprocess::{remove_text, ProcessedSelectorMap};
use crate::schema::{GroupNode, GroupType, MemberRule, NotMode};

/// Nested output: root group name -> array of items
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OrganizedResult(Map<String, Value>);

impl OrganizedResult {
    pub fn get(&self, group: &str) -> Option<&Value> {
        self.0.get(group)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }
}

/// Position of a group instance among its parent's items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterializeContext {
    pub item_index: usize,
    pub total_items: usize,
}

impl MaterializeContext {
    pub const ROOT: Self = Self {
        item_index: 0,
        total_items: 1,
    };

    /// Context for item `index` of `count` produced under this context
    pub fn nest(self, index: usize, count: usize) -> Self {
        Self {
            item_index: self.item_index * count + index,
            total_items: self.total_items * count,
        }
    }

    /// This context's contiguous share of `values`.
    ///
    /// Shares are `len / total_items` long (at least one value); a remainder
    /// that does not divide evenly is dropped.
    pub fn scope<'v>(self, values: &'v [Option<String>]) -> &'v [Option<String>] {
        if self.total_items == 0 {
            return &[];
        }
        let share = (values.len() / self.total_items).max(1);
        let start = self.item_index.saturating_mul(share);
        let end = start.saturating_add(share).min(values.len());
        values.get(start..end).unwrap_or(&[])
    }
}

/// Expand every root group against the processed map
pub fn materialize(tree: &GroupTree<'_>, map: &ProcessedSelectorMap) -> OrganizedResult {
    let mut result = Map::new();
    for root in tree.roots() {
        let items = materialize_group(root, map, MaterializeContext::ROOT);
        result.insert(root.name.to_string(), Value::Array(items));
    }
    OrganizedResult(result)
}

/// What a group instance sees of one sequence
#[derive(Clone, Copy)]
struct SequenceView<'a> {
    values: &'a [Option<String>],
    cyclic: bool,
}

impl<'a> SequenceView<'a> {
    fn resolve(map: &'a ProcessedSelectorMap, key: &str, ctx: MaterializeContext) -> Self {
        match map.cyclic_block(key) {
            Some(block) => Self {
                values: block,
                cyclic: true,
            },
            None => Self {
                values: ctx.scope(map.sequence(key)),
                cyclic: false,
            },
        }
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn at(&self, index: usize) -> Option<&'a str> {
        if self.cyclic {
            self.wrapping_at(index)
        } else {
            self.values.get(index).and_then(|v| v.as_deref())
        }
    }

    fn wrapping_at(&self, index: usize) -> Option<&'a str> {
        if self.values.is_empty() {
            return None;
        }
        self.values[index % self.values.len()].as_deref()
    }

    /// `size` values starting at window `index`; cyclic views always start at the block head
    fn window(&self, index: usize, size: usize) -> Vec<Option<String>> {
        if self.cyclic {
            if self.values.is_empty() {
                return Vec::new();
            }
            (0..size).map(|offset| self.at(offset).map(str::to_string)).collect()
        } else {
            self.values
                .iter()
                .skip(index.saturating_mul(size))
                .take(size)
                .cloned()
                .collect()
        }
    }
}

struct Member<'a> {
    key: &'a str,
    rule: &'a MemberRule,
    view: SequenceView<'a>,
}

fn resolve_members<'a>(
    group: &'a GroupNode,
    map: &'a ProcessedSelectorMap,
    ctx: MaterializeContext,
) -> Vec<Member<'a>> {
    group
        .members
        .iter()
        .map(|(key, rule)| Member {
            key,
            rule,
            view: SequenceView::resolve(map, key, ctx),
        })
        .collect()
}

fn materialize_group(
    node: &HierarchyNode<'_>,
    map: &ProcessedSelectorMap,
    ctx: MaterializeContext,
) -> Vec<Value> {
    let members = resolve_members(node.group, map, ctx);

    let items = match node.group.kind {
        GroupType::All => vec![all_item(node, &members, map, ctx)],
        GroupType::Single => single_items(node, &members, map, ctx),
        GroupType::Multiple { count } => multiple_items(node, &members, map, ctx, count),
    };

    trace!(
        group = node.name,
        index = ctx.item_index,
        total = ctx.total_items,
        items = items.len(),
        "materialized group"
    );
    items
}

/// Items a group yields when each consumes `window` values of its longest member.
///
/// A non-empty cyclic block wraps to fill any window, so it always yields at
/// least one item.
fn item_count(members: &[Member<'_>], window: usize) -> usize {
    if members.is_empty() {
        // Pure container
        return 1;
    }
    members
        .iter()
        .map(|m| {
            let windows = m.view.len() / window.max(1);
            if m.view.cyclic && m.view.len() > 0 {
                windows.max(1)
            } else {
                windows
            }
        })
        .max()
        .unwrap_or(0)
}

fn all_item(
    node: &HierarchyNode<'_>,
    members: &[Member<'_>],
    map: &ProcessedSelectorMap,
    ctx: MaterializeContext,
) -> Value {
    let mut item = Map::new();
    for member in members {
        item.insert(member.key.to_string(), list_value(member.view.values));
    }
    for child in &node.children {
        item.insert(child.name.to_string(), Value::Array(materialize_group(child, map, ctx)));
    }
    Value::Object(item)
}

fn single_items(
    node: &HierarchyNode<'_>,
    members: &[Member<'_>],
    map: &ProcessedSelectorMap,
    ctx: MaterializeContext,
) -> Vec<Value> {
    let count = item_count(members, 1);

    (0..count)
        .map(|index| {
            let mut item = Map::new();
            for member in members {
                let value = member
                    .view
                    .at(index)
                    .map(|text| strip_item_overlap(text, member, map, ctx, index));
                item.insert(member.key.to_string(), value.map_or(Value::Null, Value::String));
            }

            let child_ctx = ctx.nest(index, count);
            for child in &node.children {
                item.insert(
                    child.name.to_string(),
                    Value::Array(materialize_group(child, map, child_ctx)),
                );
            }
            Value::Object(item)
        })
        .collect()
}

/// Re-apply index-bound `not` rules to a single selected value
fn strip_item_overlap(
    text: &str,
    member: &Member<'_>,
    map: &ProcessedSelectorMap,
    ctx: MaterializeContext,
    index: usize,
) -> String {
    let Some(target) = member.rule.not.as_deref() else {
        return text.to_string();
    };

    let target_view = SequenceView::resolve(map, target, ctx);
    let needle = match member.rule.not_mode {
        NotMode::Global => None,
        NotMode::Position => target_view.at(index),
        NotMode::Cyclic => target_view.wrapping_at(index),
    };

    match needle {
        Some(needle) if !needle.is_empty() && text.contains(needle) => {
            let stripped = remove_text(text, needle, member.rule.trim_whitespace);
            // Only when something meaningful is left
            if stripped.trim().is_empty() {
                text.to_string()
            } else {
                stripped
            }
        }
        _ => text.to_string(),
    }
}

fn multiple_items(
    node: &HierarchyNode<'_>,
    members: &[Member<'_>],
    map: &ProcessedSelectorMap,
    ctx: MaterializeContext,
    size: usize,
) -> Vec<Value> {
    let count = item_count(members, size);

    for member in members.iter().filter(|m| !m.view.cyclic) {
        let dropped = member.view.len().saturating_sub(count * size);
        if dropped > 0 {
            debug!(
                group = node.name,
                member = member.key,
                dropped,
                "values beyond the last full window dropped"
            );
        }
    }

    let mut items = Vec::with_capacity(count);
    for index in 0..count {
        let mut item = Map::new();
        let mut width = 0;

        for member in members {
            let window = member_window(member, map, ctx, index, size);
            width = width.max(window.len());
            item.insert(member.key.to_string(), list_value(&window));
        }

        for child in &node.children {
            let child_items: Vec<Value> = if width > 0 {
                // One pass per element of this item's windows
                (0..width)
                    .flat_map(|offset| {
                        materialize_group(child, map, ctx.nest(index * size + offset, count * size))
                    })
                    .collect()
            } else {
                materialize_group(child, map, ctx.nest(index, count))
            };
            item.insert(child.name.to_string(), Value::Array(child_items));
        }

        items.push(Value::Object(item));
    }
    items
}

/// A member's window for item `index`.
///
/// Cyclic members repeat the same block in every item, so their `not` target
/// is read from its head window and aligned by position within the window.
fn member_window(
    member: &Member<'_>,
    map: &ProcessedSelectorMap,
    ctx: MaterializeContext,
    index: usize,
    size: usize,
) -> Vec<Option<String>> {
    let mut window = member.view.window(index, size);

    if member.view.cyclic {
        if let Some(target) = member.rule.not.as_deref() {
            let needles = SequenceView::resolve(map, target, ctx).window(0, size);
            for (offset, value) in window.iter_mut().enumerate() {
                let needle = needles.get(offset % size).and_then(|n| n.as_deref());
                if let (Some(text), Some(needle)) = (value.as_mut(), needle) {
                    *text = remove_text(text, needle, member.rule.trim_whitespace);
                }
            }
        }
    }

    window
}

fn list_value(values: &[Option<String>]) -> Value {
    Value::Array(
        values
            .iter()
            .map(|v| v.as_ref().map_or(Value::Null, |text| Value::String(text.clone())))
            .collect(),
    )
}
