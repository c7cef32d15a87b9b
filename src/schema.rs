//! Group schema
//!
//! Declarative description of the output tree: named groups with a
//! cardinality, an optional parent, and per-member post-processing rules.
//! The schema is read-only input; [`GroupSchema::validate`] must pass before
//! any stage consumes it.

use std::collections::{BTreeMap, HashMap};

use serde::{de, Deserialize, Deserializer};

use crate::error::ConfigError;
use crate::extractors::QUERY_PREFIX;
use crate::organizer::build_hierarchy;

/// Cardinality of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "GroupTypeRepr")]
pub enum GroupType {
    /// One item per value of the longest member
    #[default]
    Single,
    /// One item holding every member as a full list
    All,
    /// One item per `count`-sized window of the longest member
    Multiple { count: usize },
}

/// Wire form: `"single"`, `"all"` or `{"multiple": n}`
#[derive(Deserialize)]
#[serde(untagged)]
enum GroupTypeRepr {
    Token(String),
    Multiple { multiple: i64 },
}

impl TryFrom<GroupTypeRepr> for GroupType {
    type Error = String;

    fn try_from(repr: GroupTypeRepr) -> Result<Self, Self::Error> {
        match repr {
            GroupTypeRepr::Token(token) => match token.as_str() {
                "single" => Ok(GroupType::Single),
                "all" => Ok(GroupType::All),
                other => Err(format!("unknown group type '{other}'")),
            },
            GroupTypeRepr::Multiple { multiple } if multiple > 0 => Ok(GroupType::Multiple {
                count: multiple as usize,
            }),
            GroupTypeRepr::Multiple { multiple } => Err(format!(
                "multiple count must be a positive integer, got {multiple}"
            )),
        }
    }
}

/// How a `not` target is subtracted from a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotMode {
    /// target[i] is removed from value[i]
    Position,
    /// every target text is removed from every value
    #[default]
    Global,
    /// target[i mod len] is removed from value[i]
    Cyclic,
}

/// Post-extraction rules for one member
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MemberRule {
    #[serde(default)]
    pub unique_consecutive: bool,
    #[serde(default = "default_true")]
    pub trim_whitespace: bool,
    #[serde(default)]
    pub remove_empty: bool,
    #[serde(default)]
    pub not: Option<String>,
    #[serde(default)]
    pub not_mode: NotMode,
    #[serde(default)]
    pub not_reorder: Option<String>,
    #[serde(default)]
    pub cyclic: bool,
    #[serde(default, deserialize_with = "positive_block_size")]
    pub cyclic_block_size: Option<usize>,
    /// Source selector when the member key is only an alias
    #[serde(default)]
    pub selector: Option<String>,
    /// Attribute to read instead of text (query members only)
    #[serde(default)]
    pub attribute: Option<String>,
}

fn default_true() -> bool {
    true
}

fn positive_block_size<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<i64>::deserialize(deserializer)? {
        Some(size) if size <= 0 => Err(de::Error::custom(format!(
            "cyclic_block_size must be a positive integer, got {size}"
        ))),
        Some(size) => Ok(Some(size as usize)),
        None => Ok(None),
    }
}

impl Default for MemberRule {
    fn default() -> Self {
        Self {
            unique_consecutive: false,
            trim_whitespace: true,
            remove_empty: false,
            not: None,
            not_mode: NotMode::Global,
            not_reorder: None,
            cyclic: false,
            cyclic_block_size: None,
            selector: None,
            attribute: None,
        }
    }
}

impl MemberRule {
    /// Selector this member reads from: the explicit `selector`, else the key itself
    pub fn source<'a>(&'a self, member_key: &'a str) -> &'a str {
        self.selector.as_deref().unwrap_or(member_key)
    }

    /// Key under which this member's raw values live in the selector map
    pub fn source_key(&self, member_key: &str) -> String {
        let source = self.source(member_key);
        match &self.attribute {
            Some(attr) => format!("{source}@{attr}"),
            None => source.to_string(),
        }
    }

    pub fn is_query(&self, member_key: &str) -> bool {
        self.source(member_key).starts_with(QUERY_PREFIX)
    }

    /// Other members whose processed sequences this one reads
    fn references(&self) -> impl Iterator<Item = &str> {
        self.not_reorder.as_deref().into_iter().chain(self.not.as_deref())
    }
}

/// One named group
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct GroupNode {
    #[serde(rename = "type", default)]
    pub kind: GroupType,
    #[serde(default, alias = "parent_group")]
    pub parent: Option<String>,
    #[serde(default)]
    pub members: BTreeMap<String, MemberRule>,
}

impl GroupNode {
    pub fn new(kind: GroupType) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_member(mut self, key: impl Into<String>, rule: MemberRule) -> Self {
        self.members.insert(key.into(), rule);
        self
    }
}

/// Group name -> group definition
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(transparent)]
pub struct GroupSchema {
    groups: BTreeMap<String, GroupNode>,
}

impl GroupSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, name: impl Into<String>, group: GroupNode) -> Self {
        self.groups.insert(name.into(), group);
        self
    }

    /// Parse and validate a schema from its JSON form
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let schema: Self = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn group(&self, name: &str) -> Option<&GroupNode> {
        self.groups.get(name)
    }

    /// Groups in name order
    pub fn groups(&self) -> impl Iterator<Item = (&str, &GroupNode)> {
        self.groups.iter().map(|(name, group)| (name.as_str(), group))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Check every structural constraint. Nothing downstream re-validates.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, group) in self.groups() {
            if group.kind == (GroupType::Multiple { count: 0 }) {
                return Err(ConfigError::InvalidMultiple {
                    group: name.to_string(),
                });
            }
        }

        // Dangling parents and parent cycles
        build_hierarchy(self)?;

        for (name, group) in self.groups() {
            for (child, child_group) in self.groups() {
                let is_child = child_group.parent.as_deref() == Some(name);
                if is_child && group.members.contains_key(child) {
                    return Err(ConfigError::MemberShadowsGroup {
                        member: child.to_string(),
                        group: name.to_string(),
                    });
                }
            }
        }

        for (key, rule) in self.members()? {
            if rule.cyclic_block_size == Some(0) {
                return Err(ConfigError::InvalidBlockSize {
                    member: key.to_string(),
                });
            }
            if rule.attribute.is_some() && !rule.is_query(key) {
                return Err(ConfigError::AttributeWithoutQuery {
                    member: key.to_string(),
                });
            }
        }

        self.member_order()?;
        Ok(())
    }

    /// Distinct members across all groups, keyed by member key
    pub fn members(&self) -> Result<BTreeMap<&str, &MemberRule>, ConfigError> {
        let mut members: BTreeMap<&str, &MemberRule> = BTreeMap::new();
        for (name, group) in self.groups() {
            for (key, rule) in &group.members {
                match members.get(key.as_str()) {
                    Some(existing) if *existing != rule => {
                        return Err(ConfigError::ConflictingMember {
                            member: key.clone(),
                            group: name.to_string(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        members.insert(key.as_str(), rule);
                    }
                }
            }
        }
        Ok(members)
    }

    /// Members ordered so every `not`/`not_reorder` target that is itself a
    /// configured member comes before the members reading it.
    pub fn member_order(&self) -> Result<Vec<(&str, &MemberRule)>, ConfigError> {
        let members = self.members()?;
        let mut state = HashMap::new();
        let mut order = Vec::with_capacity(members.len());

        for &key in members.keys() {
            visit_member(key, &members, &mut state, &mut order)?;
        }

        Ok(order)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

fn visit_member<'a>(
    key: &'a str,
    members: &BTreeMap<&'a str, &'a MemberRule>,
    state: &mut HashMap<&'a str, Visit>,
    order: &mut Vec<(&'a str, &'a MemberRule)>,
) -> Result<(), ConfigError> {
    match state.get(key) {
        Some(Visit::Done) => return Ok(()),
        Some(Visit::InProgress) => {
            return Err(ConfigError::MemberCycle {
                member: key.to_string(),
            })
        }
        None => {}
    }

    let Some((&key, &rule)) = members.get_key_value(key) else {
        // Unconfigured target: read raw, no ordering constraint
        return Ok(());
    };

    state.insert(key, Visit::InProgress);
    for target in rule.references() {
        if let Some((&target, _)) = members.get_key_value(target) {
            visit_member(target, members, state, order)?;
        }
    }
    state.insert(key, Visit::Done);
    order.push((key, rule));
    Ok(())
}
