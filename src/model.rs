//! Authoring-side data model.
//!
//! A [`CtaRecord`] is what an operator edits. Everything the engine derives
//! from records (chain entries, compiled conditions, placements) lives in
//! `engine/`; this module only holds the shapes that cross the record-store
//! boundary, so every type here is serde-friendly and uses the same wire names
//! the store uses.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Stable identifier of a CTA record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CtaId(pub u64);

impl fmt::Display for CtaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CtaId {
    fn from(value: u64) -> Self {
        CtaId(value)
    }
}

/// Identifier of a taxonomy term (category, tag, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Active,
    Inactive,
}

/// Advisory role. Traversal ignores it; only authoring screens care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    #[default]
    Primary,
    FallbackOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxonomyMode {
    #[default]
    Include,
    Exclude,
}

/// Which end of the content the insertion position counts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

/// What to do when the requested position lies beyond the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    #[default]
    Skip,
    ClampToEnd,
}

/// Comparison operator of a storage condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=", alias = "eq")]
    Eq,
    #[serde(rename = "!=", alias = "ne")]
    Ne,
    #[serde(rename = ">", alias = "gt")]
    Gt,
    #[serde(rename = "<", alias = "lt")]
    Lt,
    #[serde(rename = ">=", alias = "ge")]
    Ge,
    #[serde(rename = "<=", alias = "le")]
    Le,
    #[serde(rename = "contains")]
    Contains,
}

impl Operator {
    /// Mnemonic used inside compiled expressions.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Ge => "ge",
            Operator::Le => "le",
            Operator::Contains => "contains",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        Some(match s {
            "eq" => Operator::Eq,
            "ne" => Operator::Ne,
            "gt" => Operator::Gt,
            "lt" => Operator::Lt,
            "ge" => Operator::Ge,
            "le" => Operator::Le,
            "contains" => Operator::Contains,
            _ => return None,
        })
    }
}

/// How the stored value and the literal are interpreted before comparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Datatype {
    Numeric,
    Boolean,
    #[default]
    String,
    Date,
    Regex,
}

impl Datatype {
    pub fn name(self) -> &'static str {
        match self {
            Datatype::Numeric => "numeric",
            Datatype::Boolean => "boolean",
            Datatype::String => "string",
            Datatype::Date => "date",
            Datatype::Regex => "regex",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        Some(match s {
            "numeric" => Datatype::Numeric,
            "boolean" => Datatype::Boolean,
            "string" => Datatype::String,
            "date" => Datatype::Date,
            "regex" => Datatype::Regex,
            _ => return None,
        })
    }

    /// Operators that make sense for this datatype.
    pub fn allows(self, op: Operator) -> bool {
        match self {
            Datatype::Numeric | Datatype::Date => !matches!(op, Operator::Contains),
            Datatype::Boolean | Datatype::Regex => matches!(op, Operator::Eq | Operator::Ne),
            Datatype::String => matches!(op, Operator::Eq | Operator::Ne | Operator::Contains),
        }
    }
}

/// One client-state predicate, e.g. `visits > 3` or `last_seen < "7 days ago"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageCondition {
    pub key: String,
    pub operator: Operator,
    pub value: String,
    #[serde(default)]
    pub datatype: Datatype,
}

impl StorageCondition {
    pub fn new(key: impl Into<String>, operator: Operator, value: impl Into<String>, datatype: Datatype) -> Self {
        Self { key: key.into(), operator, value: value.into(), datatype }
    }
}

/// An authored call-to-action block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtaRecord {
    pub id: CtaId,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub content_type_targets: BTreeSet<String>,
    #[serde(default)]
    pub taxonomy_mode: TaxonomyMode,
    #[serde(default)]
    pub taxonomy_targets: BTreeSet<TermId>,
    #[serde(default)]
    pub storage_conditions: Vec<StorageCondition>,
    #[serde(default)]
    pub insertion_direction: Direction,
    #[serde(default = "default_position")]
    pub insertion_position: u32,
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
    #[serde(default)]
    pub fallback_id: Option<CtaId>,
}

fn default_position() -> u32 {
    1
}

impl CtaRecord {
    /// An active, untargeted, unconditional record inserted after the first
    /// element. Handy as a starting point for builders and tests.
    pub fn new(id: u64, content: impl Into<String>) -> Self {
        Self {
            id: CtaId(id),
            content: content.into(),
            status: Status::Active,
            role: Role::Primary,
            content_type_targets: BTreeSet::new(),
            taxonomy_mode: TaxonomyMode::Include,
            taxonomy_targets: BTreeSet::new(),
            storage_conditions: Vec::new(),
            insertion_direction: Direction::Forward,
            insertion_position: default_position(),
            overflow_policy: OverflowPolicy::Skip,
            fallback_id: None,
        }
    }

    pub fn with_fallback(mut self, id: u64) -> Self {
        self.fallback_id = Some(CtaId(id));
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_condition(mut self, condition: StorageCondition) -> Self {
        self.storage_conditions.push(condition);
        self
    }

    pub fn with_placement(mut self, direction: Direction, position: u32, overflow: OverflowPolicy) -> Self {
        self.insertion_direction = direction;
        self.insertion_position = position;
        self.overflow_policy = overflow;
        self
    }

    pub fn with_content_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.content_type_targets = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_taxonomy(mut self, mode: TaxonomyMode, terms: impl IntoIterator<Item = u64>) -> Self {
        self.taxonomy_mode = mode;
        self.taxonomy_targets = terms.into_iter().map(TermId).collect();
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }
}

/// What the host knows about the document being rendered.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentContext {
    pub content_type: String,
    #[serde(default)]
    pub taxonomy_terms: BTreeSet<TermId>,
    /// Per-document "no CTAs here" switch.
    #[serde(default)]
    pub opt_out: bool,
}

impl DocumentContext {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self { content_type: content_type.into(), taxonomy_terms: BTreeSet::new(), opt_out: false }
    }

    pub fn with_terms(mut self, terms: impl IntoIterator<Item = u64>) -> Self {
        self.taxonomy_terms = terms.into_iter().map(TermId).collect();
        self
    }

    pub fn opted_out(mut self) -> Self {
        self.opt_out = true;
        self
    }
}
