use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

pub const DEFAULT_LOCATION: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PageKind {
    #[default]
    None,
    Dashboard,
    CustomService,
    Command,
    SystemgeConnection,
    SystemgeServer,
}

impl PageKind {
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(PageKind::None),
            1 => Some(PageKind::Dashboard),
            2 => Some(PageKind::CustomService),
            3 => Some(PageKind::Command),
            4 => Some(PageKind::SystemgeConnection),
            5 => Some(PageKind::SystemgeServer),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            PageKind::None => 0,
            PageKind::Dashboard => 1,
            PageKind::CustomService => 2,
            PageKind::Command => 3,
            PageKind::SystemgeConnection => 4,
            PageKind::SystemgeServer => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::None => "none",
            PageKind::Dashboard => "dashboard",
            PageKind::CustomService => "custom-service",
            PageKind::Command => "command",
            PageKind::SystemgeConnection => "systemge-connection",
            PageKind::SystemgeServer => "systemge-server",
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PageKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let code = match &value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        code.and_then(PageKind::from_code)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid page type: {value}")))
    }
}

/// One node of the page data tree, typed by how incremental merges treat it.
#[derive(Debug, Clone, PartialEq)]
pub enum PageField {
    Scalar(Value),
    Sequence(VecDeque<Value>),
    Mapping(BTreeMap<String, PageField>),
}

impl PageField {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) => PageField::Sequence(items.into()),
            Value::Object(map) => PageField::Mapping(mapping_from(map)),
            other => PageField::Scalar(other),
        }
    }

    fn from_value_capped(value: Value, cap: usize) -> Self {
        match value {
            Value::Array(items) => {
                let mut seq: VecDeque<Value> = items.into();
                trim_front(&mut seq, cap);
                PageField::Sequence(seq)
            }
            Value::Object(map) => {
                let mut mapping = BTreeMap::new();
                merge_mapping(&mut mapping, map, cap);
                PageField::Mapping(mapping)
            }
            other => PageField::Scalar(other),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            PageField::Scalar(value) => value.clone(),
            PageField::Sequence(items) => Value::Array(items.iter().cloned().collect()),
            PageField::Mapping(map) => Value::Object(
                map.iter()
                    .map(|(key, field)| (key.clone(), field.to_value()))
                    .collect(),
            ),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PageField::Scalar(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Merges `source` into this field:
    /// a sequence target grows by the source (array) or one element (anything
    /// else) and then keeps only its newest `cap` items; a mapping target
    /// merges key by key with an object source; every other case overwrites.
    pub fn merge(&mut self, source: Value, cap: usize) {
        match (self, source) {
            (PageField::Sequence(items), Value::Array(more)) => {
                items.extend(more);
                trim_front(items, cap);
            }
            (PageField::Sequence(items), other) => {
                items.push_back(other);
                trim_front(items, cap);
            }
            (PageField::Mapping(map), Value::Object(more)) => merge_mapping(map, more, cap),
            (slot, other) => *slot = PageField::from_value_capped(other, cap),
        }
    }
}

fn mapping_from(map: Map<String, Value>) -> BTreeMap<String, PageField> {
    map.into_iter()
        .map(|(key, value)| (key, PageField::from_value(value)))
        .collect()
}

fn merge_mapping(target: &mut BTreeMap<String, PageField>, source: Map<String, Value>, cap: usize) {
    for (key, value) in source {
        match target.get_mut(&key) {
            Some(field) => field.merge(value, cap),
            None => {
                target.insert(key, PageField::from_value_capped(value, cap));
            }
        }
    }
}

fn trim_front(items: &mut VecDeque<Value>, cap: usize) {
    let cap = cap.max(1);
    while items.len() > cap {
        items.pop_front();
    }
}

/// The page the server is currently rendering for this client, plus the
/// location the client last asked for and a page-scoped selection.
#[derive(Debug, Clone, PartialEq)]
pub struct PageState {
    kind: PageKind,
    data: BTreeMap<String, PageField>,
    location: String,
    selection: Option<String>,
}

impl PageState {
    pub fn new(location: &str) -> Self {
        Self {
            kind: PageKind::None,
            data: BTreeMap::new(),
            location: normalize_location(location),
            selection: None,
        }
    }

    pub fn kind(&self) -> PageKind {
        self.kind
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn set_location(&mut self, location: &str) {
        self.location = normalize_location(location);
    }

    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    pub fn select(&mut self, selection: Option<String>) {
        self.selection = selection;
    }

    pub fn field(&self, key: &str) -> Option<&PageField> {
        self.data.get(key)
    }

    /// Identity used to accept or reject page-scoped updates: the page's own
    /// `name` when it carries one, else the requested location.
    pub fn identity(&self) -> &str {
        self.data
            .get("name")
            .and_then(PageField::as_str)
            .unwrap_or(self.location.as_str())
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.identity() == name
    }

    /// Swaps in a new page wholesale and resets the selection.
    pub fn change(&mut self, kind: PageKind, data: Map<String, Value>) {
        self.kind = kind;
        self.data = mapping_from(data);
        self.selection = None;
    }

    /// Overwrites top-level keys. Ignored unless `name` is the active page.
    pub fn replace(&mut self, name: &str, data: Map<String, Value>) -> bool {
        if !self.is_active(name) {
            return false;
        }
        for (key, value) in data {
            self.data.insert(key, PageField::from_value(value));
        }
        true
    }

    /// Recursive merge of `data`. Ignored unless `name` is the active page.
    pub fn merge(&mut self, name: &str, data: Map<String, Value>, cap: usize) -> bool {
        if !self.is_active(name) {
            return false;
        }
        merge_mapping(&mut self.data, data, cap);
        true
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.data
                .iter()
                .map(|(key, field)| (key.clone(), field.to_value()))
                .collect(),
        )
    }
}

impl Default for PageState {
    fn default() -> Self {
        Self::new(DEFAULT_LOCATION)
    }
}

fn normalize_location(location: &str) -> String {
    let trimmed = location.trim();
    if trimmed.is_empty() {
        DEFAULT_LOCATION.to_string()
    } else {
        trimmed.to_string()
    }
}
