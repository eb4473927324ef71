use std::any::TypeId;
use std::fmt;
use std::rc::Rc;
use std::sync::LazyLock;

use regex::Regex;

use super::tree::Node;
use crate::operation::Operation;

static SELECT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(select|columns|column|distinct|count|count_distinct|min|max|sum|sum_distinct|avg|avg_distinct)$",
    )
    .expect("valid select regex")
});
static WHERE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(where|or_where|and_where|find_\w+)").expect("valid where regex"));
static ON_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(on|or_on|and_on)").expect("valid on regex"));
static ORDER_BY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"order_by").expect("valid order by regex"));
static JOIN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(join|join_raw|join_related)$").expect("valid join regex"));
static FROM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(from|into|table)$").expect("valid from regex"));
static RETURNING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"returning").expect("valid returning regex"));

/// Picks operations of a builder by name, name pattern, type or predicate.
#[derive(Clone)]
pub enum Selector {
    All,
    Name(String),
    Regex(Regex),
    /// Operations that are, or delegate to, the given type
    Kind(TypeId),
    /// Only sees operations that are not running a hook at the moment
    Predicate(Rc<dyn Fn(&dyn Operation) -> bool>),
}

impl Selector {
    pub fn select() -> Self {
        Selector::Regex(SELECT_REGEX.clone())
    }

    pub fn where_() -> Self {
        Selector::Regex(WHERE_REGEX.clone())
    }

    pub fn on() -> Self {
        Selector::Regex(ON_REGEX.clone())
    }

    pub fn order_by() -> Self {
        Selector::Regex(ORDER_BY_REGEX.clone())
    }

    pub fn join() -> Self {
        Selector::Regex(JOIN_REGEX.clone())
    }

    pub fn from() -> Self {
        Selector::Regex(FROM_REGEX.clone())
    }

    pub fn returning() -> Self {
        Selector::Regex(RETURNING_REGEX.clone())
    }

    pub fn kind<T: Operation>() -> Self {
        Selector::Kind(TypeId::of::<T>())
    }

    pub fn predicate(f: impl Fn(&dyn Operation) -> bool + 'static) -> Self {
        Selector::Predicate(Rc::new(f))
    }

    pub(crate) fn matches(&self, node: &Node) -> bool {
        match self {
            Selector::All => true,
            Selector::Name(name) => node.name == name.as_str(),
            Selector::Regex(regex) => regex.is_match(&node.name),
            Selector::Kind(kind) => node.kinds.contains(kind),
            Selector::Predicate(f) => node.op().is_some_and(|op| f(op)),
        }
    }
}

impl From<&str> for Selector {
    fn from(name: &str) -> Self {
        Selector::Name(name.to_string())
    }
}

impl From<String> for Selector {
    fn from(name: String) -> Self {
        Selector::Name(name)
    }
}

impl From<Regex> for Selector {
    fn from(regex: Regex) -> Self {
        Selector::Regex(regex)
    }
}

impl From<bool> for Selector {
    /// `true` selects everything, `false` nothing.
    fn from(all: bool) -> Self {
        if all {
            Selector::All
        } else {
            Selector::predicate(|_| false)
        }
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::All => f.write_str("All"),
            Selector::Name(name) => f.debug_tuple("Name").field(name).finish(),
            Selector::Regex(regex) => f.debug_tuple("Regex").field(&regex.as_str()).finish(),
            Selector::Kind(kind) => f.debug_tuple("Kind").field(kind).finish(),
            Selector::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}
