//! Append-only memoization for expression parsers.
//!
//! A cache is an ordinary value owned by whoever embeds the parsers. Reads
//! hand out clones and entries are never replaced or evicted.

use std::cell::RefCell;
use std::fmt;

use hashbrown::HashMap;

use crate::field_expression::FieldExpression;
use crate::relation::RelationExpression;

/// How many entries a [`ParseCache`] admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    #[default]
    Unbounded,
    /// Stop admitting new entries once `n` are stored
    Bounded(usize),
}

pub struct ParseCache<T> {
    entries: RefCell<HashMap<String, T>>,
    policy: CachePolicy,
}

impl<T: Clone> ParseCache<T> {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
            policy,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(CachePolicy::Unbounded)
    }

    pub fn bounded(capacity: usize) -> Self {
        Self::new(CachePolicy::Bounded(capacity))
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.entries.borrow().get(key).cloned()
    }

    /// Returns a clone of the cached value for `key`, parsing and storing it
    /// first on a miss. Failed parses are not cached.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: &str,
        parse: impl FnOnce(&str) -> Result<T, E>,
    ) -> Result<T, E> {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }

        let parsed = parse(key)?;
        let mut entries = self.entries.borrow_mut();
        let admit = match self.policy {
            CachePolicy::Unbounded => true,
            CachePolicy::Bounded(capacity) => entries.len() < capacity,
        };
        if admit {
            entries.insert(key.to_owned(), parsed.clone());
        }
        Ok(parsed)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl<T: Clone> Default for ParseCache<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T> fmt::Debug for ParseCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseCache")
            .field("policy", &self.policy)
            .field("len", &self.entries.borrow().len())
            .finish()
    }
}

/// The parse caches shared by a query and every query derived from it.
#[derive(Debug, Default)]
pub struct ExpressionCaches {
    pub fields: ParseCache<FieldExpression>,
    pub relations: ParseCache<RelationExpression>,
}

impl ExpressionCaches {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            fields: ParseCache::new(policy),
            relations: ParseCache::new(policy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn hits_do_not_reparse() {
        let cache = ParseCache::<String>::unbounded();
        let calls = Cell::new(0);
        let parse = |s: &str| -> Result<String, ()> {
            calls.set(calls.get() + 1);
            Ok(s.to_uppercase())
        };

        assert_eq!(cache.get_or_try_insert_with("a", parse).unwrap(), "A");
        assert_eq!(cache.get_or_try_insert_with("a", parse).unwrap(), "A");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn bounded_cache_stops_admitting() {
        let cache = ParseCache::<usize>::bounded(1);
        cache.get_or_try_insert_with("a", |s| Ok::<_, ()>(s.len())).unwrap();
        cache.get_or_try_insert_with("bb", |s| Ok::<_, ()>(s.len())).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("bb"), None);
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = ParseCache::<usize>::unbounded();
        assert!(cache.get_or_try_insert_with("x", |_| Err::<usize, _>("bad")).is_err());
        assert!(cache.is_empty());
    }
}
