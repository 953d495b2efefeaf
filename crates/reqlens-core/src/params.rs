//! Route parameters injected by a router
//!
//! Most routes carry one to four captures, so the pairs live inline in a
//! `SmallVec` and only spill to the heap for unusually deep routes.

use serde_json::{Map, Value};
use smallvec::SmallVec;

/// Captures stored inline before spilling to the heap
pub const STACK_PARAMS_CAPACITY: usize = 4;

/// Ordered route captures, `name -> value`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteParams {
    inner: SmallVec<[(String, Value); STACK_PARAMS_CAPACITY]>,
}

impl RouteParams {
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: SmallVec::new(),
        }
    }

    /// Set a capture, replacing an earlier value under the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.inner.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = value,
            None => self.inner.push((name, value)),
        }
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.inner.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    #[inline]
    pub fn contains_key(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k == name)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Captures as a JSON object, in insertion order.
    pub fn to_map(&self) -> Map<String, Value> {
        self.inner.iter().cloned().collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RouteParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = RouteParams::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

impl From<Map<String, Value>> for RouteParams {
    fn from(map: Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

impl<'a> IntoIterator for &'a RouteParams {
    type Item = &'a (String, Value);
    type IntoIter = std::slice::Iter<'a, (String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}
