//! Parent-linked data scopes
//!
//! Child scopes shadow names from their parents but never write to them; each
//! `{:each}` iteration, `<:data>` result and component call gets its own.

use indexmap::IndexMap;

use super::value::Value;

#[derive(Debug)]
enum Bindings<'a> {
    /// Root scope: the caller's context, looked up as an object
    Borrowed(&'a Value),
    Owned(IndexMap<String, Value>),
}

#[derive(Debug)]
pub struct Scope<'a> {
    bindings: Bindings<'a>,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    pub fn root(context: &'a Value) -> Self {
        Self {
            bindings: Bindings::Borrowed(context),
            parent: None,
        }
    }

    /// New scope layered over this one
    pub fn child(&'a self, bindings: IndexMap<String, Value>) -> Scope<'a> {
        Scope {
            bindings: Bindings::Owned(bindings),
            parent: Some(self),
        }
    }

    /// Innermost binding for `name`
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        let own = match &self.bindings {
            Bindings::Borrowed(context) => context.as_object().and_then(|map| map.get(name)),
            Bindings::Owned(map) => map.get(name),
        };
        own.or_else(|| self.parent.and_then(|parent| parent.lookup(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_child_shadows_parent() {
        let context = Value::from(json!({"item": "outer", "title": "t"}));
        let root = Scope::root(&context);

        let mut bindings = IndexMap::new();
        bindings.insert("item".to_string(), Value::from("inner"));
        let child = root.child(bindings);

        assert_eq!(child.lookup("item"), Some(&Value::from("inner")));
        assert_eq!(child.lookup("title"), Some(&Value::from("t")));
        assert_eq!(root.lookup("item"), Some(&Value::from("outer")));
    }

    #[test]
    fn test_missing_and_non_object_root() {
        let context = Value::from(json!([1, 2]));
        let root = Scope::root(&context);
        assert_eq!(root.lookup("anything"), None);
    }
}
