//! Request-scoped, typed key/value carrier.
//!
//! A [`Context`] travels with every [`Request`](crate::Request). Middleware
//! derives a child context with [`Context::with_value`] and hands the request
//! on; the parent is never mutated, so a value set further down the chain is
//! invisible to everything above it.
//!
//! Keys are *types*, not strings. Two collaborators that both want to store a
//! "logger" cannot clash unless they name the very same Rust type:
//!
//! ```rust
//! use reqlog::context::{Context, Key};
//!
//! struct Tenant;
//! impl Key for Tenant {
//!     type Value = String;
//! }
//!
//! let root = Context::new();
//! let child = root.with_value::<Tenant>("acme".to_owned());
//!
//! assert_eq!(child.value::<Tenant>().map(String::as_str), Some("acme"));
//! assert!(root.value::<Tenant>().is_none());
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A context key. The implementing type is the key; `Value` is what it maps to.
///
/// Keep key types private to your module to make the slot unreachable from
/// anywhere else.
pub trait Key: 'static {
    type Value: Send + Sync + 'static;
}

/// An immutable chain of typed values.
///
/// Cloning is one `Arc` increment. Lookups walk from the newest value to the
/// oldest, so a child shadows any value its ancestors stored under the same
/// key.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Node>>,
}

struct Node {
    key: TypeId,
    value: Box<dyn Any + Send + Sync>,
    parent: Option<Arc<Node>>,
}

impl Context {
    /// An empty context.
    pub fn new() -> Self {
        Self { head: None }
    }

    /// Returns a child context carrying `value` under `K`.
    pub fn with_value<K: Key>(&self, value: K::Value) -> Self {
        let node = Node {
            key: TypeId::of::<K>(),
            value: Box::new(value),
            parent: self.head.clone(),
        };
        Self { head: Some(Arc::new(node)) }
    }

    /// Returns the nearest value stored under `K`, if any.
    pub fn value<K: Key>(&self) -> Option<&K::Value> {
        let key = TypeId::of::<K>();
        let mut cursor = self.head.as_deref();
        while let Some(node) = cursor {
            if node.key == key {
                return node.value.downcast_ref::<K::Value>();
            }
            cursor = node.parent.as_deref();
        }
        None
    }

    fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cursor = self.head.as_deref();
        while let Some(node) = cursor {
            depth += 1;
            cursor = node.parent.as_deref();
        }
        depth
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("values", &self.depth()).finish()
    }
}
