#![forbid(unsafe_code)]

//! Two-way synchronization between store keys and host UI elements.
//!
//! Binding an element to a key:
//!
//! 1. defines the key if it is unknown, from [`BindOptions::default_value`]
//!    or else from the value the element displays,
//! 2. pushes the key's current value into the element (skipped when the
//!    element already displays it),
//! 3. installs the listeners for the element's kind, which copy the
//!    element's value back into the store on user input.
//!
//! Pushes only touch elements whose displayed value differs, so an element
//! never receives its own input back.
//!
//! Declarative scans bind the attribute's value verbatim as the key, with no
//! trimming; an empty attribute binds the empty key.
//!
//! Listeners hold weak references to the store and the element, and check
//! that the binding still exists before writing. After `reset_key` or
//! `reset_all` they are inert.

use std::fmt;
use std::rc::Rc;

use bww_core::element::{Element, ElementScope, Listener, extract_value, sync_element};
use bww_core::Value;
use indexmap::IndexMap;

use bww_core::logging::{debug, trace};

use super::store::ReactiveStore;

/// Options for [`ReactiveStore::bind_element`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindOptions {
    /// Value to define an unknown key with, instead of the element's own.
    pub default_value: Option<Value>,
}

impl BindOptions {
    #[must_use]
    pub fn with_default(value: impl Into<Value>) -> Self {
        Self {
            default_value: Some(value.into()),
        }
    }
}

#[derive(Default)]
pub(crate) struct BindingRegistry {
    by_key: IndexMap<String, Vec<Rc<dyn Element>>>,
}

impl fmt::Debug for BindingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.by_key.iter().map(|(k, v)| (k, v.len())))
            .finish()
    }
}

impl BindingRegistry {
    /// Add `element` under `key`. Returns false if this handle is already
    /// bound to it.
    fn add(&mut self, key: &str, element: Rc<dyn Element>) -> bool {
        if self.contains(key, &*element) {
            return false;
        }
        self.by_key.entry(key.to_string()).or_default().push(element);
        true
    }

    fn contains(&self, key: &str, element: &dyn Element) -> bool {
        self.by_key.get(key).is_some_and(|bound| {
            bound
                .iter()
                .any(|e| std::ptr::addr_eq(Rc::as_ptr(e), element as *const dyn Element))
        })
    }

    fn elements(&self, key: &str) -> Vec<Rc<dyn Element>> {
        self.by_key.get(key).cloned().unwrap_or_default()
    }

    pub(crate) fn remove_key(&mut self, key: &str) -> usize {
        self.by_key.shift_remove(key).map_or(0, |bound| bound.len())
    }

    pub(crate) fn clear(&mut self) {
        self.by_key.clear();
    }

    fn count(&self, key: &str) -> usize {
        self.by_key.get(key).map_or(0, Vec::len)
    }

    pub(crate) fn total(&self) -> usize {
        self.by_key.values().map(Vec::len).sum()
    }
}

impl ReactiveStore {
    /// Bind `element` to `key`. See the module docs for the steps.
    ///
    /// Returns false, doing nothing, if this element is already bound to
    /// `key`.
    pub fn bind_element(&self, element: Rc<dyn Element>, key: &str, options: BindOptions) -> bool {
        if self.inner.bindings.borrow().contains(key, &*element) {
            trace!(key, "binding.register skipped: already bound");
            return false;
        }

        if !self.contains_key(key) {
            let initial = options
                .default_value
                .unwrap_or_else(|| extract_value(&*element));
            self.define(key, initial);
        }

        self.inner
            .bindings
            .borrow_mut()
            .add(key, Rc::clone(&element));

        let current = self.read(key);
        let pushed = sync_element(&*element, &current);
        self.install_listeners(&element, key);

        debug!(key, kind = ?element.kind(), pushed, "binding.register");
        true
    }

    /// Bind every element of `scope` matching `selector` to `key`.
    ///
    /// Returns how many elements were newly bound.
    pub fn bind_selector(
        &self,
        scope: &dyn ElementScope,
        selector: &str,
        key: &str,
        options: BindOptions,
    ) -> usize {
        let mut bound = 0;
        for element in scope.query_selector_all(selector) {
            if self.bind_element(element, key, options.clone()) {
                bound += 1;
            }
        }
        bound
    }

    /// Bind every element of `scope` carrying the model attribute to the key
    /// the attribute names, defaulting unknown keys from the element.
    ///
    /// Returns how many elements were newly bound.
    pub fn scan_declarative(&self, scope: &dyn ElementScope) -> usize {
        let attribute = self.inner.config.model_attribute.as_str();
        let mut bound = 0;
        for element in scope.query_attribute(attribute) {
            let key = element.attribute(attribute).unwrap_or_default();
            if self.bind_element(element, &key, BindOptions::default()) {
                bound += 1;
            }
        }
        debug!(attribute, bound, "binding.scan");
        bound
    }

    /// Inject `value` into every element bound to `key` that does not already
    /// display it. Returns how many elements were touched.
    pub fn push_to_elements(&self, key: &str, value: &Value) -> usize {
        let elements = self.inner.bindings.borrow().elements(key);
        let pushed = self.untracked(|| {
            elements
                .iter()
                .filter(|element| sync_element(&***element, value))
                .count()
        });
        if pushed > 0 {
            debug!(key, pushed, bound = elements.len(), "binding.push");
        }
        pushed
    }

    /// Number of elements bound to `key`.
    #[must_use]
    pub fn binding_count(&self, key: &str) -> usize {
        self.inner.bindings.borrow().count(key)
    }

    /// Whether this exact element handle is bound to `key`.
    #[must_use]
    pub fn is_bound(&self, key: &str, element: &dyn Element) -> bool {
        self.inner.bindings.borrow().contains(key, element)
    }

    fn install_listeners(&self, element: &Rc<dyn Element>, key: &str) {
        for &event in element.kind().listener_events() {
            let store = self.downgrade();
            let weak_element = Rc::downgrade(element);
            let key = key.to_string();
            let listener: Listener = Rc::new(move || {
                let (Some(store), Some(element)) = (store.upgrade(), weak_element.upgrade())
                else {
                    return;
                };
                if !store.is_bound(&key, &*element) {
                    return;
                }
                let value = extract_value(&*element);
                trace!(key = %key, event = %event, "binding.input");
                store.write(&key, value);
            });
            element.add_listener(event, listener);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
