//! In-memory elements for exercising bindings without a browser.
//!
//! [`MockElement`] records every programmatic mutation made through the
//! [`Element`] trait, so tests can assert that a push was (or was not)
//! performed. User interaction helpers ([`MockElement::type_text`],
//! [`MockElement::click`]) change the element the way a person would and then
//! fire the matching events; they are not recorded as mutations.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::element::{DomEvent, Element, ElementKind, ElementScope, Listener};

/// A programmatic change made through the [`Element`] trait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Checked(bool),
    Value(String),
    TextContent(String),
}

/// A scriptable element handle.
pub struct MockElement {
    tag: String,
    kind: ElementKind,
    attributes: RefCell<BTreeMap<String, String>>,
    checked: Cell<bool>,
    value: RefCell<String>,
    text: RefCell<String>,
    listeners: RefCell<Vec<(DomEvent, Listener)>>,
    mutations: RefCell<Vec<Mutation>>,
}

impl std::fmt::Debug for MockElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockElement")
            .field("tag", &self.tag)
            .field("kind", &self.kind)
            .field("checked", &self.checked.get())
            .field("value", &self.value.borrow())
            .field("text", &self.text.borrow())
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl MockElement {
    /// Create an element, classifying it from `tag` and `input_type`.
    #[must_use]
    pub fn new(tag: &str, input_type: Option<&str>) -> Self {
        let mut attributes = BTreeMap::new();
        if let Some(ty) = input_type {
            attributes.insert("type".to_string(), ty.to_string());
        }
        Self {
            tag: tag.to_ascii_lowercase(),
            kind: ElementKind::classify(tag, input_type),
            attributes: RefCell::new(attributes),
            checked: Cell::new(false),
            value: RefCell::new(String::new()),
            text: RefCell::new(String::new()),
            listeners: RefCell::new(Vec::new()),
            mutations: RefCell::new(Vec::new()),
        }
    }

    /// Set an attribute (builder style).
    #[must_use]
    pub fn attr(self, name: &str, value: &str) -> Self {
        self.attributes
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Set the initial value without recording a mutation.
    #[must_use]
    pub fn with_value(self, value: &str) -> Self {
        *self.value.borrow_mut() = value.to_string();
        self
    }

    /// Set the initial text content without recording a mutation.
    #[must_use]
    pub fn with_text(self, text: &str) -> Self {
        *self.text.borrow_mut() = text.to_string();
        self
    }

    /// Set the initial checked state without recording a mutation.
    #[must_use]
    pub fn with_checked(self, checked: bool) -> Self {
        self.checked.set(checked);
        self
    }

    #[must_use]
    pub fn into_rc(self) -> Rc<Self> {
        Rc::new(self)
    }

    #[must_use]
    pub fn checkbox(checked: bool) -> Rc<Self> {
        Self::new("input", Some("checkbox")).with_checked(checked).into_rc()
    }

    #[must_use]
    pub fn radio(value: &str, checked: bool) -> Rc<Self> {
        Self::new("input", Some("radio"))
            .with_value(value)
            .with_checked(checked)
            .into_rc()
    }

    #[must_use]
    pub fn number(value: &str) -> Rc<Self> {
        Self::new("input", Some("number")).with_value(value).into_rc()
    }

    #[must_use]
    pub fn range(value: &str) -> Rc<Self> {
        Self::new("input", Some("range")).with_value(value).into_rc()
    }

    #[must_use]
    pub fn text_input(value: &str) -> Rc<Self> {
        Self::new("input", Some("text")).with_value(value).into_rc()
    }

    #[must_use]
    pub fn content(tag: &str, text: &str) -> Rc<Self> {
        Self::new(tag, None).with_text(text).into_rc()
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Programmatic mutations recorded so far.
    #[must_use]
    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.borrow().clone()
    }

    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.mutations.borrow().len()
    }

    pub fn clear_mutations(&self) {
        self.mutations.borrow_mut().clear();
    }

    /// Number of installed listeners for `event`.
    #[must_use]
    pub fn listener_count(&self, event: DomEvent) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|(e, _)| *e == event)
            .count()
    }

    /// Invoke every listener registered for `event`, in installation order.
    pub fn dispatch(&self, event: DomEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(e, _)| *e == event)
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in listeners {
            listener();
        }
    }

    /// Replace the value as a user would, then fire `input`.
    pub fn type_text(&self, text: &str) {
        *self.value.borrow_mut() = text.to_string();
        self.dispatch(DomEvent::Input);
    }

    /// Drag a range (or edit a number) and release: fires `input` then `change`.
    pub fn slide_to(&self, value: &str) {
        *self.value.borrow_mut() = value.to_string();
        self.dispatch(DomEvent::Input);
        self.dispatch(DomEvent::Change);
    }

    /// Click a checkbox (toggles) or radio (selects), then fire `change`.
    pub fn click(&self) {
        match self.kind {
            ElementKind::Checkbox => self.checked.set(!self.checked.get()),
            ElementKind::Radio => self.checked.set(true),
            _ => {}
        }
        self.dispatch(DomEvent::Change);
    }

    fn record(&self, mutation: Mutation) {
        self.mutations.borrow_mut().push(mutation);
    }

    fn matches(&self, selector: &str) -> bool {
        let selector = selector.trim();
        if let Some(id) = selector.strip_prefix('#') {
            return self.attributes.borrow().get("id").is_some_and(|v| v == id);
        }
        if let Some(class) = selector.strip_prefix('.') {
            return self
                .attributes
                .borrow()
                .get("class")
                .is_some_and(|v| v.split_whitespace().any(|c| c == class));
        }
        if let Some(inner) = selector
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            return match inner.split_once('=') {
                Some((name, expected)) => {
                    let expected = expected.trim_matches(|c| c == '"' || c == '\'');
                    self.attributes
                        .borrow()
                        .get(name.trim())
                        .is_some_and(|v| v == expected)
                }
                None => self.attributes.borrow().contains_key(inner.trim()),
            };
        }
        self.tag.eq_ignore_ascii_case(selector)
    }
}

impl Element for MockElement {
    fn kind(&self) -> ElementKind {
        self.kind
    }

    fn checked(&self) -> bool {
        self.checked.get()
    }

    fn set_checked(&self, checked: bool) {
        self.checked.set(checked);
        self.record(Mutation::Checked(checked));
    }

    fn value(&self) -> String {
        self.value.borrow().clone()
    }

    fn set_value(&self, value: &str) {
        *self.value.borrow_mut() = value.to_string();
        self.record(Mutation::Value(value.to_string()));
    }

    fn text_content(&self) -> String {
        self.text.borrow().clone()
    }

    fn set_text_content(&self, text: &str) {
        *self.text.borrow_mut() = text.to_string();
        self.record(Mutation::TextContent(text.to_string()));
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.borrow().get(name).cloned()
    }

    fn add_listener(&self, event: DomEvent, listener: Listener) {
        self.listeners.borrow_mut().push((event, listener));
    }
}

/// A flat, ordered collection of [`MockElement`]s acting as a document.
///
/// Selectors support `tag`, `#id`, `.class`, `[attr]` and `[attr=value]`.
#[derive(Debug, Default)]
pub struct MockDocument {
    elements: Vec<Rc<MockElement>>,
}

impl MockDocument {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element and return a handle to it.
    pub fn push(&mut self, element: MockElement) -> Rc<MockElement> {
        let element = Rc::new(element);
        self.elements.push(Rc::clone(&element));
        element
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl ElementScope for MockDocument {
    fn query_selector_all(&self, selector: &str) -> Vec<Rc<dyn Element>> {
        self.elements
            .iter()
            .filter(|e| e.matches(selector))
            .map(|e| Rc::clone(e) as Rc<dyn Element>)
            .collect()
    }
}
