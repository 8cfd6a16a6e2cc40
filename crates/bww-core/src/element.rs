//! Contract between the binding layer and the host's UI elements.
//!
//! The reactive store never touches a real document. A host presentation
//! layer hands it [`Element`] handles; the store reads and writes them through
//! the kind-specific rules in [`extract_value`] and [`inject_value`], and
//! subscribes to their [`DomEvent`]s.
//!
//! # Kind mapping
//!
//! | Kind        | Extracted value                          | Injection                         | Events            |
//! |-------------|------------------------------------------|-----------------------------------|-------------------|
//! | `Checkbox`  | `Bool(checked)`                          | `checked = truthy(value)`         | `change`          |
//! | `Radio`     | `Text(value)` if checked, else `""`      | `checked = (value == String(v))`  | `change`          |
//! | `Number`    | `parseFloat(value)`, `0` when falsy      | `value = String(v)`               | `input`           |
//! | `Range`     | `parseFloat(value)`, `0` when falsy      | `value = String(v)`               | `input`, `change` |
//! | `TextField` | `value`, or text content when empty      | `value = String(v)`               | `input`           |
//! | `Content`   | `value`, or text content when empty      | `text_content = String(v)`        | none              |
//!
//! `null` and `undefined` inject as the empty string.

use std::fmt;
use std::rc::Rc;

use crate::value::{Value, parse_float};

/// Callback installed on an element for one event type.
pub type Listener = Rc<dyn Fn()>;

/// How an element displays and reports its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Checkbox,
    Radio,
    Number,
    Range,
    /// Free-text form control (`<input>` of any other type, `<textarea>`).
    TextField,
    /// Any non-form element; its value is its text content.
    Content,
}

impl ElementKind {
    /// Classify an element from its tag name and `type` attribute.
    ///
    /// The `type` wins when it names a special kind; otherwise `input` and
    /// `textarea` tags (case-insensitive) are text fields.
    #[must_use]
    pub fn classify(tag: &str, input_type: Option<&str>) -> Self {
        match input_type.map(str::to_ascii_lowercase).as_deref() {
            Some("checkbox") => Self::Checkbox,
            Some("radio") => Self::Radio,
            Some("number") => Self::Number,
            Some("range") => Self::Range,
            _ if tag.eq_ignore_ascii_case("input") || tag.eq_ignore_ascii_case("textarea") => {
                Self::TextField
            }
            _ => Self::Content,
        }
    }

    /// Events whose firing should copy the element's value into the store.
    #[must_use]
    pub const fn listener_events(self) -> &'static [DomEvent] {
        match self {
            Self::Checkbox | Self::Radio => &[DomEvent::Change],
            Self::Range => &[DomEvent::Input, DomEvent::Change],
            Self::Number | Self::TextField => &[DomEvent::Input],
            Self::Content => &[],
        }
    }
}

/// UI events the binding layer listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomEvent {
    Input,
    Change,
}

impl DomEvent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Change => "change",
        }
    }
}

impl fmt::Display for DomEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A handle to a host UI element.
///
/// Setters take `&self`: handles are shared references into a document the
/// host owns, so implementations use interior mutability.
pub trait Element {
    fn kind(&self) -> ElementKind;
    fn checked(&self) -> bool;
    fn set_checked(&self, checked: bool);
    /// The form-control value; empty for elements that have none.
    fn value(&self) -> String;
    fn set_value(&self, value: &str);
    fn text_content(&self) -> String;
    fn set_text_content(&self, text: &str);
    fn attribute(&self, name: &str) -> Option<String>;
    /// Install `listener` for `event`. Listeners are never removed.
    fn add_listener(&self, event: DomEvent, listener: Listener);
}

/// Element lookup supplied by the host.
pub trait ElementScope {
    /// Every element matching `selector`, in document order.
    fn query_selector_all(&self, selector: &str) -> Vec<Rc<dyn Element>>;

    /// Every element carrying attribute `name`, in document order.
    fn query_attribute(&self, name: &str) -> Vec<Rc<dyn Element>> {
        self.query_selector_all(&format!("[{name}]"))
    }
}

/// Read the value an element currently displays.
#[must_use]
pub fn extract_value(element: &dyn Element) -> Value {
    match element.kind() {
        ElementKind::Checkbox => Value::Bool(element.checked()),
        ElementKind::Radio => {
            if element.checked() {
                Value::Text(element.value())
            } else {
                Value::Text(String::new())
            }
        }
        ElementKind::Number | ElementKind::Range => {
            let parsed = parse_float(&element.value())
                .filter(|n| *n != 0.0 && !n.is_nan())
                .unwrap_or(0.0);
            Value::Number(parsed)
        }
        ElementKind::TextField | ElementKind::Content => {
            let value = element.value();
            if value.is_empty() {
                Value::Text(element.text_content())
            } else {
                Value::Text(value)
            }
        }
    }
}

/// Write `value` into an element using its kind's convention.
pub fn inject_value(element: &dyn Element, value: &Value) {
    match element.kind() {
        ElementKind::Checkbox => element.set_checked(value.is_truthy()),
        ElementKind::Radio => element.set_checked(element.value() == value.to_string()),
        ElementKind::Number | ElementKind::Range | ElementKind::TextField => {
            element.set_value(&display_text(value));
        }
        ElementKind::Content => element.set_text_content(&display_text(value)),
    }
}

/// Inject `value` only when the element does not already display it.
///
/// Returns whether the element was touched.
pub fn sync_element(element: &dyn Element, value: &Value) -> bool {
    if extract_value(element).strict_eq(value) {
        return false;
    }
    inject_value(element, value);
    true
}

fn display_text(value: &Value) -> String {
    match value {
        Value::Undefined | Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockElement;

    #[test]
    fn classify_prefers_type_attribute() {
        assert_eq!(ElementKind::classify("input", Some("checkbox")), ElementKind::Checkbox);
        assert_eq!(ElementKind::classify("INPUT", Some("RADIO")), ElementKind::Radio);
        assert_eq!(ElementKind::classify("input", Some("range")), ElementKind::Range);
        assert_eq!(ElementKind::classify("input", Some("email")), ElementKind::TextField);
        assert_eq!(ElementKind::classify("textarea", None), ElementKind::TextField);
        assert_eq!(ElementKind::classify("span", None), ElementKind::Content);
    }

    #[test]
    fn listener_events_per_kind() {
        assert_eq!(ElementKind::Checkbox.listener_events(), &[DomEvent::Change]);
        assert_eq!(
            ElementKind::Range.listener_events(),
            &[DomEvent::Input, DomEvent::Change]
        );
        assert_eq!(ElementKind::Number.listener_events(), &[DomEvent::Input]);
        assert!(ElementKind::Content.listener_events().is_empty());
    }

    #[test]
    fn extract_checkbox_and_radio() {
        let checkbox = MockElement::checkbox(true);
        assert_eq!(extract_value(&*checkbox), Value::Bool(true));

        let radio = MockElement::radio("red", false);
        assert_eq!(extract_value(&*radio), Value::from(""));
        radio.set_checked(true);
        assert_eq!(extract_value(&*radio), Value::from("red"));
    }

    #[test]
    fn extract_number_falls_back_to_zero() {
        let number = MockElement::number("12.5abc");
        assert_eq!(extract_value(&*number), Value::from(12.5));
        number.set_value("abc");
        assert_eq!(extract_value(&*number), Value::from(0));
        number.set_value("-0");
        let zero = extract_value(&*number).as_f64().expect("number");
        assert!(zero == 0.0 && zero.is_sign_positive());
    }

    #[test]
    fn extract_text_prefers_value_then_content() {
        let input = MockElement::text_input("hello");
        assert_eq!(extract_value(&*input), Value::from("hello"));

        let span = MockElement::content("span", "shown");
        assert_eq!(extract_value(&*span), Value::from("shown"));
    }

    #[test]
    fn inject_per_kind() {
        let checkbox = MockElement::checkbox(false);
        inject_value(&*checkbox, &Value::from("yes"));
        assert!(checkbox.checked());

        let radio = MockElement::radio("2", false);
        inject_value(&*radio, &Value::from(2));
        assert!(radio.checked());
        inject_value(&*radio, &Value::from(3));
        assert!(!radio.checked());

        let range = MockElement::range("0");
        inject_value(&*range, &Value::from(42));
        assert_eq!(range.value(), "42");

        let span = MockElement::content("span", "");
        inject_value(&*span, &Value::Undefined);
        assert_eq!(span.text_content(), "");
        inject_value(&*span, &Value::from(true));
        assert_eq!(span.text_content(), "true");
    }

    #[test]
    fn sync_skips_equal_display() {
        let number = MockElement::number("5");
        assert!(!sync_element(&*number, &Value::from(5)));
        assert_eq!(number.mutation_count(), 0);

        assert!(sync_element(&*number, &Value::from(6)));
        assert_eq!(number.mutation_count(), 1);
        assert_eq!(number.value(), "6");
    }
}
