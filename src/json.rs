// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! JSON representation of element trees.
//!
//! An element becomes an object holding its payload's fields plus a `"children"` array with the
//! documents of its children. Payloads that do not serialize to an object are kept under
//! `"value"`. The root has no payload, so its document is only the `"children"` array.
//!
//! # Examples
//!
//! ```json
//! {
//!   "name": "Ada",
//!   "children": [
//!     { "name": "Byron", "children": [] }
//!   ]
//! }
//! ```
//!
//! A tree is only rendered whole: if any non-root element of it has no payload, or a payload
//! fails to serialize, the result is the empty document `{}`.
use crate::element::Element;
use serde::Serialize;
use serde_json::{Map, Value};

impl<I, P> Element<I, P>
where
    I: Clone + Eq,
    P: Serialize,
{
    /// Renders the subtree as a JSON document, or `{}` if it cannot be rendered whole.
    ///
    /// ```rust
    /// # use arbor::Element;
    /// # use serde_json::json;
    /// let mut top = Element::new(1u32, None, Some(json!({ "name": "Ada" }))).unwrap();
    /// top.add_child(Element::new(2, None, Some(json!("Byron"))).unwrap());
    /// assert_eq!(
    ///     top.to_json(),
    ///     json!({ "name": "Ada", "children": [{ "value": "Byron", "children": [] }] })
    /// );
    /// ```
    pub fn to_json(&self) -> Value {
        document(self).unwrap_or_else(|| {
            tracing::debug!("element tree has missing or unserializable payloads, rendering {{}}");
            Value::Object(Map::new())
        })
    }
}

/// Converts an [`Element`] tree to a `serde_json::Value`.
impl<I, P> From<&Element<I, P>> for Value
where
    I: Clone + Eq,
    P: Serialize,
{
    fn from(element: &Element<I, P>) -> Self {
        element.to_json()
    }
}

fn document<I, P>(element: &Element<I, P>) -> Option<Value>
where
    I: Clone + Eq,
    P: Serialize,
{
    let mut doc = if element.is_root() {
        Map::new()
    } else {
        match serde_json::to_value(element.payload()?).ok()? {
            Value::Object(fields) => fields,
            other => Map::from_iter([("value".to_owned(), other)]),
        }
    };
    let children = element
        .children()
        .iter()
        .map(document)
        .collect::<Option<Vec<_>>>()?;
    doc.insert("children".to_owned(), Value::Array(children));
    Some(Value::Object(doc))
}

#[cfg(test)]
mod tests {
    use crate::{Element, Manager, Payload, triples};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, ::serde::Serialize)]
    struct Person {
        name: String,
        age: u8,
    }

    impl Payload for Person {}

    fn person(name: &str, age: u8) -> Person {
        Person {
            name: name.to_owned(),
            age,
        }
    }

    #[test]
    fn payload_fields_and_children() {
        let mut manager = Manager::<u32, Person>::new();
        manager
            .transaction_mut()
            .initialize_session(
                "people",
                triples![
                    (1, None, person("Ada", 36)),
                    (2, Some(1), person("Byron", 8)),
                ],
            )
            .unwrap();

        assert_eq!(
            manager.root().unwrap().to_json(),
            json!({
                "children": [{
                    "name": "Ada",
                    "age": 36,
                    "children": [{ "name": "Byron", "age": 8, "children": [] }]
                }]
            })
        );
    }

    #[test]
    fn missing_payload_anywhere_gives_the_empty_document() {
        let mut top = Element::new(1u32, None, Some(person("Ada", 36))).unwrap();
        let mut mid = Element::new(2, None, Some(person("Byron", 8))).unwrap();
        mid.add_child(Element::new(3, None, None).unwrap());
        top.add_child(mid);

        assert_eq!(top.to_json(), json!({}));
        assert_eq!(serde_json::Value::from(&top), json!({}));
    }

    #[test]
    fn empty_root_renders_no_children() {
        let manager = {
            let mut manager = Manager::<u32, Person>::new();
            manager
                .transaction_mut()
                .initialize_empty_session("empty", None)
                .unwrap();
            manager
        };
        assert_eq!(manager.root().unwrap().to_json(), json!({ "children": [] }));
    }
}
