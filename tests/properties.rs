//! Property tests for detection, conversion and admission.

use std::collections::BTreeMap;

use extproc_filters::admission::{check, AdmissionDecision};
use extproc_filters::convert::{self, xml};
use extproc_filters::{detect, FilterError, Format, StructuredValue};
use proptest::prelude::*;

fn arb_json() -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::Bool),
        any::<i64>().prop_map(|n| serde_json::json!(n)),
        "[a-zA-Z0-9 <>&\"]{0,12}".prop_map(serde_json::Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| serde_json::Value::Object(m.into_iter().collect())),
        ]
    })
}

#[derive(Debug, Clone)]
struct Element {
    name: String,
    attrs: BTreeMap<String, String>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn render(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (k, v) in &self.attrs {
            out.push_str(&format!(" {}=\"{}\"", k, v));
        }
        if self.text.is_empty() && self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        out.push_str(&self.text);
        for child in &self.children {
            child.render(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn arb_element() -> impl Strategy<Value = Element> {
    let leaf = (
        "[a-z][a-z0-9]{0,5}",
        prop::collection::btree_map("[a-z]{1,4}", "[a-z0-9 ]{0,6}", 0..2),
        "[a-zA-Z0-9 ]{0,8}",
    )
        .prop_map(|(name, attrs, text)| Element {
            name,
            attrs,
            text,
            children: Vec::new(),
        });
    leaf.prop_recursive(3, 16, 3, |inner| {
        (
            "[a-z][a-z0-9]{0,5}",
            prop::collection::vec(inner, 0..3),
        )
            .prop_map(|(name, children)| Element {
                name,
                attrs: BTreeMap::new(),
                text: String::new(),
                children,
            })
    })
}

proptest! {
    #[test]
    fn valid_json_is_detected_as_json(value in arb_json()) {
        let body = serde_json::to_vec(&value).unwrap();
        prop_assert_eq!(detect(&body).unwrap(), Format::Json);
    }

    #[test]
    fn well_formed_xml_is_detected_as_xml(root in arb_element()) {
        let mut body = String::new();
        root.render(&mut body);
        prop_assert_eq!(detect(body.as_bytes()).unwrap(), Format::Xml);
    }

    #[test]
    fn plain_text_is_unknown(text in "[a-z ]{1,30}") {
        prop_assume!(serde_json::from_str::<serde::de::IgnoredAny>(&text).is_err());
        prop_assert!(matches!(detect(text.as_bytes()), Err(FilterError::UnknownFormat)));
    }

    #[test]
    fn flat_object_keeps_names_and_text(
        fields in prop::collection::btree_map("[a-z][a-z0-9_]{0,7}", "[a-zA-Z0-9]{1,10}", 1..8)
    ) {
        let object: serde_json::Map<_, _> = fields
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        let body = serde_json::to_vec(&object).unwrap();
        let value = convert::to_structured(&body, Format::Json).unwrap();
        let out = convert::from_structured(&value, Format::Xml).unwrap();

        let doc = xml::read(&out).unwrap();
        let doc = doc.as_mapping().unwrap();
        let elements = if fields.len() == 1 {
            doc.clone()
        } else {
            doc.get(xml::DOC_ROOT).and_then(StructuredValue::as_mapping).unwrap().clone()
        };
        prop_assert_eq!(elements.len(), fields.len());
        for (key, text) in &fields {
            prop_assert_eq!(elements.get(key).and_then(StructuredValue::as_str), Some(text.as_str()));
        }
    }

    #[test]
    fn admission_boundaries(limit in 0u64..u64::MAX) {
        prop_assert_eq!(check(Some(limit), limit), AdmissionDecision::Forward);
        let over_limit_rejected = matches!(
            check(Some(limit + 1), limit),
            AdmissionDecision::Reject { status: 413, .. }
        );
        prop_assert!(over_limit_rejected);
        let missing_rejected = matches!(check(None, limit), AdmissionDecision::Reject { status: 413, .. });
        prop_assert!(missing_rejected);
    }
}
