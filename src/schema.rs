use std::collections::BTreeMap;

use crate::foundation::{
    core::{AttributeId, LabelId},
    error::{AnnotrackError, AnnotrackResult},
};

/// Input kind of an attribute, which decides how values are entered.
///
/// `Select`/`Radio` enumerate their legal values and are addressable by
/// ordinal key in the attribute navigator. `Checkbox` is a two-value
/// enumeration whose second value (the boolean negation) is materialized on
/// first use. `Number` and `Text` are free-form and never respond to ordinal
/// key input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AttributeKind {
    Select,
    Radio,
    Checkbox,
    Number,
    Text,
}

/// A recorded attribute value.
///
/// `Unset` is the explicit "no value assigned yet" state. It replaces the
/// reserved sentinel string some annotation formats keep at the head of a
/// value list, so genuine user-entered text can never collide with it, and it
/// is never selectable by ordinal key.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum AttributeValue {
    Unset,
    Bool(bool),
    Number(f64),
    Text(String),
    Choice(String),
}

impl AttributeValue {
    /// Return `true` for the explicit unset state.
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

/// Schema of a single attribute within a label.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AttributeSchema {
    pub id: AttributeId,
    pub name: String,
    pub kind: AttributeKind,
    /// Mutable attributes may change per frame; immutable ones hold a single
    /// value for the track's whole lifetime.
    pub mutable: bool,
    /// Legal values in ordinal order. Holds only real values; the unset state
    /// is carried by `allows_unset`, so ordinal 0 always addresses the first
    /// real value.
    pub values: Vec<AttributeValue>,
    /// Value assigned when a track is created.
    pub default: AttributeValue,
    /// Whether `Unset` is a legal stored state for this attribute.
    pub allows_unset: bool,
}

impl AttributeSchema {
    /// An enumerated attribute whose first real value is the default.
    pub fn select(id: AttributeId, name: impl Into<String>, mutable: bool, values: Vec<AttributeValue>) -> Self {
        let default = values.first().cloned().unwrap_or(AttributeValue::Unset);
        Self {
            id,
            name: name.into(),
            kind: AttributeKind::Select,
            mutable,
            values,
            default,
            allows_unset: false,
        }
    }

    /// An enumerated attribute that starts unclassified.
    pub fn select_unset(id: AttributeId, name: impl Into<String>, mutable: bool, values: Vec<AttributeValue>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: AttributeKind::Select,
            mutable,
            values,
            default: AttributeValue::Unset,
            allows_unset: true,
        }
    }

    /// A checkbox attribute; the negated value is materialized on first use.
    pub fn checkbox(id: AttributeId, name: impl Into<String>, mutable: bool, default: bool) -> Self {
        Self {
            id,
            name: name.into(),
            kind: AttributeKind::Checkbox,
            mutable,
            values: vec![AttributeValue::Bool(default)],
            default: AttributeValue::Bool(default),
            allows_unset: false,
        }
    }

    /// A free-form text attribute.
    pub fn text(id: AttributeId, name: impl Into<String>, mutable: bool, default: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: AttributeKind::Text,
            mutable,
            values: Vec::new(),
            default: AttributeValue::Text(default.into()),
            allows_unset: false,
        }
    }

    /// A free-form numeric attribute.
    pub fn number(id: AttributeId, name: impl Into<String>, mutable: bool, default: f64) -> Self {
        Self {
            id,
            name: name.into(),
            kind: AttributeKind::Number,
            mutable,
            values: Vec::new(),
            default: AttributeValue::Number(default),
            allows_unset: false,
        }
    }
}

/// Schema of a label: an ordered list of attributes.
///
/// Attribute order is significant: the navigator traverses attributes in this
/// order, and ordinal cursor positions index into it.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LabelSchema {
    pub id: LabelId,
    pub name: String,
    pub attributes: Vec<AttributeSchema>,
}

impl LabelSchema {
    pub fn attribute(&self, id: AttributeId) -> Option<&AttributeSchema> {
        self.attributes.iter().find(|a| a.id == id)
    }
}

/// Lookup table for every label the current job may use.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct LabelRegistry {
    labels: BTreeMap<LabelId, LabelSchema>,
}

impl LabelRegistry {
    pub fn new(labels: impl IntoIterator<Item = LabelSchema>) -> Self {
        Self {
            labels: labels.into_iter().map(|l| (l.id, l)).collect(),
        }
    }

    /// Look up a label schema; a missing id is a schema error.
    pub fn label(&self, id: LabelId) -> AnnotrackResult<&LabelSchema> {
        self.labels
            .get(&id)
            .ok_or_else(|| AnnotrackError::schema(format!("unknown label id {}", id.0)))
    }

    /// Look up one attribute of a label; a missing id is a schema error.
    pub fn attribute(&self, label: LabelId, attr: AttributeId) -> AnnotrackResult<&AttributeSchema> {
        self.label(label)?.attribute(attr).ok_or_else(|| {
            AnnotrackError::schema(format!(
                "label {} has no attribute with id {}",
                label.0, attr.0
            ))
        })
    }

    /// Lazily extend a checkbox to its full 2-value enumeration.
    ///
    /// Checkboxes are stored with a single legal value (their default); the
    /// boolean negation becomes the second legal value the first time it is
    /// addressed by ordinal key.
    pub fn materialize_checkbox_negation(
        &mut self,
        label: LabelId,
        attr: AttributeId,
    ) -> AnnotrackResult<()> {
        let schema = self
            .labels
            .get_mut(&label)
            .ok_or_else(|| AnnotrackError::schema(format!("unknown label id {}", label.0)))?
            .attributes
            .iter_mut()
            .find(|a| a.id == attr)
            .ok_or_else(|| {
                AnnotrackError::schema(format!(
                    "label {} has no attribute with id {}",
                    label.0, attr.0
                ))
            })?;
        if schema.kind != AttributeKind::Checkbox {
            return Err(AnnotrackError::schema(format!(
                "attribute {} is not a checkbox",
                attr.0
            )));
        }
        if schema.values.len() < 2 {
            if let Some(AttributeValue::Bool(first)) = schema.values.first().cloned() {
                schema.values.push(AttributeValue::Bool(!first));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> LabelRegistry {
        LabelRegistry::new([LabelSchema {
            id: LabelId(1),
            name: "vehicle".to_string(),
            attributes: vec![
                AttributeSchema::select(
                    AttributeId(10),
                    "model",
                    false,
                    vec![
                        AttributeValue::Choice("sedan".to_string()),
                        AttributeValue::Choice("truck".to_string()),
                    ],
                ),
                AttributeSchema::checkbox(AttributeId(11), "parked", true, true),
            ],
        }])
    }

    #[test]
    fn lookup_reports_gaps_as_schema_errors() {
        let reg = registry();
        assert!(reg.label(LabelId(1)).is_ok());
        assert!(matches!(
            reg.label(LabelId(99)),
            Err(AnnotrackError::Schema(_))
        ));
        assert!(matches!(
            reg.attribute(LabelId(1), AttributeId(99)),
            Err(AnnotrackError::Schema(_))
        ));
    }

    #[test]
    fn checkbox_materializes_negation_once() {
        let mut reg = registry();
        reg.materialize_checkbox_negation(LabelId(1), AttributeId(11))
            .unwrap();
        let attr = reg.attribute(LabelId(1), AttributeId(11)).unwrap();
        assert_eq!(
            attr.values,
            vec![AttributeValue::Bool(true), AttributeValue::Bool(false)]
        );

        // Repeated materialization is idempotent.
        reg.materialize_checkbox_negation(LabelId(1), AttributeId(11))
            .unwrap();
        let attr = reg.attribute(LabelId(1), AttributeId(11)).unwrap();
        assert_eq!(attr.values.len(), 2);
    }

    #[test]
    fn materialize_rejects_non_checkbox() {
        let mut reg = registry();
        assert!(
            reg.materialize_checkbox_negation(LabelId(1), AttributeId(10))
                .is_err()
        );
    }

    #[test]
    fn unset_default_keeps_real_values_at_ordinal_zero() {
        let attr = AttributeSchema::select_unset(
            AttributeId(1),
            "quality",
            true,
            vec![
                AttributeValue::Choice("good".to_string()),
                AttributeValue::Choice("bad".to_string()),
            ],
        );
        assert!(attr.default.is_unset());
        assert!(attr.allows_unset);
        assert_eq!(attr.values[0], AttributeValue::Choice("good".to_string()));
    }
}
