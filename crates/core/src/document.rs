//! Document model shared by the engine and the harness
//!
//! A [`Document`] is an ordered list of named [`Field`]s. Text fields are
//! tokenized into terms, keyword fields are indexed verbatim as a single
//! term, and numeric/binary fields are doc values that can be updated in
//! place by term.

use serde::{Deserialize, Serialize};

/// Value carried by a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Tokenized full text
    Text(String),
    /// Untokenized value, indexed as exactly one term
    Keyword(String),
    /// Numeric doc value
    Numeric(i64),
    /// Binary doc value
    Binary(Vec<u8>),
}

/// A named field of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Field value
    pub value: FieldValue,
}

impl Field {
    /// Create a tokenized text field.
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Field {
            name: name.into(),
            value: FieldValue::Text(text.into()),
        }
    }

    /// Create a keyword field.
    pub fn keyword(name: impl Into<String>, value: impl Into<String>) -> Self {
        Field {
            name: name.into(),
            value: FieldValue::Keyword(value.into()),
        }
    }

    /// Create a numeric doc-value field.
    pub fn numeric(name: impl Into<String>, value: i64) -> Self {
        Field {
            name: name.into(),
            value: FieldValue::Numeric(value),
        }
    }

    /// Create a binary doc-value field.
    pub fn binary(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Field {
            name: name.into(),
            value: FieldValue::Binary(value.into()),
        }
    }
}

/// A document: an ordered collection of fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    fields: Vec<Field>,
}

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Document { fields: Vec::new() }
    }

    /// Builder-style field append.
    pub fn with(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Append a field.
    pub fn add(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// All fields in insertion order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// First field with the given name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// First keyword or text value of the named field.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            FieldValue::Text(s) | FieldValue::Keyword(s) => Some(s),
            _ => None,
        }
    }

    /// Fold a doc-value update into the stored fields.
    ///
    /// Replaces every field called `name` of the update's kind, appending one
    /// if none exists; a `None` update removes them instead.
    pub fn apply_doc_value(&mut self, name: &str, update: &DocValueUpdate) {
        let same_kind = |value: &FieldValue| match update {
            DocValueUpdate::Numeric(_) => matches!(value, FieldValue::Numeric(_)),
            DocValueUpdate::Binary(_) => matches!(value, FieldValue::Binary(_)),
        };
        match update.to_field_value() {
            Some(v) => {
                let mut replaced = false;
                for field in self.fields.iter_mut().filter(|f| f.name == name) {
                    if same_kind(&field.value) {
                        field.value = v.clone();
                        replaced = true;
                    }
                }
                if !replaced {
                    self.fields.push(Field {
                        name: name.to_string(),
                        value: v,
                    });
                }
            }
            None => self.fields.retain(|f| f.name != name || !same_kind(&f.value)),
        }
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the document has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<Field> for Document {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Document {
            fields: iter.into_iter().collect(),
        }
    }
}

/// An in-place doc-value update; `None` clears the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocValueUpdate {
    /// New numeric value
    Numeric(Option<i64>),
    /// New binary value
    Binary(Option<Vec<u8>>),
}

impl DocValueUpdate {
    fn to_field_value(&self) -> Option<FieldValue> {
        match self {
            DocValueUpdate::Numeric(v) => v.map(FieldValue::Numeric),
            DocValueUpdate::Binary(v) => v.clone().map(FieldValue::Binary),
        }
    }
}

/// A (field, text) pair identifying indexed documents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Term {
    /// Field name
    pub field: String,
    /// Indexed term text
    pub text: String,
}

impl Term {
    /// Create a new term
    pub fn new(field: impl Into<String>, text: impl Into<String>) -> Self {
        Term {
            field: field.into(),
            text: text.into(),
        }
    }
}

/// Query used by delete-by-query and reader searches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Query {
    /// Documents containing the term
    Term(Term),
    /// Documents matching every sub-query
    All(Vec<Query>),
    /// Documents matching at least one sub-query
    Any(Vec<Query>),
    /// Documents whose numeric doc value lies in `[min, max]`
    NumericRange {
        /// Field name
        field: String,
        /// Inclusive lower bound
        min: i64,
        /// Inclusive upper bound
        max: i64,
    },
    /// Every document
    MatchAll,
}

impl From<Term> for Query {
    fn from(term: Term) -> Self {
        Query::Term(term)
    }
}
