//! Documents and conversions into them.
//!
//! A document is a [`bson::Document`]: a mapping from field names to dynamically
//! typed values. No schema is enforced at this layer.
//!
//! Operations accept anything implementing [`IntoDocument`], which performs the
//! structural validation shared by documents, filters and updates: the value
//! must be present (not null) and must be a mapping.

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    error::{ArgumentRole, DriverError, ValidationError},
    query::Expr,
};

/// Name of the identifier field.
pub const ID_FIELD: &str = "_id";

/// Conversion into a document, validated for the role it will play.
pub trait IntoDocument {
    /// Converts `self` into a document.
    ///
    /// # Errors
    ///
    /// - the role's null variant (for example [`ValidationError::NullFilter`]) for null input
    /// - [`ValidationError::NotAMapping`] for scalars and arrays
    /// - [`ValidationError::InvalidDocument`] if the value cannot be represented
    fn into_document(self, role: ArgumentRole) -> Result<Document, ValidationError>;
}

impl IntoDocument for Document {
    fn into_document(self, _role: ArgumentRole) -> Result<Document, ValidationError> {
        Ok(self)
    }
}

impl IntoDocument for &Document {
    fn into_document(self, _role: ArgumentRole) -> Result<Document, ValidationError> {
        Ok(self.clone())
    }
}

impl IntoDocument for Option<Document> {
    fn into_document(self, role: ArgumentRole) -> Result<Document, ValidationError> {
        self.ok_or_else(|| ValidationError::null(role))
    }
}

impl IntoDocument for Bson {
    fn into_document(self, role: ArgumentRole) -> Result<Document, ValidationError> {
        match self {
            Bson::Document(document) => Ok(document),
            Bson::Null | Bson::Undefined => Err(ValidationError::null(role)),
            other => Err(ValidationError::NotAMapping {
                role,
                found: format!("{:?}", other.element_type()),
            }),
        }
    }
}

impl IntoDocument for Value {
    fn into_document(self, role: ArgumentRole) -> Result<Document, ValidationError> {
        match self {
            Value::Null => Err(ValidationError::null(role)),
            Value::Object(_) => serialize_to_bson(&self)
                .map_err(|e| ValidationError::InvalidDocument(e.to_string()))?
                .into_document(role),
            other => Err(ValidationError::NotAMapping {
                role,
                found: json_type_name(&other).to_string(),
            }),
        }
    }
}

impl IntoDocument for Expr {
    fn into_document(self, _role: ArgumentRole) -> Result<Document, ValidationError> {
        Ok(self.to_document())
    }
}

impl IntoDocument for &Expr {
    fn into_document(self, _role: ArgumentRole) -> Result<Document, ValidationError> {
        Ok(self.to_document())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Serializes a typed value into a document.
///
/// # Errors
///
/// Fails with a [`ValidationError`] if serialization fails or the value does not
/// serialize to a mapping.
pub fn to_document<T: Serialize + ?Sized>(value: &T) -> Result<Document, ValidationError> {
    serialize_to_bson(value)
        .map_err(|e| ValidationError::InvalidDocument(e.to_string()))?
        .into_document(ArgumentRole::Document)
}

/// Deserializes a document returned by a driver into a typed value.
pub fn from_document<T: DeserializeOwned>(document: Document) -> Result<T, DriverError> {
    Ok(deserialize_from_bson(Bson::Document(document))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Customer {
        name: String,
        address: String,
    }

    #[test]
    fn documents_pass_through() {
        let doc = doc! { "a": 1 };
        assert_eq!(doc.clone().into_document(ArgumentRole::Document), Ok(doc.clone()));
        assert_eq!((&doc).into_document(ArgumentRole::Filter), Ok(doc));
    }

    #[test]
    fn empty_mapping_is_accepted() {
        assert_eq!(json!({}).into_document(ArgumentRole::Document), Ok(Document::new()));
    }

    #[test]
    fn null_is_rejected_per_role() {
        assert_eq!(Value::Null.into_document(ArgumentRole::Filter), Err(ValidationError::NullFilter));
        assert_eq!(Bson::Null.into_document(ArgumentRole::Update), Err(ValidationError::NullUpdate));
        assert_eq!(None::<Document>.into_document(ArgumentRole::Document), Err(ValidationError::NullDocument));
    }

    #[test]
    fn scalars_and_arrays_are_not_mappings() {
        assert_eq!(
            json!([1, 2]).into_document(ArgumentRole::Document),
            Err(ValidationError::NotAMapping { role: ArgumentRole::Document, found: "array".to_string() }),
        );
        assert!(matches!(
            Bson::Int32(4).into_document(ArgumentRole::Filter),
            Err(ValidationError::NotAMapping { role: ArgumentRole::Filter, .. }),
        ));
    }

    #[test]
    fn json_objects_convert_with_nested_values() {
        let doc = json!({ "name": "Ann", "tags": ["a", "b"], "meta": { "vip": true } })
            .into_document(ArgumentRole::Document)
            .unwrap();

        assert_eq!(doc.get_str("name").unwrap(), "Ann");
        assert_eq!(doc.get_array("tags").unwrap().len(), 2);
        assert!(doc.get_document("meta").unwrap().get_bool("vip").unwrap());
    }

    #[test]
    fn typed_values_round_trip() {
        let customer = Customer { name: "John".into(), address: "Highway 37".into() };
        let doc = to_document(&customer).unwrap();

        assert_eq!(doc, doc! { "name": "John", "address": "Highway 37" });
        assert_eq!(from_document::<Customer>(doc).unwrap(), customer);
    }

    #[test]
    fn non_mapping_typed_values_are_rejected() {
        assert!(matches!(
            to_document(&vec![1, 2, 3]),
            Err(ValidationError::NotAMapping { .. }),
        ));
    }

    #[test]
    fn decoding_mismatch_is_a_serialization_error() {
        let err = from_document::<Customer>(doc! { "name": 5 }).unwrap_err();
        assert!(matches!(err, DriverError::Serialization(_)));
    }
}
