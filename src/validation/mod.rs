use crate::datastore::Entity;
use serde::{Deserialize, Serialize};

/// One failed field check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub field: String,
    pub message: String,
}

pub type ErrorList = Vec<ErrorDetail>;

pub fn required_error(field: &str) -> ErrorDetail {
    ErrorDetail {
        field: field.to_string(),
        message: format!("'{}' is required", field),
    }
}

/// Entity IDs become a single token of the broker subject
/// `entities.{id}.update`, so they must not contain token separators
/// (`.`, `/`), wildcards (`*`, `>`) or whitespace.
pub fn is_valid_entity_id(id: &str) -> bool {
    if id.is_empty() {
        return false;
    }

    !id
        .chars()
        .any(|c| matches!(c, '.' | '/' | '*' | '>') || c.is_whitespace() || c.is_control())
}

/// Field-level validation for request bodies. An empty list means valid.
pub trait Validate {
    fn validate(&self) -> ErrorList;
}

impl Validate for Entity {
    fn validate(&self) -> ErrorList {
        let mut errors = ErrorList::new();

        if self.id.is_empty() {
            errors.push(required_error("id"));
        } else if !is_valid_entity_id(&self.id) {
            errors.push(ErrorDetail {
                field: "id".to_string(),
                message: "'id' must not contain '.', '/', '*', '>' or whitespace".to_string(),
            });
        }

        if self.name.is_empty() {
            errors.push(required_error("name"));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_entity() {
        assert!(Entity::new("e1", "Lamp").validate().is_empty());
    }

    #[test]
    fn test_missing_fields_reported_in_order() {
        let errors = Entity::new("", "").validate();
        assert_eq!(
            errors,
            vec![required_error("id"), required_error("name")]
        );
        assert_eq!(errors[0].message, "'id' is required");
    }

    #[test]
    fn test_missing_name_only() {
        let errors = Entity::new("e1", "").validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "name");
    }

    #[test]
    fn test_entity_id_subject_tokens() {
        assert!(is_valid_entity_id("e1"));
        assert!(is_valid_entity_id("Lamp-01_kitchen"));

        for id in ["", "a.b", "a/b", "*", ">", "a b", "tab\tid", "a.", "/a"] {
            assert!(!is_valid_entity_id(id), "{:?} should be rejected", id);
        }
    }

    #[test]
    fn test_ids_sharing_a_subject_are_rejected() {
        // "a.b" and "a/b" would both publish to esr.entities.a.b.update
        for id in ["a.b", "a/b", ">"] {
            let errors = Entity::new(id, "Lamp").validate();
            assert_eq!(errors.len(), 1, "{:?}", id);
            assert_eq!(errors[0].field, "id");
            assert!(errors[0].message.contains("must not contain"));
        }
    }
}
