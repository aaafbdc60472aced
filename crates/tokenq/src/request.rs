use crate::{Error, Result};
use chrono::{DateTime, Utc};
use core::{fmt, str::FromStr};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::LazyLock;
use uuid::Uuid;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

/// Lifecycle state of a [`ServiceRequest`].
///
/// Records start out [`Status::Pending`]. An administrator may flip a record
/// between the two states in either direction; no other states exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[default]
    Pending,
    Completed,
}

impl Status {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Completed => "Completed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Completed" => Ok(Self::Completed),
            other => Err(Error::InvalidStatus {
                value: other.to_string(),
            }),
        }
    }
}

/// A submitted service request together with its assigned token.
///
/// Every field except `status`, `updated_at` and `reminder_sent` is fixed at
/// creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub token_number: u64,
    pub name: String,
    pub email: String,
    pub address: String,
    pub contact_number: String,
    pub work_description: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reminder_sent: bool,
}

/// The user-supplied part of a submission.
///
/// Absent and `null` fields deserialize as empty strings so that they
/// surface as a [`Error::Validation`] naming the field rather than as a
/// decoding failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewServiceRequest {
    #[serde(deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub email: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub address: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub contact_number: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub work_description: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl NewServiceRequest {
    /// Trims every field and checks that all are present and that `email`
    /// looks like an address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] listing every offending field.
    pub fn validate(self) -> Result<Self> {
        let trimmed = Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            address: self.address.trim().to_string(),
            contact_number: self.contact_number.trim().to_string(),
            work_description: self.work_description.trim().to_string(),
        };

        let mut fields = Vec::new();
        if trimmed.name.is_empty() {
            fields.push("name");
        }
        if !EMAIL.is_match(&trimmed.email) {
            fields.push("email");
        }
        if trimmed.address.is_empty() {
            fields.push("address");
        }
        if trimmed.contact_number.is_empty() {
            fields.push("contact_number");
        }
        if trimmed.work_description.is_empty() {
            fields.push("work_description");
        }

        if fields.is_empty() {
            Ok(trimmed)
        } else {
            Err(Error::Validation { fields })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> NewServiceRequest {
        NewServiceRequest {
            name: "A".into(),
            email: "a@x.com".into(),
            address: "1 St".into(),
            contact_number: "555".into(),
            work_description: "fix sink".into(),
        }
    }

    #[test]
    fn validate_accepts_complete_request() {
        assert_eq!(valid().validate().unwrap(), valid());
    }

    #[test]
    fn validate_trims_whitespace() {
        let request = NewServiceRequest {
            name: "  A ".into(),
            ..valid()
        };
        assert_eq!(request.validate().unwrap().name, "A");
    }

    #[test]
    fn validate_names_every_missing_field() {
        let err = NewServiceRequest::default().validate().unwrap_err();
        assert_eq!(
            err.invalid_fields().unwrap(),
            &[
                "name",
                "email",
                "address",
                "contact_number",
                "work_description"
            ]
        );
    }

    #[test]
    fn validate_treats_blank_as_missing() {
        let request = NewServiceRequest {
            name: "   ".into(),
            ..valid()
        };
        let err = request.validate().unwrap_err();
        assert_eq!(err.invalid_fields().unwrap(), &["name"]);
        assert_eq!(err.to_string(), "Missing or invalid fields: name");
    }

    #[test]
    fn validate_rejects_malformed_email() {
        for email in ["a", "a@", "@x.com", "a@x", "a b@x.com", "a@@x.com"] {
            let request = NewServiceRequest {
                email: email.into(),
                ..valid()
            };
            let err = request.validate().unwrap_err();
            assert_eq!(err.invalid_fields().unwrap(), &["email"], "{email}");
        }
    }

    #[test]
    fn missing_json_fields_default_to_empty() {
        let request: NewServiceRequest =
            serde_json::from_str(r#"{"name":"A","email":"a@x.com"}"#).unwrap();
        let err = request.validate().unwrap_err();
        assert_eq!(
            err.invalid_fields().unwrap(),
            &["address", "contact_number", "work_description"]
        );
    }

    #[test]
    fn null_json_fields_are_reported_as_missing() {
        let request: NewServiceRequest = serde_json::from_str(
            r#"{"name":null,"email":"a@x.com","address":null,
                "contact_number":"555","work_description":"fix sink"}"#,
        )
        .unwrap();
        let err = request.validate().unwrap_err();
        assert_eq!(err.invalid_fields().unwrap(), &["name", "address"]);
    }

    #[test]
    fn status_parses_and_displays() {
        assert_eq!("Pending".parse::<Status>().unwrap(), Status::Pending);
        assert_eq!("Completed".parse::<Status>().unwrap(), Status::Completed);
        assert!(matches!(
            "Done".parse::<Status>(),
            Err(Error::InvalidStatus { value }) if value == "Done"
        ));
        assert_eq!(Status::Completed.to_string(), "Completed");
        assert_eq!(serde_json::to_string(&Status::Pending).unwrap(), "\"Pending\"");
    }
}
