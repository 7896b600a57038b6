use serde::{Deserialize, Serialize};

use super::entity::EntityRecord;

/// Binding between a school and the upstream login that serves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationLink {
    pub school_id: String,
    pub login_id: String,
    pub school_name: Option<String>,
    pub api_type_id: Option<u32>,
    pub active: bool,
}

impl IntegrationLink {
    pub fn new(school_id: impl Into<String>, login_id: impl Into<String>, active: bool) -> Self {
        Self {
            school_id: school_id.into(),
            login_id: login_id.into(),
            school_name: None,
            api_type_id: None,
            active,
        }
    }

    pub fn with_school_name(mut self, name: impl Into<String>) -> Self {
        self.school_name = Some(name.into());
        self
    }

    pub fn with_api_type_id(mut self, api_type_id: u32) -> Self {
        self.api_type_id = Some(api_type_id);
        self
    }

    /// Builds a link from a record normalized against
    /// [`crate::domain::INTEGRATION_FIELDS`].
    ///
    /// Returns `None` when neither identifier is present. A missing school id
    /// falls back to the login id and vice versa.
    pub fn from_record(record: &EntityRecord) -> Option<Self> {
        let school_id = record.get_str("SchoolID").map(str::to_owned);
        let login_id = record.get_str("LoginID").map(str::to_owned);
        let (school_id, login_id) = match (school_id, login_id) {
            (Some(school), Some(login)) => (school, login),
            (Some(school), None) => (school.clone(), school),
            (None, Some(login)) => (login.clone(), login),
            (None, None) => return None,
        };

        Some(Self {
            school_id,
            login_id,
            school_name: record.get_str("SchoolName").map(str::to_owned),
            api_type_id: record
                .get("ApiTypeID")
                .and_then(serde_json::Value::as_u64)
                .and_then(|value| u32::try_from(value).ok()),
            active: record
                .get("Active")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
        })
    }
}

/// Finds the link for `school_id`, matching either identifier.
pub fn find_link<'a>(links: &'a [IntegrationLink], school_id: &str) -> Option<&'a IntegrationLink> {
    links
        .iter()
        .find(|link| link.school_id == school_id)
        .or_else(|| links.iter().find(|link| link.login_id == school_id))
}
