use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{EntityType, RequestDescriptor};
use crate::ValidationError;

/// Versioned base path of the upstream API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    V1,
    V2,
}

impl ApiVersion {
    pub const ALL: [Self; 2] = [Self::V1, Self::V2];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

impl Display for ApiVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiVersion {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "v1" | "1" => Ok(Self::V1),
            "v2" | "2" => Ok(Self::V2),
            other => Err(ValidationError::InvalidApiVersion {
                value: other.to_owned(),
            }),
        }
    }
}

/// Where an entity type lives upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub version: ApiVersion,
    /// Path template; `{login}` and `{table}` are substituted per request.
    pub template: &'static str,
    /// Scoped routes need the school resolved to an upstream login first.
    pub scoped: bool,
    /// Keys under which the upstream may wrap the record array.
    pub envelope_keys: &'static [&'static str],
}

const DEFAULT_ENVELOPE: &[&str] = &["data", "results", "items"];

/// Listing of client integrations (school logins visible to our credentials).
pub const INTEGRATIONS_ROUTE: Route = Route {
    version: ApiVersion::V1,
    template: "settings/clientintegrations",
    scoped: false,
    envelope_keys: &["data", "integrations", "clients"],
};

/// Activation toggle for one school login and API type.
pub const ACTIVATION_TEMPLATE: &str = "settings/clients/{login}/{api_type}";

/// Route table: one entry per entity type.
pub const fn route_for(entity: EntityType) -> Route {
    match entity {
        EntityType::Schools => Route {
            version: ApiVersion::V2,
            template: "schooldata/school/{login}",
            scoped: true,
            envelope_keys: &["data", "school", "schools"],
        },
        EntityType::Learners => Route {
            version: ApiVersion::V2,
            template: "schooldata/learners/{login}",
            scoped: true,
            envelope_keys: &["data", "learners", "results"],
        },
        EntityType::Staff => Route {
            version: ApiVersion::V2,
            template: "schooldata/staff/{login}",
            scoped: true,
            envelope_keys: &["data", "staff", "educators"],
        },
        EntityType::Parents => Route {
            version: ApiVersion::V2,
            template: "schooldata/parents/{login}",
            scoped: true,
            envelope_keys: &["data", "parents", "contacts"],
        },
        EntityType::Marks => Route {
            version: ApiVersion::V1,
            template: "adminplus/marks/{login}",
            scoped: true,
            envelope_keys: &["data", "marks", "results"],
        },
        EntityType::Lookups => Route {
            version: ApiVersion::V1,
            template: "adminplus/lookups/{table}",
            scoped: false,
            envelope_keys: DEFAULT_ENVELOPE,
        },
    }
}

impl Route {
    /// Concrete path for `descriptor`, with `login` substituted when scoped.
    pub fn path(&self, descriptor: &RequestDescriptor, login: &str) -> String {
        let table = descriptor
            .filters
            .lookup_table
            .map_or("", |table| table.as_str());
        self.template
            .replace("{login}", &urlencoding::encode(login))
            .replace("{table}", table)
    }
}

/// Concrete path for an activation toggle.
pub fn activation_path(login: &str, api_type_id: u32) -> String {
    ACTIVATION_TEMPLATE
        .replace("{login}", &urlencoding::encode(login))
        .replace("{api_type}", &api_type_id.to_string())
}
