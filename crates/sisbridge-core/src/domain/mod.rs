//! # Domain Models
//!
//! Canonical types shared by the live and synthetic paths.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`EntityType`] | Entity families (schools, learners, staff, ...) |
//! | [`EntityRecord`] | One normalized record |
//! | [`RequestDescriptor`] | Entity + scope + filters for one read |
//! | [`FieldSpec`] | Canonical field with its upstream name candidates |
//! | [`IntegrationLink`] | School to upstream login binding |
//! | [`UtcDateTime`] | UTC timestamp |

mod descriptor;
mod entity;
mod integration;
mod schema;
mod timestamp;

pub use descriptor::{IsoDate, RequestDescriptor, RequestFilters, MAX_PAGE_SIZE};
pub use entity::{canonical_grade, EntityRecord, EntityType, Grade, LookupTable, GRADES};
pub use integration::{find_link, IntegrationLink};
pub use schema::{conformance_errors, schema_for, FieldKind, FieldSpec, INTEGRATION_FIELDS};
pub use timestamp::UtcDateTime;
