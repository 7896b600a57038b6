//! Canonical record shapes.
//!
//! Each entity type owns an ordered table of [`FieldSpec`] entries. The table
//! is the single source of truth for the field set of a record: upstream
//! payloads are normalized through it, synthetic records are built against it,
//! and tests check both paths for conformance.

use serde_json::Value;

use super::entity::{canonical_grade, EntityRecord, EntityType};

/// Value kind a canonical field is coerced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Number,
    Bool,
    /// Text restricted to the labels in [`super::GRADES`].
    Grade,
    TextList,
}

impl FieldKind {
    /// Value used when no source candidate is present.
    pub fn missing(self) -> Value {
        match self {
            Self::TextList => Value::Array(Vec::new()),
            _ => Value::Null,
        }
    }

    /// Whether `value` already has this kind's canonical representation.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::TextList, Value::Array(items)) => items.iter().all(Value::is_string),
            (Self::TextList, _) => false,
            (_, Value::Null) => true,
            (Self::Text, Value::String(_)) => true,
            (Self::Grade, Value::String(text)) => canonical_grade(text) == Some(text.as_str()),
            (Self::Integer, Value::Number(number)) => number.is_i64() || number.is_u64(),
            (Self::Number, Value::Number(number)) => number.is_f64(),
            (Self::Bool, Value::Bool(_)) => true,
            _ => false,
        }
    }
}

/// One canonical field with its source-name candidates in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub sources: &'static [&'static str],
}

const fn field(
    name: &'static str,
    kind: FieldKind,
    sources: &'static [&'static str],
) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        sources,
    }
}

const SCHOOL_ID: FieldSpec = field(
    "SchoolID",
    FieldKind::Text,
    &["SchoolID", "school_id", "schoolId", "school_login_id"],
);
const FIRST_NAME: FieldSpec = field(
    "FirstName",
    FieldKind::Text,
    &["FirstName", "first_name", "firstName", "firstname", "name"],
);
const SURNAME: FieldSpec = field(
    "Surname",
    FieldKind::Text,
    &["Surname", "surname", "last_name", "lastName", "lastname"],
);
const EMAIL: FieldSpec = field(
    "Email",
    FieldKind::Text,
    &["Email", "email", "email_address", "emailAddress"],
);
const LEARNER_ID: FieldSpec = field(
    "LearnerID",
    FieldKind::Text,
    &["LearnerID", "learner_id", "learnerId", "StudentID", "student_id"],
);
const GRADE: FieldSpec = field(
    "Grade",
    FieldKind::Grade,
    &["Grade", "grade", "grade_name", "gradeName"],
);

const SCHOOL_FIELDS: &[FieldSpec] = &[
    SCHOOL_ID,
    field(
        "SchoolName",
        FieldKind::Text,
        &["SchoolName", "school_name", "schoolName", "name"],
    ),
    field(
        "EmisNumber",
        FieldKind::Text,
        &["EmisNumber", "emis_number", "emisNumber", "emis"],
    ),
    field("Province", FieldKind::Text, &["Province", "province"]),
    field("District", FieldKind::Text, &["District", "district"]),
    field(
        "Phase",
        FieldKind::Text,
        &["Phase", "phase", "school_phase", "schoolPhase"],
    ),
];

const LEARNER_FIELDS: &[FieldSpec] = &[
    LEARNER_ID,
    SCHOOL_ID,
    FIRST_NAME,
    SURNAME,
    GRADE,
    field(
        "ClassName",
        FieldKind::Text,
        &["ClassName", "class_name", "className", "class"],
    ),
    field("Gender", FieldKind::Text, &["Gender", "gender", "sex"]),
    field(
        "DateOfBirth",
        FieldKind::Text,
        &["DateOfBirth", "date_of_birth", "dateOfBirth", "dob", "birth_date"],
    ),
    field(
        "HomeLanguage",
        FieldKind::Text,
        &["HomeLanguage", "home_language", "homeLanguage", "language"],
    ),
];

const STAFF_FIELDS: &[FieldSpec] = &[
    field(
        "StaffID",
        FieldKind::Text,
        &["StaffID", "staff_id", "staffId", "EducatorID", "educator_id"],
    ),
    SCHOOL_ID,
    field("Title", FieldKind::Text, &["Title", "title"]),
    FIRST_NAME,
    SURNAME,
    field(
        "Position",
        FieldKind::Text,
        &["Position", "position", "post", "designation"],
    ),
    EMAIL,
    field(
        "SubjectCodes",
        FieldKind::TextList,
        &["SubjectCodes", "subject_codes", "subjectCodes", "subjects"],
    ),
];

const PARENT_FIELDS: &[FieldSpec] = &[
    field(
        "ParentID",
        FieldKind::Text,
        &["ParentID", "parent_id", "parentId", "ContactID", "contact_id"],
    ),
    SCHOOL_ID,
    FIRST_NAME,
    SURNAME,
    field(
        "Relationship",
        FieldKind::Text,
        &["Relationship", "relationship", "relation"],
    ),
    field(
        "Cellphone",
        FieldKind::Text,
        &["Cellphone", "cellphone", "cell_number", "mobile"],
    ),
    EMAIL,
    field(
        "LearnerIDs",
        FieldKind::TextList,
        &["LearnerIDs", "learner_ids", "learnerIds", "learners", "children"],
    ),
];

const MARK_FIELDS: &[FieldSpec] = &[
    field("MarkID", FieldKind::Text, &["MarkID", "mark_id", "markId", "id"]),
    LEARNER_ID,
    field(
        "SubjectID",
        FieldKind::Text,
        &["SubjectID", "subject_id", "subjectId", "subject_code"],
    ),
    field(
        "SubjectName",
        FieldKind::Text,
        &["SubjectName", "subject_name", "subjectName", "subject"],
    ),
    GRADE,
    field("Term", FieldKind::Integer, &["Term", "term"]),
    field(
        "AssessmentName",
        FieldKind::Text,
        &["AssessmentName", "assessment_name", "assessmentName", "assessment"],
    ),
    field(
        "AssessmentDate",
        FieldKind::Text,
        &["AssessmentDate", "assessment_date", "assessmentDate", "date"],
    ),
    field(
        "MarkObtained",
        FieldKind::Number,
        &["MarkObtained", "mark_obtained", "markObtained", "mark", "score"],
    ),
    field(
        "TotalMarks",
        FieldKind::Number,
        &["TotalMarks", "total_marks", "totalMarks", "max_mark", "total"],
    ),
    field(
        "Percentage",
        FieldKind::Number,
        &["Percentage", "percentage", "percent"],
    ),
];

const LOOKUP_FIELDS: &[FieldSpec] = &[
    field(
        "LookupType",
        FieldKind::Text,
        &["LookupType", "lookup_type", "lookupType", "type"],
    ),
    field("Code", FieldKind::Text, &["Code", "code", "id"]),
    field(
        "Description",
        FieldKind::Text,
        &["Description", "description", "name", "value"],
    ),
];

/// Field table for an integration link as listed by the upstream.
pub const INTEGRATION_FIELDS: &[FieldSpec] = &[
    field(
        "SchoolID",
        FieldKind::Text,
        &["SchoolID", "school_id", "schoolId", "emis_number"],
    ),
    field(
        "LoginID",
        FieldKind::Text,
        &["LoginID", "school_login_id", "schoolLoginId", "login_id"],
    ),
    field(
        "SchoolName",
        FieldKind::Text,
        &["SchoolName", "school_name", "schoolName", "name"],
    ),
    field(
        "ApiTypeID",
        FieldKind::Integer,
        &["ApiTypeID", "api_type_id", "apiTypeId"],
    ),
    field(
        "Active",
        FieldKind::Bool,
        &["Active", "activated", "active", "is_active", "isActive"],
    ),
];

/// Canonical field table for an entity type.
pub fn schema_for(entity: EntityType) -> &'static [FieldSpec] {
    match entity {
        EntityType::Schools => SCHOOL_FIELDS,
        EntityType::Learners => LEARNER_FIELDS,
        EntityType::Staff => STAFF_FIELDS,
        EntityType::Parents => PARENT_FIELDS,
        EntityType::Marks => MARK_FIELDS,
        EntityType::Lookups => LOOKUP_FIELDS,
    }
}

/// Describes every way `record` departs from the canonical shape of `entity`.
///
/// An empty result means the record carries exactly the schema's fields, each
/// in its canonical kind.
pub fn conformance_errors(entity: EntityType, record: &EntityRecord) -> Vec<String> {
    let fields = schema_for(entity);
    let mut errors = Vec::new();

    for spec in fields {
        match record.get(spec.name) {
            None => errors.push(format!("missing field '{}'", spec.name)),
            Some(value) if !spec.kind.accepts(value) => errors.push(format!(
                "field '{}' is not a {:?}: {value}",
                spec.name, spec.kind
            )),
            Some(_) => {}
        }
    }

    for name in record.field_names() {
        if !fields.iter().any(|spec| spec.name == name) {
            errors.push(format!("unexpected field '{name}'"));
        }
    }

    errors
}
