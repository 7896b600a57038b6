use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ValidationError;

/// Entity families served by the access layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Schools,
    Learners,
    Staff,
    Parents,
    Marks,
    Lookups,
}

impl EntityType {
    pub const ALL: [Self; 6] = [
        Self::Schools,
        Self::Learners,
        Self::Staff,
        Self::Parents,
        Self::Marks,
        Self::Lookups,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Schools => "schools",
            Self::Learners => "learners",
            Self::Staff => "staff",
            Self::Parents => "parents",
            Self::Marks => "marks",
            Self::Lookups => "lookups",
        }
    }
}

impl Display for EntityType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "schools" | "school" => Ok(Self::Schools),
            "learners" | "learner" => Ok(Self::Learners),
            "staff" => Ok(Self::Staff),
            "parents" | "parent" => Ok(Self::Parents),
            "marks" | "mark" => Ok(Self::Marks),
            "lookups" | "lookup" => Ok(Self::Lookups),
            other => Err(ValidationError::InvalidEntityType {
                value: other.to_owned(),
            }),
        }
    }
}

/// Reference tables exposed through the lookup entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupTable {
    Grades,
    Languages,
    Subjects,
    Genders,
    Relationships,
    Positions,
}

impl LookupTable {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Grades => "grades",
            Self::Languages => "languages",
            Self::Subjects => "subjects",
            Self::Genders => "genders",
            Self::Relationships => "relationships",
            Self::Positions => "positions",
        }
    }
}

impl Display for LookupTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LookupTable {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "grades" => Ok(Self::Grades),
            "languages" => Ok(Self::Languages),
            "subjects" => Ok(Self::Subjects),
            "genders" => Ok(Self::Genders),
            "relationships" => Ok(Self::Relationships),
            "positions" => Ok(Self::Positions),
            other => Err(ValidationError::InvalidLookupTable {
                value: other.to_owned(),
            }),
        }
    }
}

/// Grade levels recognised by the SIS, Grade R through Grade 12.
pub const GRADES: [&str; 13] = [
    "R", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12",
];

/// Validated grade level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Grade(u8);

impl Grade {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        canonical_grade(input)
            .and_then(|label| GRADES.iter().position(|grade| *grade == label))
            .and_then(|index| u8::try_from(index).ok())
            .map(Self)
            .ok_or_else(|| ValidationError::InvalidGrade {
                value: input.to_owned(),
            })
    }

    pub fn as_str(self) -> &'static str {
        GRADES[usize::from(self.0)]
    }

    /// Ordinal where Grade R is zero.
    pub const fn ordinal(self) -> u8 {
        self.0
    }
}

impl Display for Grade {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Grade {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Grade> for String {
    fn from(value: Grade) -> Self {
        value.as_str().to_owned()
    }
}

/// Maps the grade spellings seen upstream ("Grade 5", "Gr R", "0", "05") onto
/// the canonical labels in [`GRADES`].
pub fn canonical_grade(input: &str) -> Option<&'static str> {
    let trimmed = input.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let stripped = lowered
        .strip_prefix("grade")
        .or_else(|| lowered.strip_prefix("gr"))
        .unwrap_or(&lowered)
        .trim_start_matches(['.', ' '])
        .trim();

    if stripped == "r" || stripped == "0" {
        return Some(GRADES[0]);
    }

    let number = stripped.parse::<usize>().ok()?;
    GRADES.get(number).copied().filter(|_| number > 0)
}

/// One normalized record: canonical field name to JSON value.
///
/// Live and synthetic records share the field set defined by
/// [`crate::domain::schema_for`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRecord(Map<String, Value>);

impl EntityRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn get_str_list(&self, field: &str) -> Vec<&str> {
        self.0
            .get(field)
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}
