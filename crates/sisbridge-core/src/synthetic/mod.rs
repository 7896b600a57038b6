//! Deterministic synthetic SIS data.
//!
//! A scope's population is derived from a SHA-256 seed of the scope id, one
//! independent stream per entity family, so learners are identical whether
//! they are requested directly or referenced from parents and marks. Filters
//! and pagination are applied after generation; every page of a scope is a
//! slice of the same dataset.

mod catalog;

use fastrand::Rng;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::{Date, Month};

use crate::config::SyntheticConfig;
use crate::domain::{
    conformance_errors, schema_for, EntityRecord, EntityType, IntegrationLink, IsoDate,
    LookupTable, RequestFilters, GRADES,
};

use catalog::*;

/// Synthetic generation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyntheticError {
    #[error("synthetic data generation is disabled")]
    Disabled,
    #[error("lookup requests must name a lookup table")]
    MissingLookupTable,
}

/// Produces fake records shaped exactly like normalized upstream records.
#[derive(Debug, Clone)]
pub struct SyntheticGenerator {
    enabled: bool,
    sandbox_schools: Vec<String>,
    api_type_id: u32,
}

impl Default for SyntheticGenerator {
    fn default() -> Self {
        Self::new(true, vec![String::from("1001"), String::from("1002"), String::from("1003")], 8)
    }
}

impl SyntheticGenerator {
    pub fn new(enabled: bool, sandbox_schools: Vec<String>, api_type_id: u32) -> Self {
        Self {
            enabled,
            sandbox_schools,
            api_type_id,
        }
    }

    pub fn from_config(config: &SyntheticConfig, api_type_id: u32) -> Self {
        Self::new(config.enabled, config.sandbox_schools.clone(), api_type_id)
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Records for `entity` in `scope_id`, narrowed by `filters`.
    pub fn generate(
        &self,
        entity: EntityType,
        scope_id: &str,
        filters: &RequestFilters,
    ) -> Result<Vec<EntityRecord>, SyntheticError> {
        if !self.enabled {
            return Err(SyntheticError::Disabled);
        }

        let records = match entity {
            EntityType::Schools => vec![school(scope_id)],
            EntityType::Learners => learners(scope_id),
            EntityType::Staff => staff(scope_id),
            EntityType::Parents => parents(scope_id, &learners(scope_id)),
            EntityType::Marks => marks(&learners(scope_id), scope_id),
            EntityType::Lookups => {
                let table = filters
                    .lookup_table
                    .ok_or(SyntheticError::MissingLookupTable)?;
                lookup_items(table)
            }
        };

        let filtered = records
            .into_iter()
            .filter(|record| matches_filters(record, filters))
            .map(|record| conform(entity, record))
            .collect();
        Ok(filters.paginate(filtered))
    }

    /// Linked, active integrations for the configured sandbox schools.
    pub fn integrations(&self) -> Result<Vec<IntegrationLink>, SyntheticError> {
        if !self.enabled {
            return Err(SyntheticError::Disabled);
        }
        Ok(self
            .sandbox_schools
            .iter()
            .map(|school_id| {
                let name = school(school_id)
                    .get_str("SchoolName")
                    .map(str::to_owned)
                    .unwrap_or_default();
                IntegrationLink::new(school_id.as_str(), sandbox_login(school_id), true)
                    .with_school_name(name)
                    .with_api_type_id(self.api_type_id)
            })
            .collect())
    }

    /// Cheap liveness check used by the health report.
    pub fn self_test(&self) -> bool {
        if !self.enabled {
            return false;
        }
        match self.generate(EntityType::Learners, "selftest", &RequestFilters::default()) {
            Ok(records) => records
                .first()
                .is_some_and(|record| conformance_errors(EntityType::Learners, record).is_empty()),
            Err(_) => false,
        }
    }
}

/// Upstream login id the sandbox reports for `school_id`.
pub fn sandbox_login(school_id: &str) -> String {
    format!("sbx-{school_id}")
}

fn rng_for(scope_id: &str, stream: &str) -> Rng {
    let digest = Sha256::new()
        .chain_update(scope_id.as_bytes())
        .chain_update(b"\x1f")
        .chain_update(stream.as_bytes())
        .finalize();
    let mut seed = [0_u8; 8];
    seed.copy_from_slice(&digest[..8]);
    Rng::with_seed(u64::from_le_bytes(seed))
}

fn pick<'a, T>(rng: &mut Rng, items: &'a [T]) -> &'a T {
    &items[rng.usize(..items.len())]
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn iso_date(year: i32, month: u8, day: u8) -> Value {
    Month::try_from(month)
        .ok()
        .and_then(|month| Date::from_calendar_date(year, month, day).ok())
        .map_or(Value::Null, |date| Value::String(IsoDate::from_date(date).format()))
}

/// Fills the schema's field set, dropping anything the schema does not name.
fn conform(entity: EntityType, record: EntityRecord) -> EntityRecord {
    let mut raw = record.into_inner();
    let mut shaped = EntityRecord::new();
    for spec in schema_for(entity) {
        let value = raw.remove(spec.name).unwrap_or_else(|| spec.kind.missing());
        shaped.insert(spec.name, value);
    }
    shaped
}

fn matches_filters(record: &EntityRecord, filters: &RequestFilters) -> bool {
    if let Some(grade) = filters.grade {
        if let Some(record_grade) = record.get_str("Grade") {
            if record_grade != grade.as_str() {
                return false;
            }
        }
    }
    if filters.from_date.is_some() || filters.to_date.is_some() {
        if let Some(date) = record
            .get_str("AssessmentDate")
            .and_then(|raw| IsoDate::parse(raw).ok())
        {
            return filters.date_in_range(date);
        }
    }
    true
}

struct SchoolProfile {
    name: String,
    phase: &'static str,
    first_grade: u8,
    last_grade: u8,
    domain: String,
}

fn school_profile(scope_id: &str) -> (SchoolProfile, Rng) {
    let mut rng = rng_for(scope_id, "school");
    let stem = *pick(&mut rng, SCHOOL_NAME_STEMS);
    let &(phase, first_grade, last_grade) = pick(&mut rng, PHASES);
    let suffix = match phase {
        "Primary" => "Primary School",
        "Secondary" => "High School",
        _ => "Combined School",
    };
    let domain = format!(
        "{}.school.za",
        stem.to_ascii_lowercase().replace(' ', "")
    );
    (
        SchoolProfile {
            name: format!("{stem} {suffix}"),
            phase,
            first_grade,
            last_grade,
            domain,
        },
        rng,
    )
}

fn school(scope_id: &str) -> EntityRecord {
    let (profile, mut rng) = school_profile(scope_id);
    let province = *pick(&mut rng, PROVINCES);
    EntityRecord::new()
        .with("SchoolID", scope_id)
        .with("SchoolName", profile.name)
        .with("EmisNumber", format!("{:09}", rng.u32(100_000_000..1_000_000_000)))
        .with("Province", province)
        .with("District", format!("{province} District {}", rng.u8(1..=9)))
        .with("Phase", profile.phase)
}

fn learners(scope_id: &str) -> Vec<EntityRecord> {
    let (profile, _) = school_profile(scope_id);
    let mut rng = rng_for(scope_id, "learners");
    let mut records = Vec::new();
    let mut sequence = 0_u32;

    for ordinal in profile.first_grade..=profile.last_grade {
        let grade = GRADES[usize::from(ordinal)];
        let per_grade = rng.u32(3..=6);
        for _ in 0..per_grade {
            sequence += 1;
            let female = rng.bool();
            let first_name = if female {
                *pick(&mut rng, FIRST_NAMES_FEMALE)
            } else {
                *pick(&mut rng, FIRST_NAMES_MALE)
            };
            let class_letter = if rng.bool() { 'A' } else { 'B' };
            let birth_year = REFERENCE_YEAR - 6 - i32::from(ordinal);
            records.push(
                EntityRecord::new()
                    .with("LearnerID", format!("{scope_id}{sequence:04}"))
                    .with("SchoolID", scope_id)
                    .with("FirstName", first_name)
                    .with("Surname", *pick(&mut rng, SURNAMES))
                    .with("Grade", grade)
                    .with("ClassName", format!("{grade}{class_letter}"))
                    .with("Gender", if female { "F" } else { "M" })
                    .with("DateOfBirth", iso_date(birth_year, rng.u8(1..=12), rng.u8(1..=28)))
                    .with("HomeLanguage", pick(&mut rng, LANGUAGES).1),
            );
        }
    }
    records
}

fn staff(scope_id: &str) -> Vec<EntityRecord> {
    let (profile, _) = school_profile(scope_id);
    let mut rng = rng_for(scope_id, "staff");
    let count = rng.u32(8..=15);

    (1..=count)
        .map(|sequence| {
            let female = rng.bool();
            let first_name = if female {
                *pick(&mut rng, FIRST_NAMES_FEMALE)
            } else {
                *pick(&mut rng, FIRST_NAMES_MALE)
            };
            let surname = *pick(&mut rng, SURNAMES);
            let title = if female {
                if rng.bool() { "Ms" } else { "Mrs" }
            } else if rng.u8(..10) == 0 {
                "Dr"
            } else {
                TITLES[0]
            };
            let position = match sequence {
                1 => POSITIONS[0].0,
                2 => POSITIONS[1].0,
                _ => pick(&mut rng, &POSITIONS[2..]).0,
            };
            let subjects: Vec<Value> = (0..rng.usize(1..=3))
                .map(|_| Value::String(pick(&mut rng, SUBJECTS).0.to_owned()))
                .fold(Vec::new(), |mut unique, code| {
                    if !unique.contains(&code) {
                        unique.push(code);
                    }
                    unique
                });
            EntityRecord::new()
                .with("StaffID", format!("{scope_id}S{sequence:03}"))
                .with("SchoolID", scope_id)
                .with("Title", title)
                .with("FirstName", first_name)
                .with("Surname", surname)
                .with("Position", position)
                .with("Email", email(first_name, surname, &profile.domain))
                .with("SubjectCodes", Value::Array(subjects))
        })
        .collect()
}

fn email(first_name: &str, surname: &str, domain: &str) -> String {
    let local: String = format!("{first_name}.{surname}")
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '.')
        .collect::<String>()
        .to_ascii_lowercase();
    format!("{local}@{domain}")
}

fn parents(scope_id: &str, learners: &[EntityRecord]) -> Vec<EntityRecord> {
    let mut rng = rng_for(scope_id, "parents");
    let mut records = Vec::new();
    let mut index = 0;

    while index < learners.len() {
        // Roughly one family in four has a second child at the school.
        let family_size = if index + 1 < learners.len() && rng.u8(..4) == 0 { 2 } else { 1 };
        let children = &learners[index..index + family_size];
        index += family_size;

        let surname = children[0].get_str("Surname").unwrap_or("Mokoena");
        let &(relationship, _) = pick(&mut rng, RELATIONSHIPS);
        let first_name = match relationship {
            "FATHER" => *pick(&mut rng, FIRST_NAMES_MALE),
            "MOTHER" => *pick(&mut rng, FIRST_NAMES_FEMALE),
            _ if rng.bool() => *pick(&mut rng, FIRST_NAMES_MALE),
            _ => *pick(&mut rng, FIRST_NAMES_FEMALE),
        };
        let learner_ids: Vec<Value> = children
            .iter()
            .filter_map(|learner| learner.get_str("LearnerID"))
            .map(|id| Value::String(id.to_owned()))
            .collect();

        records.push(
            EntityRecord::new()
                .with("ParentID", format!("{scope_id}P{:04}", records.len() + 1))
                .with("SchoolID", scope_id)
                .with("FirstName", first_name)
                .with("Surname", surname)
                .with("Relationship", relationship)
                .with(
                    "Cellphone",
                    format!("0{}{:08}", pick(&mut rng, &[6_u8, 7, 8]), rng.u32(..100_000_000)),
                )
                .with("Email", email(first_name, surname, "mail.example"))
                .with("LearnerIDs", Value::Array(learner_ids)),
        );
    }
    records
}

fn subjects_for_grade(ordinal: u8) -> &'static [(&'static str, &'static str)] {
    match ordinal {
        0..=3 => &SUBJECTS[..4],
        4..=6 => &SUBJECTS[..6],
        7..=9 => &SUBJECTS[..9],
        _ => &SUBJECTS[..],
    }
}

fn marks(learners: &[EntityRecord], scope_id: &str) -> Vec<EntityRecord> {
    let mut rng = rng_for(scope_id, "marks");
    let mut records = Vec::new();

    for learner in learners {
        let (Some(learner_id), Some(grade)) = (learner.get_str("LearnerID"), learner.get_str("Grade"))
        else {
            continue;
        };
        let ordinal = GRADES.iter().position(|label| *label == grade).unwrap_or(0) as u8;
        let subjects = subjects_for_grade(ordinal);
        let ability = 35.0 + rng.f64() * 55.0;

        let mut sequence = 0_u32;
        for term in 1..=2_u8 {
            for &(subject_code, subject_name) in subjects.iter().take(3) {
                let &(assessment, total) = pick(&mut rng, ASSESSMENTS);
                sequence += 1;
                let percentage = (ability + (rng.f64() - 0.5) * 30.0).clamp(0.0, 100.0);
                let total = f64::from(total);
                let obtained = (percentage / 100.0 * total).round();
                let month = (term - 1) * 3 + 2 + rng.u8(..2);
                records.push(
                    EntityRecord::new()
                        .with("MarkID", format!("{learner_id}M{sequence:02}"))
                        .with("LearnerID", learner_id)
                        .with("SubjectID", subject_code)
                        .with("SubjectName", subject_name)
                        .with("Grade", grade)
                        .with("Term", i64::from(term))
                        .with("AssessmentName", format!("Term {term} {assessment}"))
                        .with("AssessmentDate", iso_date(REFERENCE_YEAR, month, rng.u8(1..=28)))
                        .with("MarkObtained", obtained)
                        .with("TotalMarks", total)
                        .with("Percentage", round2(obtained / total * 100.0)),
                );
            }
        }
    }
    records
}

fn lookup_items(table: LookupTable) -> Vec<EntityRecord> {
    let item = |code: &str, description: &str| {
        EntityRecord::new()
            .with("LookupType", table.as_str())
            .with("Code", code)
            .with("Description", description)
    };

    match table {
        LookupTable::Grades => GRADES
            .iter()
            .map(|grade| item(grade, &format!("Grade {grade}")))
            .collect(),
        LookupTable::Languages => LANGUAGES.iter().map(|(code, name)| item(code, name)).collect(),
        LookupTable::Subjects => SUBJECTS.iter().map(|(code, name)| item(code, name)).collect(),
        LookupTable::Genders => GENDERS.iter().map(|(code, name)| item(code, name)).collect(),
        LookupTable::Relationships => RELATIONSHIPS
            .iter()
            .map(|(code, name)| item(code, name))
            .collect(),
        LookupTable::Positions => POSITIONS.iter().map(|(code, name)| item(code, name)).collect(),
    }
}
