use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::{Date, Month};

use super::entity::{EntityType, Grade, LookupTable};
use crate::ValidationError;

const MAX_SCOPE_LEN: usize = 64;

/// Largest page a caller may request from either path.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Calendar date in `YYYY-MM-DD` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IsoDate(Date);

impl IsoDate {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidDate {
            value: input.to_owned(),
        };
        let mut parts = input.trim().splitn(3, '-');
        let (Some(year), Some(month), Some(day)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        if year.len() != 4 || month.len() != 2 || day.len() != 2 {
            return Err(invalid());
        }

        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month
            .parse::<u8>()
            .ok()
            .and_then(|value| Month::try_from(value).ok())
            .ok_or_else(invalid)?;
        let day = day.parse::<u8>().map_err(|_| invalid())?;

        Date::from_calendar_date(year, month, day)
            .map(Self)
            .map_err(|_| invalid())
    }

    pub fn from_date(date: Date) -> Self {
        Self(date)
    }

    pub fn into_inner(self) -> Date {
        self.0
    }

    pub fn format(self) -> String {
        format!(
            "{:04}-{:02}-{:02}",
            self.0.year(),
            u8::from(self.0.month()),
            self.0.day()
        )
    }
}

impl TryFrom<String> for IsoDate {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<IsoDate> for String {
    fn from(value: IsoDate) -> Self {
        value.format()
    }
}

/// Optional narrowing applied identically by the live and synthetic paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestFilters {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub grade: Option<Grade>,
    pub from_date: Option<IsoDate>,
    pub to_date: Option<IsoDate>,
    pub lookup_table: Option<LookupTable>,
}

impl RequestFilters {
    /// Query parameters forwarded to the upstream for these filters.
    pub fn to_query_params(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        if let Some(page) = self.page {
            params.insert(String::from("page"), page.to_string());
        }
        if let Some(page_size) = self.page_size {
            params.insert(String::from("pageSize"), page_size.to_string());
        }
        if let Some(grade) = self.grade {
            params.insert(String::from("grade"), grade.to_string());
        }
        if let Some(from) = self.from_date {
            params.insert(String::from("from"), from.format());
        }
        if let Some(to) = self.to_date {
            params.insert(String::from("to"), to.format());
        }
        params
    }

    /// Returns the window of `items` selected by page and page size.
    ///
    /// Without a page size the whole list is returned. Pages are 1-based.
    pub fn paginate<T>(&self, items: Vec<T>) -> Vec<T> {
        let Some(page_size) = self.page_size else {
            return items;
        };
        let page = self.page.unwrap_or(1).max(1);
        let skip = (page as usize - 1).saturating_mul(page_size as usize);
        items
            .into_iter()
            .skip(skip)
            .take(page_size as usize)
            .collect()
    }

    pub fn date_in_range(&self, date: IsoDate) -> bool {
        self.from_date.map_or(true, |from| date >= from)
            && self.to_date.map_or(true, |to| date <= to)
    }
}

/// Describes one logical read: what, for which school, narrowed how.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub entity: EntityType,
    pub scope_id: String,
    pub filters: RequestFilters,
}

impl RequestDescriptor {
    pub fn new(entity: EntityType, scope_id: impl Into<String>) -> Result<Self, ValidationError> {
        let scope_id = validate_scope(scope_id.into())?;
        Ok(Self {
            entity,
            scope_id,
            filters: RequestFilters::default(),
        })
    }

    /// Lookup tables are global; the scope only partitions cache entries.
    pub fn lookup(table: LookupTable, scope_id: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(EntityType::Lookups, scope_id).map(|descriptor| descriptor.with_lookup_table(table))
    }

    pub fn with_page(mut self, page: u32, page_size: u32) -> Result<Self, ValidationError> {
        check_page(Some(page), Some(page_size))?;
        self.filters.page = Some(page);
        self.filters.page_size = Some(page_size);
        Ok(self)
    }

    pub fn with_grade(mut self, grade: Grade) -> Self {
        self.filters.grade = Some(grade);
        self
    }

    pub fn with_date_range(
        mut self,
        from: Option<IsoDate>,
        to: Option<IsoDate>,
    ) -> Result<Self, ValidationError> {
        check_date_range(from, to)?;
        self.filters.from_date = from;
        self.filters.to_date = to;
        Ok(self)
    }

    pub fn with_lookup_table(mut self, table: LookupTable) -> Self {
        self.filters.lookup_table = Some(table);
        self
    }

    /// Re-checks every rule the builders enforce, plus the cross-field ones.
    ///
    /// Fields are public, so a descriptor may not have come through the
    /// builders; this is what every read runs before routing.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_scope(&self.scope_id)?;
        check_page(self.filters.page, self.filters.page_size)?;
        check_date_range(self.filters.from_date, self.filters.to_date)?;
        if self.entity == EntityType::Lookups && self.filters.lookup_table.is_none() {
            return Err(ValidationError::MissingLookupTable);
        }
        Ok(())
    }

    /// Deterministic cache key for this descriptor inside `namespace`.
    ///
    /// The namespace keeps entries served under different modes apart.
    pub fn cache_key(&self, prefix: &str, namespace: &str) -> String {
        format!(
            "{prefix}{namespace}:{}:{}",
            self.entity,
            self.fingerprint()
        )
    }

    /// SHA-256 over the canonical JSON form of the descriptor.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_else(|_| {
            format!("{}|{}|{:?}", self.entity, self.scope_id, self.filters).into_bytes()
        });
        hex::encode(Sha256::digest(canonical))
    }
}

fn validate_scope(scope: String) -> Result<String, ValidationError> {
    let scope = scope.trim().to_owned();
    check_scope(&scope)?;
    Ok(scope)
}

fn check_scope(scope: &str) -> Result<(), ValidationError> {
    if scope.trim().is_empty() {
        return Err(ValidationError::EmptyScope);
    }
    if scope.len() > MAX_SCOPE_LEN {
        return Err(ValidationError::ScopeTooLong {
            len: scope.len(),
            max: MAX_SCOPE_LEN,
        });
    }
    if let Some((index, ch)) = scope
        .chars()
        .enumerate()
        .find(|(_, ch)| !(ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_')))
    {
        return Err(ValidationError::ScopeInvalidChar { ch, index });
    }
    Ok(())
}

fn check_page(page: Option<u32>, page_size: Option<u32>) -> Result<(), ValidationError> {
    if page == Some(0) {
        return Err(ValidationError::InvalidPage);
    }
    match page_size {
        Some(value) if value == 0 || value > MAX_PAGE_SIZE => Err(ValidationError::InvalidPageSize {
            value,
            max: MAX_PAGE_SIZE,
        }),
        None if page.is_some() => Err(ValidationError::PageSizeRequired),
        _ => Ok(()),
    }
}

fn check_date_range(from: Option<IsoDate>, to: Option<IsoDate>) -> Result<(), ValidationError> {
    match (from, to) {
        (Some(from), Some(to)) if from > to => Err(ValidationError::InvalidDateRange {
            from: from.format(),
            to: to.format(),
        }),
        _ => Ok(()),
    }
}
