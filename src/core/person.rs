use crate::core::{EngineError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Wire format for dates of birth (day/month/year).
pub const DOB_FORMAT: &str = "%d/%m/%Y";

/// Text form of the zero date, the legacy "leave unchanged" marker.
pub const DOB_UNSET_SENTINEL: &str = "01/01/0001";

/// Calendar date of birth, rendered as `DD/MM/YYYY` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateOfBirth(NaiveDate);

impl DateOfBirth {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| {
                EngineError::Validation(format!("invalid date {year:04}-{month:02}-{day:02}"))
            })
    }

    /// The zero date (`01/01/0001`).
    pub fn unset_sentinel() -> Self {
        Self(NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN))
    }

    pub fn is_unset_sentinel(&self) -> bool {
        self.0.year() == 1 && self.0.ordinal() == 1
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for DateOfBirth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DOB_FORMAT))
    }
}

impl FromStr for DateOfBirth {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        NaiveDate::parse_from_str(s.trim(), DOB_FORMAT)
            .map(Self)
            .map_err(|err| {
                EngineError::Validation(format!(
                    "dateOfBirth '{s}' is not a DD/MM/YYYY date: {err}"
                ))
            })
    }
}

impl Serialize for DateOfBirth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DateOfBirth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A stored person record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub date_of_birth: Option<DateOfBirth>,
}

impl Person {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        date_of_birth: Option<DateOfBirth>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            date_of_birth,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|err| EngineError::Internal(err.to_string()))
    }

    /// Decodes a stored payload. Undecodable bytes are reported as
    /// [`EngineError::Internal`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Change requested for one field of a partial update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate<T> {
    /// Keep the stored value.
    Unchanged,
    /// Reset the field to its empty value.
    Cleared,
    /// Overwrite with a new value.
    Set(T),
}

impl<T> Default for FieldUpdate<T> {
    fn default() -> Self {
        Self::Unchanged
    }
}

impl<T> FieldUpdate<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }
}

/// Partial update of a [`Person`]: the identifier plus one [`FieldUpdate`]
/// per mutable field.
///
/// JSON decoding keeps the legacy sentinels: a missing key, `""` for text
/// fields and `"01/01/0001"` for `dateOfBirth` all mean
/// [`FieldUpdate::Unchanged`]. An explicit `null` means
/// [`FieldUpdate::Cleared`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "PersonPatchWire")]
pub struct PersonPatch {
    pub id: String,
    pub name: FieldUpdate<String>,
    pub address: FieldUpdate<String>,
    pub date_of_birth: FieldUpdate<DateOfBirth>,
}

impl PersonPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Builds a patch from a sentinel-carrying record, where empty text and
    /// the zero date mean "no change".
    pub fn from_partial(partial: Person) -> Self {
        Self {
            id: partial.id,
            name: text_update(Some(partial.name)),
            address: text_update(Some(partial.address)),
            date_of_birth: match partial.date_of_birth {
                Some(dob) if !dob.is_unset_sentinel() => FieldUpdate::Set(dob),
                _ => FieldUpdate::Unchanged,
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = text_update(Some(name.into()));
        self
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = text_update(Some(address.into()));
        self
    }

    pub fn date_of_birth(mut self, date_of_birth: DateOfBirth) -> Self {
        self.date_of_birth = date_update(Some(date_of_birth));
        self
    }

    pub fn clear_name(mut self) -> Self {
        self.name = FieldUpdate::Cleared;
        self
    }

    pub fn clear_address(mut self) -> Self {
        self.address = FieldUpdate::Cleared;
        self
    }

    pub fn clear_date_of_birth(mut self) -> Self {
        self.date_of_birth = FieldUpdate::Cleared;
        self
    }

    /// True when applying the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_unchanged() && self.address.is_unchanged() && self.date_of_birth.is_unchanged()
    }

    /// Rejects patches that cannot address a record.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::Validation("Missing person ID".to_string()));
        }
        Ok(())
    }
}

impl From<Person> for PersonPatch {
    fn from(partial: Person) -> Self {
        Self::from_partial(partial)
    }
}

fn text_update(value: Option<String>) -> FieldUpdate<String> {
    match value {
        None => FieldUpdate::Cleared,
        Some(text) if text.is_empty() => FieldUpdate::Unchanged,
        Some(text) => FieldUpdate::Set(text),
    }
}

fn date_update(value: Option<DateOfBirth>) -> FieldUpdate<DateOfBirth> {
    match value {
        None => FieldUpdate::Cleared,
        Some(dob) if dob.is_unset_sentinel() => FieldUpdate::Unchanged,
        Some(dob) => FieldUpdate::Set(dob),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersonPatchWire {
    #[serde(default)]
    id: String,
    #[serde(default, deserialize_with = "present")]
    name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    address: Option<Option<String>>,
    #[serde(default, deserialize_with = "present_date")]
    date_of_birth: Option<Option<DateOfBirth>>,
}

impl From<PersonPatchWire> for PersonPatch {
    fn from(wire: PersonPatchWire) -> Self {
        Self {
            id: wire.id,
            name: wire.name.map(text_update).unwrap_or_default(),
            address: wire.address.map(text_update).unwrap_or_default(),
            date_of_birth: wire.date_of_birth.map(date_update).unwrap_or_default(),
        }
    }
}

// Distinguishes a present `null` (Some(None)) from a missing key (None).
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// As `present`, with an empty string read as the zero date.
fn present_date<'de, D>(deserializer: D) -> std::result::Result<Option<Option<DateOfBirth>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(Some(None)),
        Some(raw) if raw.trim().is_empty() => Ok(Some(Some(DateOfBirth::unset_sentinel()))),
        Some(raw) => raw
            .parse()
            .map(|dob| Some(Some(dob)))
            .map_err(serde::de::Error::custom),
    }
}
