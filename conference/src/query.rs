//! Conference filter compiler.
//!
//! Turns user-supplied `(field, operator, value)` triples into a store
//! [`Query`] over conferences.
//!
//! The backing store serves range predicates on a single property per query
//! and requires ordered queries to sort on that property first. The compiler
//! enforces both up front:
//!
//! 1. every operator except `EQ` is an inequality
//! 2. the first inequality fixes the inequality field; an inequality on any
//!    other field fails with [`ConferenceError::MultipleInequalityFields`]
//! 3. results are ordered by the inequality field (if any), then by name
//!
//! Numeric fields (`MONTH`, `MAX_ATTENDEES`) take integer values; anything
//! that does not parse as one fails with [`ConferenceError::InvalidFilter`].
//! Redundant filters are passed through as given.
//!
//! ```
//! use conference::query::{ConferenceFilter, compile};
//!
//! let query = compile(&[
//!     ConferenceFilter::new("MONTH", "GT", "3"),
//!     ConferenceFilter::new("CITY", "EQ", "Paris"),
//! ])?;
//!
//! assert_eq!(query.inequality_property(), Some("month"));
//! assert_eq!(query.orders[0].property, "month");
//! assert_eq!(query.orders[1].property, "name");
//! # Ok::<(), conference::ConferenceError>(())
//! ```

use crate::error::{ConferenceError, Result};
use crate::models::Conference;
use conference_core::entity_store::{Entity, FilterOp, Query};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Raw filter triple as received from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceFilter {
    /// `CITY`, `TOPIC`, `MONTH` or `MAX_ATTENDEES`.
    pub field: String,
    /// `EQ`, `GT`, `GTEQ`, `LT`, `LTEQ` or `NE`.
    pub operator: String,
    /// Right-hand side, as text.
    pub value: String,
}

impl ConferenceFilter {
    /// Build a filter triple.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

/// Filterable conference field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    /// `CITY` → `city`
    City,
    /// `TOPIC` → `topics` (matches any topic)
    Topic,
    /// `MONTH` → `month`
    Month,
    /// `MAX_ATTENDEES` → `max_attendees`
    MaxAttendees,
}

impl FilterField {
    /// Stored property name.
    #[must_use]
    pub const fn property(self) -> &'static str {
        match self {
            Self::City => "city",
            Self::Topic => "topics",
            Self::Month => "month",
            Self::MaxAttendees => "max_attendees",
        }
    }

    const fn is_numeric(self) -> bool {
        matches!(self, Self::Month | Self::MaxAttendees)
    }
}

impl FromStr for FilterField {
    type Err = ConferenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CITY" => Ok(Self::City),
            "TOPIC" => Ok(Self::Topic),
            "MONTH" => Ok(Self::Month),
            "MAX_ATTENDEES" => Ok(Self::MaxAttendees),
            other => Err(ConferenceError::InvalidFilter(format!("unknown field '{other}'"))),
        }
    }
}

/// Filter operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// `EQ`
    Eq,
    /// `GT`
    Gt,
    /// `GTEQ`
    GtEq,
    /// `LT`
    Lt,
    /// `LTEQ`
    LtEq,
    /// `NE`
    Ne,
}

impl FilterOperator {
    /// Store operator.
    #[must_use]
    pub const fn op(self) -> FilterOp {
        match self {
            Self::Eq => FilterOp::Equal,
            Self::Gt => FilterOp::GreaterThan,
            Self::GtEq => FilterOp::GreaterThanOrEqual,
            Self::Lt => FilterOp::LessThan,
            Self::LtEq => FilterOp::LessThanOrEqual,
            Self::Ne => FilterOp::NotEqual,
        }
    }

    /// Everything but `EQ`.
    #[must_use]
    pub const fn is_inequality(self) -> bool {
        !matches!(self, Self::Eq)
    }
}

impl FromStr for FilterOperator {
    type Err = ConferenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "EQ" => Ok(Self::Eq),
            "GT" => Ok(Self::Gt),
            "GTEQ" => Ok(Self::GtEq),
            "LT" => Ok(Self::Lt),
            "LTEQ" => Ok(Self::LtEq),
            "NE" => Ok(Self::Ne),
            other => Err(ConferenceError::InvalidFilter(format!(
                "unknown operator '{other}'"
            ))),
        }
    }
}

/// A validated, typed filter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFilter {
    /// Field.
    pub field: FilterField,
    /// Operator.
    pub operator: FilterOperator,
    /// Coerced value.
    pub value: Value,
}

impl TryFrom<&ConferenceFilter> for ParsedFilter {
    type Error = ConferenceError;

    fn try_from(raw: &ConferenceFilter) -> Result<Self> {
        let field: FilterField = raw.field.parse()?;
        let operator: FilterOperator = raw.operator.parse()?;
        let value = if field.is_numeric() {
            let number: i64 = raw.value.trim().parse().map_err(|_| {
                ConferenceError::InvalidFilter(format!(
                    "{} requires an integer, got '{}'",
                    raw.field, raw.value
                ))
            })?;
            Value::from(number)
        } else {
            Value::from(raw.value.as_str())
        };
        Ok(Self {
            field,
            operator,
            value,
        })
    }
}

/// Parse `filters` and return them with the inequality field, if any.
///
/// # Errors
///
/// [`ConferenceError::InvalidFilter`] for unknown fields, operators or
/// non-integer numeric values; [`ConferenceError::MultipleInequalityFields`]
/// when inequalities span two fields.
pub fn parse_filters(
    filters: &[ConferenceFilter],
) -> Result<(Option<FilterField>, Vec<ParsedFilter>)> {
    let mut inequality_field: Option<FilterField> = None;
    let mut parsed = Vec::with_capacity(filters.len());

    for raw in filters {
        let filter = ParsedFilter::try_from(raw)?;
        if filter.operator.is_inequality() {
            match inequality_field {
                Some(field) if field != filter.field => {
                    return Err(ConferenceError::MultipleInequalityFields {
                        first: field.property().to_string(),
                        second: filter.field.property().to_string(),
                    });
                }
                Some(_) => {}
                None => inequality_field = Some(filter.field),
            }
        }
        parsed.push(filter);
    }

    Ok((inequality_field, parsed))
}

/// Compile `filters` into an ordered conference query.
///
/// # Errors
///
/// See [`parse_filters`].
pub fn compile(filters: &[ConferenceFilter]) -> Result<Query> {
    let (inequality_field, parsed) = parse_filters(filters)?;

    let mut query = Query::new(Conference::KIND);
    if let Some(field) = inequality_field {
        query = query.order_by(field.property());
    }
    query = query.order_by(Conference::NAME);

    for filter in parsed {
        query = query.filter(filter.field.property(), filter.operator.op(), filter.value);
    }

    tracing::debug!(
        filters = query.filters.len(),
        inequality = ?inequality_field.map(FilterField::property),
        "Compiled conference query"
    );
    Ok(query)
}
