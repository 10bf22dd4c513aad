// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Filter spec parsing.
//!
//! A query is described by seven positional tokens:
//!
//! | # | token | example |
//! |---|-------|---------|
//! | 0 | pickup lower bound (inclusive) | `2025-06-01 00:00:00` |
//! | 1 | dropoff upper bound (inclusive) | `2025-06-30 23:59:59` |
//! | 2 | pickup location id | `132` |
//! | 3 | dropoff location id | `236` |
//! | 4 | group by payment type | `true` / `false` |
//! | 5 | vendor id | `2` |
//! | 6 | taxi type | `yellow` / `green` |
//!
//! Any token except the flag may be [`WILDCARD`], which leaves the field
//! unconstrained. The taxi type also accepts `both` for the same purpose.

use chrono::NaiveDateTime;

use crate::error::{Error, Result};
use crate::schema::TaxiType;

/// Token meaning "no constraint on this field".
pub const WILDCARD: &str = "*";

/// Taxi type token equivalent to the wildcard.
pub const BOTH_TAXI_TYPES: &str = "both";

/// Number of positional filter tokens.
pub const TOKEN_COUNT: usize = 7;

/// Textual datetime format accepted for the range tokens.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One filterable field: either unconstrained or pinned to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Constraint<T> {
    #[default]
    Unconstrained,
    Value(T),
}

impl<T> Constraint<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Constraint::Unconstrained => None,
            Constraint::Value(v) => Some(v),
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        matches!(self, Constraint::Unconstrained)
    }
}

/// Validated query constraints. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterSpec {
    pickup_from: Constraint<NaiveDateTime>,
    dropoff_until: Constraint<NaiveDateTime>,
    pickup_location: Constraint<i64>,
    dropoff_location: Constraint<i64>,
    vendor: Constraint<i64>,
    taxi_type: Constraint<TaxiType>,
    group_by_payment: bool,
}

impl FilterSpec {
    /// Parse the seven positional tokens. Performs no I/O.
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self> {
        if tokens.len() != TOKEN_COUNT {
            return Err(Error::WrongArity {
                expected: TOKEN_COUNT,
                found: tokens.len(),
            });
        }
        let t = |i: usize| tokens[i].as_ref();

        Ok(Self {
            pickup_from: parse_datetime("pickup_datetime", t(0))?,
            dropoff_until: parse_datetime("dropoff_datetime", t(1))?,
            pickup_location: parse_id("pu_location_id", t(2))?,
            dropoff_location: parse_id("do_location_id", t(3))?,
            group_by_payment: parse_flag(t(4))?,
            vendor: parse_id("vendor_id", t(5))?,
            taxi_type: parse_taxi_type(t(6))?,
        })
    }

    /// Everything unconstrained, no grouping.
    pub fn builder() -> FilterSpecBuilder {
        FilterSpecBuilder::default()
    }

    pub fn pickup_from(&self) -> Constraint<NaiveDateTime> {
        self.pickup_from
    }

    pub fn dropoff_until(&self) -> Constraint<NaiveDateTime> {
        self.dropoff_until
    }

    pub fn pickup_location(&self) -> Constraint<i64> {
        self.pickup_location
    }

    pub fn dropoff_location(&self) -> Constraint<i64> {
        self.dropoff_location
    }

    pub fn vendor(&self) -> Constraint<i64> {
        self.vendor
    }

    pub fn taxi_type(&self) -> Constraint<TaxiType> {
        self.taxi_type
    }

    pub fn group_by_payment(&self) -> bool {
        self.group_by_payment
    }

    /// True when both bounds are set and the lower bound is after the upper.
    pub fn is_empty_range(&self) -> bool {
        match (self.pickup_from, self.dropoff_until) {
            (Constraint::Value(start), Constraint::Value(end)) => start > end,
            _ => false,
        }
    }
}

/// Programmatic construction of a [`FilterSpec`].
#[derive(Debug, Clone, Default)]
pub struct FilterSpecBuilder {
    spec: FilterSpec,
}

impl FilterSpecBuilder {
    pub fn pickup_from(mut self, at: NaiveDateTime) -> Self {
        self.spec.pickup_from = Constraint::Value(at);
        self
    }

    pub fn dropoff_until(mut self, at: NaiveDateTime) -> Self {
        self.spec.dropoff_until = Constraint::Value(at);
        self
    }

    pub fn pickup_location(mut self, id: i64) -> Self {
        self.spec.pickup_location = Constraint::Value(id);
        self
    }

    pub fn dropoff_location(mut self, id: i64) -> Self {
        self.spec.dropoff_location = Constraint::Value(id);
        self
    }

    pub fn vendor(mut self, id: i64) -> Self {
        self.spec.vendor = Constraint::Value(id);
        self
    }

    pub fn taxi_type(mut self, taxi_type: TaxiType) -> Self {
        self.spec.taxi_type = Constraint::Value(taxi_type);
        self
    }

    pub fn group_by_payment(mut self, flag: bool) -> Self {
        self.spec.group_by_payment = flag;
        self
    }

    pub fn build(self) -> FilterSpec {
        self.spec
    }
}

fn parse_datetime(field: &'static str, token: &str) -> Result<Constraint<NaiveDateTime>> {
    if token == WILDCARD {
        return Ok(Constraint::Unconstrained);
    }
    NaiveDateTime::parse_from_str(token, DATETIME_FORMAT)
        .map(Constraint::Value)
        .map_err(|_| Error::InvalidDateFormat {
            field,
            value: token.to_string(),
        })
}

fn parse_id(field: &'static str, token: &str) -> Result<Constraint<i64>> {
    if token == WILDCARD {
        return Ok(Constraint::Unconstrained);
    }
    // Digits only: no sign, no whitespace
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidIdentifier {
            field,
            value: token.to_string(),
        });
    }
    token
        .parse::<u32>()
        .map(|id| Constraint::Value(i64::from(id)))
        .map_err(|_| Error::InvalidIdentifier {
            field,
            value: token.to_string(),
        })
}

fn parse_flag(token: &str) -> Result<bool> {
    if token.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if token.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(Error::InvalidFlag(token.to_string()))
    }
}

fn parse_taxi_type(token: &str) -> Result<Constraint<TaxiType>> {
    if token == WILDCARD || token.eq_ignore_ascii_case(BOTH_TAXI_TYPES) {
        return Ok(Constraint::Unconstrained);
    }
    TaxiType::parse(token)
        .map(Constraint::Value)
        .ok_or_else(|| Error::InvalidCategory(token.to_string()))
}
