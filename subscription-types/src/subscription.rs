use crate::{month_start, parse_month};
use derive_more::{Display, Error};
use serde_json::{Map, Value};
use std::str::FromStr;
use time::Date;
use typesafe_repository::macros::Id;
use typesafe_repository::{GetIdentity, Identity, IdentityOf, RefIdentity};
use uuid::Uuid;

pub mod repository;
pub mod service;

#[derive(Id, Debug, Clone, Default, PartialEq, Eq)]
#[Id(get_id, ref_id)]
pub struct Subscription {
    #[id]
    pub subscription_id: Uuid,
    pub service_name: String,
    /// Minor currency units
    pub price: i32,
    pub user_id: Uuid,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
}

impl Subscription {
    pub fn new(
        service_name: String,
        price: i32,
        user_id: Uuid,
        start_date: Date,
        end_date: Option<Date>,
    ) -> Self {
        Self {
            subscription_id: Uuid::nil(),
            service_name,
            price,
            user_id,
            start_date: Some(month_start(start_date)),
            end_date: end_date.map(month_start),
        }
    }

    pub fn with_id(mut self, id: IdentityOf<Self>) -> Self {
        self.subscription_id = id;
        self
    }
}

#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[display("price must be greater than zero")]
    NonPositivePrice,
    #[display("start date is not set")]
    MissingStartDate,
    #[display("end date precedes start date")]
    EndBeforeStart,
}

pub fn validate(sub: &Subscription) -> Result<(), ValidationError> {
    if sub.price <= 0 {
        return Err(ValidationError::NonPositivePrice);
    }
    let start = sub.start_date.ok_or(ValidationError::MissingStartDate)?;
    match sub.end_date {
        Some(end) if end < start => Err(ValidationError::EndBeforeStart),
        _ => Ok(()),
    }
}

pub fn is_valid(sub: &Subscription) -> bool {
    validate(sub).is_ok()
}

/// Columns a partial update is allowed to touch.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PatchField {
    #[display("service_name")]
    ServiceName,
    #[display("price")]
    Price,
    #[display("end_date")]
    EndDate,
}

impl PatchField {
    pub const ALL: [PatchField; 3] = [Self::ServiceName, Self::Price, Self::EndDate];

    pub fn column(&self) -> &'static str {
        match self {
            Self::ServiceName => "service_name",
            Self::Price => "price",
            Self::EndDate => "end_date",
        }
    }
}

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ChangeSetError {
    #[display("field '{_0}' cannot be updated")]
    #[error(ignore)]
    DisallowedField(String),
    #[display("invalid value for field '{field}': {msg}")]
    #[error(ignore)]
    InvalidValue { field: PatchField, msg: String },
}

impl FromStr for PatchField {
    type Err = ChangeSetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.column() == s)
            .ok_or_else(|| ChangeSetError::DisallowedField(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchValue {
    Text(String),
    Integer(i32),
    Date(Date),
}

/// Change-set of a partial update. Every slot maps to one allow-listed column;
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChanges {
    pub service_name: Option<String>,
    pub price: Option<i32>,
    pub end_date: Option<Date>,
}

impl SubscriptionChanges {
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Supplied fields in column order.
    pub fn fields(&self) -> Vec<(PatchField, PatchValue)> {
        let mut res = vec![];
        if let Some(name) = &self.service_name {
            res.push((PatchField::ServiceName, PatchValue::Text(name.clone())));
        }
        if let Some(price) = self.price {
            res.push((PatchField::Price, PatchValue::Integer(price)));
        }
        if let Some(end) = self.end_date {
            res.push((PatchField::EndDate, PatchValue::Date(end)));
        }
        res
    }

    pub fn apply_to(&self, sub: &mut Subscription) {
        if let Some(name) = &self.service_name {
            sub.service_name = name.clone();
        }
        if let Some(price) = self.price {
            sub.price = price;
        }
        if let Some(end) = self.end_date {
            sub.end_date = Some(end);
        }
    }
}

impl From<&Subscription> for SubscriptionChanges {
    fn from(partial: &Subscription) -> Self {
        Self {
            service_name: Some(partial.service_name.clone()).filter(|s| !s.is_empty()),
            price: Some(partial.price).filter(|p| *p != 0),
            end_date: partial.end_date.map(month_start),
        }
    }
}

impl TryFrom<Map<String, Value>> for SubscriptionChanges {
    type Error = ChangeSetError;

    fn try_from(body: Map<String, Value>) -> Result<Self, Self::Error> {
        let fields = body
            .into_iter()
            .map(|(k, v)| k.parse::<PatchField>().map(|f| (f, v)))
            .collect::<Result<Vec<_>, _>>()?;
        let mut changes = Self::default();
        for (field, value) in fields {
            let invalid = |msg: &str| ChangeSetError::InvalidValue {
                field,
                msg: msg.to_string(),
            };
            match (field, value) {
                (_, Value::Null) => {}
                (PatchField::ServiceName, Value::String(s)) => {
                    changes.service_name = Some(s).filter(|s| !s.is_empty());
                }
                (PatchField::Price, Value::Number(n)) => {
                    let price = n
                        .as_i64()
                        .and_then(|n| i32::try_from(n).ok())
                        .ok_or_else(|| invalid("expected 32-bit integer"))?;
                    changes.price = Some(price).filter(|p| *p != 0);
                }
                (PatchField::EndDate, Value::String(s)) if s.is_empty() => {}
                (PatchField::EndDate, Value::String(s)) => {
                    changes.end_date =
                        Some(parse_month(&s).map_err(|err| invalid(&err.to_string()))?);
                }
                (PatchField::ServiceName | PatchField::EndDate, _) => {
                    return Err(invalid("expected string"))
                }
                (PatchField::Price, _) => return Err(invalid("expected integer")),
            }
        }
        Ok(changes)
    }
}

/// Listing criteria. `user_id` is always applied, the rest only when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionFilter {
    pub user_id: Uuid,
    pub service_name: Option<String>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
}

impl SubscriptionFilter {
    pub fn new(
        service_name: &str,
        user_id: Uuid,
        start_date: Option<Date>,
        end_date: Option<Date>,
    ) -> Self {
        Self {
            user_id,
            service_name: Some(service_name.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            start_date: start_date.map(month_start),
            end_date: end_date.map(month_start),
        }
    }

    pub fn for_user(user_id: Uuid) -> Self {
        Self::new("", user_id, None, None)
    }

    pub fn matches(&self, sub: &Subscription) -> bool {
        if sub.user_id != self.user_id {
            return false;
        }
        if let Some(name) = &self.service_name {
            if &sub.service_name != name {
                return false;
            }
        }
        if let Some(start) = self.start_date {
            if !sub.start_date.is_some_and(|d| d >= start) {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if !sub.end_date.is_some_and(|d| d <= end) {
                return false;
            }
        }
        true
    }
}
