//! Parameterized statements whose clause count depends on the request.
//!
//! Column names come only from [`Column`]; every value is bound as a `$n`
//! placeholder numbered in the order it was pushed.

use subscription_types::subscription::{
    PatchField, PatchValue, Subscription, SubscriptionChanges, SubscriptionFilter,
};
use tokio_postgres::types::ToSql;
use typesafe_repository::IdentityOf;

pub type Param = Box<dyn ToSql + Sync + Send>;

pub const TABLE: &str = "subscription";
pub const COLUMNS: &str = "subscription_id, service_name, price, user_id, start_date, end_date";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    SubscriptionId,
    ServiceName,
    Price,
    UserId,
    StartDate,
    EndDate,
}

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubscriptionId => "subscription_id",
            Self::ServiceName => "service_name",
            Self::Price => "price",
            Self::UserId => "user_id",
            Self::StartDate => "start_date",
            Self::EndDate => "end_date",
        }
    }
}

impl From<PatchField> for Column {
    fn from(f: PatchField) -> Self {
        match f {
            PatchField::ServiceName => Self::ServiceName,
            PatchField::Price => Self::Price,
            PatchField::EndDate => Self::EndDate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Gte,
    Lte,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gte => ">=",
            Self::Lte => "<=",
        }
    }
}

pub struct Clause {
    pub column: Column,
    pub operator: Operator,
    pub value: Param,
}

impl Clause {
    pub fn new<T: ToSql + Sync + Send + 'static>(
        column: Column,
        operator: Operator,
        value: T,
    ) -> Self {
        Self {
            column,
            operator,
            value: Box::new(value),
        }
    }
}

fn patch_param(value: PatchValue) -> Param {
    match value {
        PatchValue::Text(s) => Box::new(s),
        PatchValue::Integer(i) => Box::new(i),
        PatchValue::Date(d) => Box::new(d),
    }
}

#[derive(Default)]
pub struct Query {
    sql: String,
    params: Vec<Param>,
}

impl Query {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| &**p as &(dyn ToSql + Sync))
            .collect()
    }

    /// Stores `value` and returns its placeholder.
    fn bind(&mut self, value: Param) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    fn condition(&mut self, clause: Clause) -> String {
        let Clause {
            column,
            operator,
            value,
        } = clause;
        let placeholder = self.bind(value);
        format!("{} {} {placeholder}", column.name(), operator.as_str())
    }
}

pub fn list_clauses(filter: &SubscriptionFilter) -> Vec<Clause> {
    let mut clauses = vec![Clause::new(Column::UserId, Operator::Eq, filter.user_id)];
    if let Some(name) = &filter.service_name {
        clauses.push(Clause::new(Column::ServiceName, Operator::Eq, name.clone()));
    }
    if let Some(start) = filter.start_date {
        clauses.push(Clause::new(Column::StartDate, Operator::Gte, start));
    }
    if let Some(end) = filter.end_date {
        clauses.push(Clause::new(Column::EndDate, Operator::Lte, end));
    }
    clauses
}

pub fn list_query(filter: &SubscriptionFilter) -> Query {
    let mut query = Query::default();
    let mut conditions = vec![];
    for clause in list_clauses(filter) {
        conditions.push(query.condition(clause));
    }
    query.sql = format!(
        "SELECT {COLUMNS} FROM {TABLE} WHERE {} ORDER BY start_date, subscription_id",
        conditions.join(" AND ")
    );
    query
}

/// `None` when there is nothing to write.
pub fn patch_query(id: IdentityOf<Subscription>, changes: &SubscriptionChanges) -> Option<Query> {
    let fields = changes.fields();
    if fields.is_empty() {
        return None;
    }
    let mut query = Query::default();
    let id = query.bind(Box::new(id));
    let mut assignments = vec![];
    for (field, value) in fields {
        let placeholder = query.bind(patch_param(value));
        assignments.push(format!("{} = {placeholder}", Column::from(field).name()));
    }
    query.sql = format!(
        "UPDATE {TABLE} SET {} WHERE {} = {id} RETURNING {COLUMNS}",
        assignments.join(", "),
        Column::SubscriptionId.name(),
    );
    Some(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;
    use uuid::Uuid;

    #[test]
    fn list_always_filters_by_user() {
        let q = list_query(&SubscriptionFilter::for_user(Uuid::new_v4()));
        assert_eq!(
            q.sql(),
            "SELECT subscription_id, service_name, price, user_id, start_date, end_date \
             FROM subscription WHERE user_id = $1 ORDER BY start_date, subscription_id"
        );
        assert_eq!(q.params().len(), 1);
    }

    #[test]
    fn list_numbers_placeholders_incrementally() {
        let filter = SubscriptionFilter::new(
            "Netflix",
            Uuid::new_v4(),
            Some(date!(2024 - 01 - 01)),
            Some(date!(2024 - 12 - 01)),
        );
        let q = list_query(&filter);
        assert!(q.sql().contains(
            "WHERE user_id = $1 AND service_name = $2 AND start_date >= $3 AND end_date <= $4 "
        ));
        assert_eq!(q.params().len(), 4);
    }

    #[test]
    fn list_filters_compose_independently() {
        let user = Uuid::new_v4();
        let q = list_query(&SubscriptionFilter::new(
            "",
            user,
            None,
            Some(date!(2024 - 12 - 01)),
        ));
        assert!(q.sql().contains("WHERE user_id = $1 AND end_date <= $2 "));
        assert_eq!(q.params().len(), 2);

        let q = list_query(&SubscriptionFilter::new(
            "Hulu",
            user,
            Some(date!(2024 - 01 - 01)),
            None,
        ));
        assert!(q
            .sql()
            .contains("WHERE user_id = $1 AND service_name = $2 AND start_date >= $3 "));
        assert_eq!(q.params().len(), 3);
    }

    #[test]
    fn patch_sets_only_supplied_columns() {
        let changes = SubscriptionChanges {
            service_name: Some("X".to_string()),
            ..Default::default()
        };
        let q = patch_query(Uuid::new_v4(), &changes).unwrap();
        assert_eq!(
            q.sql(),
            "UPDATE subscription SET service_name = $2 WHERE subscription_id = $1 \
             RETURNING subscription_id, service_name, price, user_id, start_date, end_date"
        );
        assert_eq!(q.params().len(), 2);
    }

    #[test]
    fn patch_orders_columns_stably() {
        let changes = SubscriptionChanges {
            service_name: Some("X".to_string()),
            price: Some(1099),
            end_date: Some(date!(2025 - 01 - 01)),
        };
        let q = patch_query(Uuid::new_v4(), &changes).unwrap();
        assert!(q
            .sql()
            .starts_with("UPDATE subscription SET service_name = $2, price = $3, end_date = $4 "));
        assert_eq!(q.params().len(), 4);
    }

    #[test]
    fn empty_patch_builds_nothing() {
        assert!(patch_query(Uuid::new_v4(), &SubscriptionChanges::default()).is_none());
    }
}
