use crate::subscription::query::{list_query, patch_query};
use crate::{row_stream_to_vec, SqlWrapper};
use async_trait::async_trait;
use std::sync::Arc;
use subscription_types::subscription::repository::{RepositoryError, SubscriptionRepository};
use subscription_types::subscription::{Subscription, SubscriptionChanges, SubscriptionFilter};
use tokio_postgres::{Client, Row};
use typesafe_repository::async_ops::{Add, Get, Remove, Select};
use typesafe_repository::{IdentityOf, Repository};

impl TryFrom<Row> for SqlWrapper<Subscription> {
    type Error = anyhow::Error;

    fn try_from(r: Row) -> Result<Self, Self::Error> {
        Ok(SqlWrapper(Subscription {
            subscription_id: r.try_get("subscription_id")?,
            service_name: r.try_get("service_name")?,
            price: r.try_get("price")?,
            user_id: r.try_get("user_id")?,
            start_date: r.try_get("start_date")?,
            end_date: r.try_get("end_date")?,
        }))
    }
}

fn from_row(r: Row) -> Result<Subscription, RepositoryError> {
    SqlWrapper::<Subscription>::from_sql(r).map_err(RepositoryError::Persistence)
}

pub struct PostgresSubscriptionRepository {
    client: Arc<Client>,
}

impl PostgresSubscriptionRepository {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

impl Repository<Subscription> for PostgresSubscriptionRepository {
    type Error = RepositoryError;
}

const SELECT_BY_ID: &str = "SELECT subscription_id, service_name, price, user_id, start_date, end_date
    FROM subscription WHERE subscription_id = $1";

#[async_trait]
impl Add<Subscription> for PostgresSubscriptionRepository {
    async fn add(&self, sub: Subscription) -> Result<(), Self::Error> {
        self.client
            .execute(
                "INSERT INTO subscription (subscription_id, service_name, price, user_id, start_date, end_date)
                VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &sub.subscription_id,
                    &sub.service_name,
                    &sub.price,
                    &sub.user_id,
                    &sub.start_date,
                    &sub.end_date,
                ],
            )
            .await
            .map_err(RepositoryError::persistence)?;
        Ok(())
    }
}

#[async_trait]
impl Get<Subscription> for PostgresSubscriptionRepository {
    async fn get_one(
        &self,
        id: &IdentityOf<Subscription>,
    ) -> Result<Option<Subscription>, Self::Error> {
        self.client
            .query_opt(SELECT_BY_ID, &[id])
            .await
            .map_err(RepositoryError::persistence)?
            .map(from_row)
            .transpose()
    }
}

#[async_trait]
impl Remove<Subscription> for PostgresSubscriptionRepository {
    async fn remove(&self, id: &IdentityOf<Subscription>) -> Result<(), Self::Error> {
        let deleted = self
            .client
            .execute("DELETE FROM subscription WHERE subscription_id = $1", &[id])
            .await
            .map_err(RepositoryError::persistence)?;
        match deleted {
            0 => Err(RepositoryError::NotFound(*id)),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Select<Subscription, SubscriptionFilter> for PostgresSubscriptionRepository {
    async fn select(&self, filter: &SubscriptionFilter) -> Result<Vec<Subscription>, Self::Error> {
        let query = list_query(filter);
        let rows = self
            .client
            .query_raw(query.sql(), query.params())
            .await
            .map_err(RepositoryError::persistence)?;
        let res = row_stream_to_vec::<SqlWrapper<Subscription>>(rows)
            .await
            .map_err(RepositoryError::Persistence)?;
        Ok(res.into_iter().map(SqlWrapper::into_inner).collect())
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn update_put(
        &self,
        sub: &Subscription,
        id: &IdentityOf<Subscription>,
    ) -> Result<Subscription, RepositoryError> {
        self.client
            .query_opt(
                "UPDATE subscription
                SET service_name = $2, price = $3, user_id = $4, start_date = $5, end_date = $6
                WHERE subscription_id = $1
                RETURNING subscription_id, service_name, price, user_id, start_date, end_date",
                &[
                    id,
                    &sub.service_name,
                    &sub.price,
                    &sub.user_id,
                    &sub.start_date,
                    &sub.end_date,
                ],
            )
            .await
            .map_err(RepositoryError::persistence)?
            .ok_or(RepositoryError::NotFound(*id))
            .and_then(from_row)
    }

    async fn update_patch(
        &self,
        id: &IdentityOf<Subscription>,
        changes: &SubscriptionChanges,
    ) -> Result<Subscription, RepositoryError> {
        let Some(query) = patch_query(*id, changes) else {
            log::debug!("No fields to update for subscription {id}, returning current state");
            return self.get_one(id).await?.ok_or(RepositoryError::NotFound(*id));
        };
        self.client
            .query_opt(query.sql(), &query.params())
            .await
            .map_err(RepositoryError::persistence)?
            .ok_or(RepositoryError::NotFound(*id))
            .and_then(from_row)
    }
}
