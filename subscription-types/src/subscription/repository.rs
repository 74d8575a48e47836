use crate::subscription::{Subscription, SubscriptionChanges, SubscriptionFilter};
use async_trait::async_trait;
use derive_more::{Display, Error};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use typesafe_repository::async_ops::{Add, Get, Remove, Select};
use typesafe_repository::{GetIdentity, IdentityOf, Repository, SelectBy, Selector};

#[derive(Debug, Display, Error)]
pub enum RepositoryError {
    #[display("subscription {_0} not found")]
    #[error(ignore)]
    NotFound(IdentityOf<Subscription>),
    #[display("storage failure: {_0:#}")]
    #[error(ignore)]
    Persistence(anyhow::Error),
}

impl RepositoryError {
    pub fn persistence<E: Into<anyhow::Error>>(err: E) -> Self {
        Self::Persistence(err.into())
    }
}

/// Storage of subscriptions. Point lookup, insertion, removal and filtered listing
/// come from `typesafe_repository`; both updates return the row as stored.
#[async_trait]
pub trait SubscriptionRepository:
    Repository<Subscription, Error = RepositoryError>
    + Add<Subscription>
    + Get<Subscription>
    + Remove<Subscription>
    + Select<Subscription, SubscriptionFilter>
    + Send
    + Sync
{
    /// Overwrites every mutable column of the row keyed by `id` and returns the stored row.
    async fn update_put(
        &self,
        sub: &Subscription,
        id: &IdentityOf<Subscription>,
    ) -> Result<Subscription, RepositoryError>;

    /// Writes only the supplied columns. An empty change-set performs no write and
    /// returns the current row.
    async fn update_patch(
        &self,
        id: &IdentityOf<Subscription>,
        changes: &SubscriptionChanges,
    ) -> Result<Subscription, RepositoryError>;
}

impl Selector for SubscriptionFilter {}
impl SelectBy<SubscriptionFilter> for Subscription {}

#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    rows: RwLock<BTreeMap<IdentityOf<Subscription>, Subscription>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

fn price_violation() -> RepositoryError {
    RepositoryError::persistence(anyhow::anyhow!(
        "new row violates check constraint on price"
    ))
}

impl Repository<Subscription> for InMemorySubscriptionRepository {
    type Error = RepositoryError;
}

#[async_trait]
impl Add<Subscription> for InMemorySubscriptionRepository {
    async fn add(&self, sub: Subscription) -> Result<(), Self::Error> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&sub.id()) {
            return Err(RepositoryError::persistence(anyhow::anyhow!(
                "duplicate key value violates unique constraint on subscription_id {}",
                sub.id()
            )));
        }
        if sub.price <= 0 {
            return Err(price_violation());
        }
        rows.insert(sub.id(), sub);
        Ok(())
    }
}

#[async_trait]
impl Get<Subscription> for InMemorySubscriptionRepository {
    async fn get_one(
        &self,
        id: &IdentityOf<Subscription>,
    ) -> Result<Option<Subscription>, Self::Error> {
        Ok(self.rows.read().await.get(id).cloned())
    }
}

#[async_trait]
impl Remove<Subscription> for InMemorySubscriptionRepository {
    async fn remove(&self, id: &IdentityOf<Subscription>) -> Result<(), Self::Error> {
        self.rows
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound(*id))
    }
}

#[async_trait]
impl Select<Subscription, SubscriptionFilter> for InMemorySubscriptionRepository {
    async fn select(&self, filter: &SubscriptionFilter) -> Result<Vec<Subscription>, Self::Error> {
        let mut res = self
            .rows
            .read()
            .await
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect::<Vec<_>>();
        res.sort_by_key(|s| (s.start_date, s.subscription_id));
        Ok(res)
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn update_put(
        &self,
        sub: &Subscription,
        id: &IdentityOf<Subscription>,
    ) -> Result<Subscription, RepositoryError> {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(id).ok_or(RepositoryError::NotFound(*id))?;
        if sub.price <= 0 {
            return Err(price_violation());
        }
        *row = Subscription {
            subscription_id: *id,
            ..sub.clone()
        };
        Ok(row.clone())
    }

    async fn update_patch(
        &self,
        id: &IdentityOf<Subscription>,
        changes: &SubscriptionChanges,
    ) -> Result<Subscription, RepositoryError> {
        if changes.is_empty() {
            return self.get_one(id).await?.ok_or(RepositoryError::NotFound(*id));
        }
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(id).ok_or(RepositoryError::NotFound(*id))?;
        if changes.price.is_some_and(|p| p <= 0) {
            return Err(price_violation());
        }
        changes.apply_to(row);
        Ok(row.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;
    use uuid::Uuid;

    fn sub(user_id: Uuid, name: &str) -> Subscription {
        Subscription::new(name.to_string(), 500, user_id, date!(2024 - 01 - 01), None)
            .with_id(Uuid::new_v4())
    }

    #[actix_rt::test]
    async fn patch_with_empty_change_set_does_not_write() {
        let repo = InMemorySubscriptionRepository::new();
        let s = sub(Uuid::new_v4(), "Netflix");
        repo.add(s.clone()).await.unwrap();
        let res = repo
            .update_patch(&s.subscription_id, &SubscriptionChanges::default())
            .await
            .unwrap();
        assert_eq!(res, s);
    }

    #[actix_rt::test]
    async fn missing_rows_are_not_found() {
        let repo = InMemorySubscriptionRepository::new();
        let id = Uuid::new_v4();
        assert!(matches!(
            repo.remove(&id).await,
            Err(RepositoryError::NotFound(x)) if x == id
        ));
        assert!(matches!(
            repo.update_put(&sub(Uuid::new_v4(), "X"), &id).await,
            Err(RepositoryError::NotFound(_))
        ));
        let changes = SubscriptionChanges {
            price: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            repo.update_patch(&id, &changes).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[actix_rt::test]
    async fn rejects_storage_constraint_violations() {
        let repo = InMemorySubscriptionRepository::new();
        let s = sub(Uuid::new_v4(), "Netflix");
        repo.add(s.clone()).await.unwrap();
        assert!(matches!(
            repo.add(s.clone()).await,
            Err(RepositoryError::Persistence(_))
        ));
        let mut free = sub(Uuid::new_v4(), "Free");
        free.price = 0;
        assert!(matches!(
            repo.add(free).await,
            Err(RepositoryError::Persistence(_))
        ));
        assert_eq!(repo.len().await, 1);
    }

    #[actix_rt::test]
    async fn put_keeps_the_row_identity() {
        let repo = InMemorySubscriptionRepository::new();
        let s = sub(Uuid::new_v4(), "Netflix");
        repo.add(s.clone()).await.unwrap();
        let replacement = sub(Uuid::new_v4(), "Hulu");
        let res = repo.update_put(&replacement, &s.subscription_id).await.unwrap();
        assert_eq!(res.subscription_id, s.subscription_id);
        assert_eq!(res.service_name, "Hulu");
        assert_eq!(res.user_id, replacement.user_id);
    }
}
