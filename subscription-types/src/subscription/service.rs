use crate::subscription::repository::{RepositoryError, SubscriptionRepository};
use crate::subscription::{
    validate, ChangeSetError, Subscription, SubscriptionChanges, SubscriptionFilter,
    ValidationError,
};
use actix::prelude::*;
use derive_more::{Display, Error};
use serde_json::{Map, Value};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use typesafe_repository::async_ops::{Add as _, Get as _, Remove as _, Select as _};
use typesafe_repository::IdentityOf;
use uuid::Uuid;

/// What to do with a subscription that fails validation on create or full replace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidationPolicy {
    /// Log a warning. Create still writes, replace becomes a no-op.
    #[default]
    Lenient,
    /// Fail with [`ServiceError::ValidationFailure`] before touching storage.
    Strict,
}

impl FromStr for ValidationPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            x => Err(anyhow::anyhow!("Unknown validation policy: {x}")),
        }
    }
}

#[derive(Debug, Display, Error)]
pub enum ServiceError {
    #[display("subscription {_0} not found")]
    #[error(ignore)]
    NotFound(IdentityOf<Subscription>),
    #[display("invalid subscription: {_0}")]
    ValidationFailure(ValidationError),
    #[display("field '{_0}' cannot be updated")]
    #[error(ignore)]
    DisallowedField(String),
    #[display("{_0}")]
    InvalidChange(ChangeSetError),
    #[display("{operation} failed: {source:#}")]
    #[error(ignore)]
    Persistence {
        operation: &'static str,
        source: anyhow::Error,
    },
    #[display("operation cancelled")]
    Cancelled,
}

impl ServiceError {
    fn from_repository(operation: &'static str) -> impl FnOnce(RepositoryError) -> Self {
        move |err| match err {
            RepositoryError::NotFound(id) => Self::NotFound(id),
            RepositoryError::Persistence(source) => Self::Persistence { operation, source },
        }
    }
}

impl From<ChangeSetError> for ServiceError {
    fn from(err: ChangeSetError) -> Self {
        match err {
            ChangeSetError::DisallowedField(field) => Self::DisallowedField(field),
            err => Self::InvalidChange(err),
        }
    }
}

/// Races `fut` against `token`. A cancelled token wins even when both are ready,
/// and the storage future is dropped unpolled.
async fn cancellable<F: Future>(
    token: &CancellationToken,
    fut: F,
) -> Result<F::Output, ServiceError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ServiceError::Cancelled),
        res = fut => Ok(res),
    }
}

pub struct SubscriptionService {
    repository: Arc<dyn SubscriptionRepository>,
    policy: ValidationPolicy,
}

impl Actor for SubscriptionService {
    type Context = Context<Self>;
}

impl SubscriptionService {
    pub fn new(repository: Arc<dyn SubscriptionRepository>, policy: ValidationPolicy) -> Self {
        Self { repository, policy }
    }
}

#[derive(Message)]
#[rtype(result = "Result<Subscription, ServiceError>")]
pub struct Create(pub Subscription, pub CancellationToken);

#[derive(Message)]
#[rtype(result = "Result<Subscription, ServiceError>")]
pub struct Get(pub IdentityOf<Subscription>, pub CancellationToken);

#[derive(Message)]
#[rtype(result = "Result<Subscription, ServiceError>")]
pub struct UpdatePut(
    pub IdentityOf<Subscription>,
    pub Subscription,
    pub CancellationToken,
);

/// Partial update from a partial subscription: only non-empty allow-listed fields are written.
#[derive(Message)]
#[rtype(result = "Result<Subscription, ServiceError>")]
pub struct UpdatePatch(
    pub IdentityOf<Subscription>,
    pub Subscription,
    pub CancellationToken,
);

/// Partial update from an untyped body, e.g. a decoded JSON object.
#[derive(Message)]
#[rtype(result = "Result<Subscription, ServiceError>")]
pub struct UpdatePatchFields(
    pub IdentityOf<Subscription>,
    pub Map<String, Value>,
    pub CancellationToken,
);

#[derive(Message)]
#[rtype(result = "Result<(), ServiceError>")]
pub struct Remove(pub IdentityOf<Subscription>, pub CancellationToken);

#[derive(Message)]
#[rtype(result = "Result<Vec<Subscription>, ServiceError>")]
pub struct List(pub SubscriptionFilter, pub CancellationToken);

impl Handler<Create> for SubscriptionService {
    type Result = ResponseActFuture<Self, Result<Subscription, ServiceError>>;

    fn handle(&mut self, Create(mut sub, token): Create, _: &mut Context<Self>) -> Self::Result {
        let repo = self.repository.clone();
        let policy = self.policy;
        Box::pin(
            async move {
                sub.subscription_id = Uuid::new_v4();
                log::debug!("Creating subscription {}", sub.subscription_id);
                if let Err(err) = validate(&sub) {
                    log::warn!("Invalid subscription {}: {err}", sub.subscription_id);
                    if policy == ValidationPolicy::Strict {
                        return Err(ServiceError::ValidationFailure(err));
                    }
                }
                cancellable(&token, repo.add(sub.clone()))
                    .await?
                    .map_err(ServiceError::from_repository("create subscription"))
                    .inspect_err(|err| {
                        log::error!("Unable to create subscription {}: {err}", sub.subscription_id)
                    })?;
                log::info!("Subscription {} created", sub.subscription_id);
                Ok(sub)
            }
            .into_actor(self),
        )
    }
}

impl Handler<Get> for SubscriptionService {
    type Result = ResponseActFuture<Self, Result<Subscription, ServiceError>>;

    fn handle(&mut self, Get(id, token): Get, _: &mut Context<Self>) -> Self::Result {
        let repo = self.repository.clone();
        Box::pin(
            async move {
                log::debug!("Getting subscription {id}");
                let res = cancellable(&token, repo.get_one(&id))
                    .await?
                    .and_then(|sub| sub.ok_or(RepositoryError::NotFound(id)))
                    .map_err(ServiceError::from_repository("get subscription"))
                    .inspect_err(|err| log::warn!("Unable to get subscription {id}: {err}"))?;
                Ok(res)
            }
            .into_actor(self),
        )
    }
}

impl Handler<UpdatePut> for SubscriptionService {
    type Result = ResponseActFuture<Self, Result<Subscription, ServiceError>>;

    fn handle(
        &mut self,
        UpdatePut(id, sub, token): UpdatePut,
        _: &mut Context<Self>,
    ) -> Self::Result {
        let repo = self.repository.clone();
        let policy = self.policy;
        Box::pin(
            async move {
                log::debug!("Replacing subscription {id}");
                if let Err(err) = validate(&sub) {
                    log::warn!("Invalid replacement for subscription {id}: {err}");
                    return match policy {
                        ValidationPolicy::Strict => Err(ServiceError::ValidationFailure(err)),
                        ValidationPolicy::Lenient => Ok(Subscription::default()),
                    };
                }
                let res = cancellable(&token, repo.update_put(&sub, &id))
                    .await?
                    .map_err(ServiceError::from_repository("replace subscription"))
                    .inspect_err(|err| log::error!("Unable to replace subscription {id}: {err}"))?;
                log::info!("Subscription {id} replaced");
                Ok(res)
            }
            .into_actor(self),
        )
    }
}

async fn patch(
    repo: Arc<dyn SubscriptionRepository>,
    id: IdentityOf<Subscription>,
    changes: SubscriptionChanges,
    token: CancellationToken,
) -> Result<Subscription, ServiceError> {
    log::debug!("Patching subscription {id}");
    if changes.is_empty() {
        log::warn!("Patch of subscription {id} has no changes");
    }
    let res = cancellable(&token, repo.update_patch(&id, &changes))
        .await?
        .map_err(ServiceError::from_repository("patch subscription"))
        .inspect_err(|err| log::error!("Unable to patch subscription {id}: {err}; {changes:?}"))?;
    log::info!("Subscription {id} patched: {changes:?}");
    Ok(res)
}

impl Handler<UpdatePatch> for SubscriptionService {
    type Result = ResponseActFuture<Self, Result<Subscription, ServiceError>>;

    fn handle(
        &mut self,
        UpdatePatch(id, partial, token): UpdatePatch,
        _: &mut Context<Self>,
    ) -> Self::Result {
        let repo = self.repository.clone();
        let changes = SubscriptionChanges::from(&partial);
        Box::pin(patch(repo, id, changes, token).into_actor(self))
    }
}

impl Handler<UpdatePatchFields> for SubscriptionService {
    type Result = ResponseActFuture<Self, Result<Subscription, ServiceError>>;

    fn handle(
        &mut self,
        UpdatePatchFields(id, body, token): UpdatePatchFields,
        _: &mut Context<Self>,
    ) -> Self::Result {
        let repo = self.repository.clone();
        Box::pin(
            async move {
                let changes = SubscriptionChanges::try_from(body)
                    .inspect_err(|err| log::warn!("Rejected patch of subscription {id}: {err}"))?;
                patch(repo, id, changes, token).await
            }
            .into_actor(self),
        )
    }
}

impl Handler<Remove> for SubscriptionService {
    type Result = ResponseActFuture<Self, Result<(), ServiceError>>;

    fn handle(&mut self, Remove(id, token): Remove, _: &mut Context<Self>) -> Self::Result {
        let repo = self.repository.clone();
        Box::pin(
            async move {
                log::debug!("Deleting subscription {id}");
                cancellable(&token, repo.remove(&id))
                    .await?
                    .map_err(ServiceError::from_repository("delete subscription"))
                    .inspect_err(|err| log::warn!("Unable to delete subscription {id}: {err}"))?;
                log::info!("Subscription {id} deleted");
                Ok(())
            }
            .into_actor(self),
        )
    }
}

impl Handler<List> for SubscriptionService {
    type Result = ResponseActFuture<Self, Result<Vec<Subscription>, ServiceError>>;

    fn handle(&mut self, List(filter, token): List, _: &mut Context<Self>) -> Self::Result {
        let repo = self.repository.clone();
        Box::pin(
            async move {
                let res = cancellable(&token, repo.select(&filter))
                    .await?
                    .map_err(ServiceError::from_repository("list subscriptions"))
                    .inspect_err(|err| log::error!("Unable to list {filter:?}: {err}"))?;
                log::debug!("Listed {} subscriptions of user {}", res.len(), filter.user_id);
                Ok(res)
            }
            .into_actor(self),
        )
    }
}
