use crate::control::{ControllerError, Response};
use crate::empty_string_as_none;
use actix::Addr;
use actix_web::web::{self, Data, Json, JsonConfig, Path, Query};
use actix_web::{delete, get, patch, post, put, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use subscription_types::subscription::service::{self, SubscriptionService};
use subscription_types::subscription::{Subscription, SubscriptionFilter};
use subscription_types::{format_month, parse_month};
use tokio_util::sync::{CancellationToken, DropGuard};
use typesafe_repository::IdentityOf;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct SubscriptionDto {
    pub service_name: String,
    pub price: i32,
    pub user_id: Uuid,
    pub start_date: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub end_date: Option<String>,
}

impl TryFrom<SubscriptionDto> for Subscription {
    type Error = ControllerError;

    fn try_from(dto: SubscriptionDto) -> Result<Self, Self::Error> {
        let SubscriptionDto {
            service_name,
            price,
            user_id,
            start_date,
            end_date,
        } = dto;
        let start_date = parse_month(&start_date)
            .map_err(|err| ControllerError::invalid_input("start_date", err))?;
        let end_date = end_date
            .map(|d| parse_month(&d))
            .transpose()
            .map_err(|err| ControllerError::invalid_input("end_date", err))?;
        Ok(Subscription::new(
            service_name,
            price,
            user_id,
            start_date,
            end_date,
        ))
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct SubscriptionView {
    pub subscription_id: Uuid,
    pub service_name: String,
    pub price: i32,
    pub user_id: Uuid,
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

impl From<Subscription> for SubscriptionView {
    fn from(sub: Subscription) -> Self {
        Self {
            subscription_id: sub.subscription_id,
            service_name: sub.service_name,
            price: sub.price,
            user_id: sub.user_id,
            start_date: sub.start_date.as_ref().map(format_month),
            end_date: sub.end_date.as_ref().map(format_month),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct SubscriptionEnvelope {
    pub subscription: SubscriptionView,
}

impl From<Subscription> for SubscriptionEnvelope {
    fn from(sub: Subscription) -> Self {
        Self {
            subscription: sub.into(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct SubscriptionList {
    pub subscriptions: Vec<SubscriptionView>,
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub service_name: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub end_date: Option<String>,
}

impl TryFrom<ListQuery> for SubscriptionFilter {
    type Error = ControllerError;

    fn try_from(q: ListQuery) -> Result<Self, Self::Error> {
        let user_id = q
            .user_id
            .ok_or_else(|| ControllerError::invalid_input("user_id", "is required"))?;
        let user_id = Uuid::parse_str(&user_id).map_err(|_| ControllerError::InvalidId(user_id))?;
        let month = |field: &'static str, v: Option<String>| {
            v.map(|v| parse_month(&v))
                .transpose()
                .map_err(|err| ControllerError::invalid_input(field, err))
        };
        Ok(SubscriptionFilter::new(
            q.service_name.as_deref().unwrap_or_default(),
            user_id,
            month("start_date", q.start_date)?,
            month("end_date", q.end_date)?,
        ))
    }
}

fn parse_id(raw: &str) -> Result<IdentityOf<Subscription>, ControllerError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ControllerError::InvalidId(raw.to_string()))
}

/// Child of the shutdown token that is cancelled when the guard is dropped,
/// i.e. when actix drops the handler future of a disconnected client.
fn request_token(shutdown: &CancellationToken) -> (CancellationToken, DropGuard) {
    let token = shutdown.child_token();
    let guard = token.clone().drop_guard();
    (token, guard)
}

#[post("/subscriptions")]
async fn create_subscription(
    subscription_service: Data<Addr<SubscriptionService>>,
    shutdown: Data<CancellationToken>,
    dto: Json<SubscriptionDto>,
) -> Response {
    let sub = Subscription::try_from(dto.into_inner())?;
    let (token, _guard) = request_token(&shutdown);
    let sub = subscription_service
        .send(service::Create(sub, token))
        .await??;
    Ok(HttpResponse::Created().json(SubscriptionView::from(sub)))
}

#[get("/subscriptions/{id}")]
async fn get_subscription(
    subscription_service: Data<Addr<SubscriptionService>>,
    shutdown: Data<CancellationToken>,
    path: Path<String>,
) -> Response {
    let id = parse_id(&path)?;
    let (token, _guard) = request_token(&shutdown);
    let sub = subscription_service.send(service::Get(id, token)).await??;
    Ok(HttpResponse::Ok().json(SubscriptionEnvelope::from(sub)))
}

#[put("/subscriptions/{id}")]
async fn replace_subscription(
    subscription_service: Data<Addr<SubscriptionService>>,
    shutdown: Data<CancellationToken>,
    path: Path<String>,
    dto: Json<SubscriptionDto>,
) -> Response {
    let id = parse_id(&path)?;
    let sub = Subscription::try_from(dto.into_inner())?;
    let (token, _guard) = request_token(&shutdown);
    let sub = subscription_service
        .send(service::UpdatePut(id, sub, token))
        .await??;
    Ok(HttpResponse::Ok().json(SubscriptionEnvelope::from(sub)))
}

#[patch("/subscriptions/{id}")]
async fn patch_subscription(
    subscription_service: Data<Addr<SubscriptionService>>,
    shutdown: Data<CancellationToken>,
    path: Path<String>,
    body: Json<Map<String, Value>>,
) -> Response {
    let id = parse_id(&path)?;
    let (token, _guard) = request_token(&shutdown);
    let sub = subscription_service
        .send(service::UpdatePatchFields(id, body.into_inner(), token))
        .await??;
    Ok(HttpResponse::Ok().json(SubscriptionEnvelope::from(sub)))
}

#[delete("/subscriptions/{id}")]
async fn delete_subscription(
    subscription_service: Data<Addr<SubscriptionService>>,
    shutdown: Data<CancellationToken>,
    path: Path<String>,
) -> Response {
    let id = parse_id(&path)?;
    let (token, _guard) = request_token(&shutdown);
    subscription_service
        .send(service::Remove(id, token))
        .await??;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/subscriptions")]
async fn list_subscriptions(
    subscription_service: Data<Addr<SubscriptionService>>,
    shutdown: Data<CancellationToken>,
    query: Query<ListQuery>,
) -> Response {
    let filter = SubscriptionFilter::try_from(query.into_inner())?;
    let (token, _guard) = request_token(&shutdown);
    let subscriptions = subscription_service
        .send(service::List(filter, token))
        .await??
        .into_iter()
        .map(SubscriptionView::from)
        .collect();
    Ok(HttpResponse::Ok().json(SubscriptionList { subscriptions }))
}

pub fn json_config() -> JsonConfig {
    JsonConfig::default()
        .error_handler(|err, _| ControllerError::invalid_input("body", err).into())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .service(create_subscription)
        .service(list_subscriptions)
        .service(get_subscription)
        .service(replace_subscription)
        .service(patch_subscription)
        .service(delete_subscription);
}
