use crate::accounts::AccountService;
use crate::error::AppError;
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::Method,
    web, Error, FromRequest, HttpMessage, HttpRequest, ResponseError,
};
use std::{
    future::{ready, Future, Ready},
    pin::Pin,
    rc::Rc,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// The caller resolved from its bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: Uuid,
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthenticatedUser>()
                .cloned()
                .ok_or(AppError::Unauthorized),
        )
    }
}

fn is_public(req: &ServiceRequest) -> bool {
    req.method() == Method::OPTIONS
        || req.path() == "/health"
        || (req.method() == Method::POST && req.path().trim_end_matches('/') == "/users")
}

fn bearer_token(req: &ServiceRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub struct BearerAuth;

impl<S, B> Transform<S, ServiceRequest> for BearerAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = BearerAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(BearerAuthMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct BearerAuthMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for BearerAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();

        if is_public(&req) {
            return Box::pin(async move { srv.call(req).await.map(ServiceResponse::map_into_left_body) });
        }

        let user = match req.app_data::<web::Data<AccountService>>() {
            Some(accounts) => match bearer_token(&req) {
                Some(token) => accounts.authenticate(token),
                None => Err(AppError::Unauthorized),
            },
            None => {
                warn!("AccountService missing in app_data");
                Err(AppError::Internal("Authentication is not configured".to_string()))
            }
        };

        let user = match user {
            Ok(user) => user,
            Err(e) => {
                debug!("Rejected request to {}: {}", req.path(), e);
                let response = req.into_response(e.error_response()).map_into_right_body();
                return Box::pin(async move { Ok(response) });
            }
        };

        req.extensions_mut().insert(AuthenticatedUser { id: user.id });

        Box::pin(async move { srv.call(req).await.map(ServiceResponse::map_into_left_body) })
    }
}
