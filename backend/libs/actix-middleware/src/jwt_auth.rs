use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, AUTHORIZATION},
    Error, HttpMessage,
};
use futures::future::{ready, Ready};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// User ID extracted from JWT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub Uuid);

/// Claims issued by the marketplace's auth service. Only `sub` is consumed here.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("invalid verification key: {0}")]
    InvalidKey(String),

    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("token subject is not a user id")]
    MalformedSubject,
}

/// Verifies bearer tokens against a single key.
///
/// Production deployments use the auth service's RS256 public key; HS256 with a
/// shared secret exists for local development and tests.
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn from_rsa_pem(public_key_pem: &str) -> Result<Self, JwtError> {
        let key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| JwtError::InvalidKey(e.to_string()))?;
        Ok(Self {
            key,
            validation: Validation::new(Algorithm::RS256),
        })
    }

    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Validate signature + expiry and return the authenticated user.
    pub fn validate(&self, token: &str) -> Result<UserId, JwtError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)?;
        let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| JwtError::MalformedSubject)?;
        Ok(UserId(user_id))
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// JWT Authentication Middleware
///
/// Rejects requests without a valid bearer token (401) and stores the
/// authenticated [`UserId`] in the request extensions.
#[derive(Clone)]
pub struct JwtAuthMiddleware {
    validator: Arc<JwtValidator>,
}

impl JwtAuthMiddleware {
    pub fn new(validator: Arc<JwtValidator>) -> Self {
        Self { validator }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = JwtAuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddlewareService {
            service: Rc::new(service),
            validator: self.validator.clone(),
        }))
    }
}

pub struct JwtAuthMiddlewareService<S> {
    service: Rc<S>,
    validator: Arc<JwtValidator>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let validator = self.validator.clone();

        Box::pin(async move {
            let token = bearer_token(req.headers()).ok_or_else(|| {
                actix_web::error::ErrorUnauthorized("Missing or malformed Authorization header")
            })?;

            let user_id = validator.validate(token).map_err(|e| {
                tracing::warn!(error = %e, path = %req.path(), "JWT validation failed");
                actix_web::error::ErrorUnauthorized("Invalid token")
            })?;

            req.extensions_mut().insert(user_id);

            service.call(req).await
        })
    }
}

/// FromRequest implementation for UserId
impl actix_web::FromRequest for UserId {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        match req.extensions().get::<UserId>() {
            Some(user_id) => ready(Ok(*user_id)),
            None => ready(Err(actix_web::error::ErrorUnauthorized(
                "User not authenticated",
            ))),
        }
    }
}
