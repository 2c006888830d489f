use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;
use std::task::{Context, Poll};

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http, web, Error, FromRequest, HttpMessage, HttpRequest, HttpResponse,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use futures::future::{ok, ready, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::{ApiError, ErrorBody};
use crate::models::{ActorIdentity, User};
use crate::store::UserStore;

const MIN_PASSWORD_LEN: usize = 8;
const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub exp: usize,
}

#[derive(Debug, Deserialize)]
pub struct SignupInfo {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginInfo {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: String,
    pub name: String,
    pub email: String,
}

fn is_valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(EMAIL_PATTERN).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(email))
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// JWT Creation
pub fn create_jwt(
    identity: &ActorIdentity,
    secret: &str,
    ttl_hours: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = Utc::now() + Duration::hours(ttl_hours);
    let claims = Claims {
        sub: identity.user_id.clone(),
        email: identity.email.clone(),
        name: identity.name.clone(),
        exp: expiration.timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))
}

// JWT Validation
pub fn validate_jwt(token: &str, secret: &str) -> Result<ActorIdentity, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    let claims = token_data.claims;
    Ok(ActorIdentity {
        user_id: claims.sub,
        email: claims.email,
        name: claims.name,
    })
}

/// Validates the signup payload, hashes the password and stores the user.
pub async fn register(users: &dyn UserStore, info: SignupInfo) -> Result<User, ApiError> {
    let name = info.name.trim().to_string();
    let email = normalize_email(&info.email);
    if name.is_empty() {
        return Err(ApiError::validation("name must not be empty"));
    }
    if !is_valid_email(&email) {
        return Err(ApiError::validation("email is not a valid address"));
    }
    if info.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let password = info.password;
    let password_hash = tokio::task::spawn_blocking(move || hash(password, DEFAULT_COST))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(format!("Error hashing password: {e}")))?;

    let user = User {
        user_id: Uuid::new_v4().to_string(),
        name,
        email,
        password_hash,
        created_at: Utc::now(),
    };
    if !users.insert_user(&user).await? {
        return Err(ApiError::conflict("email is already registered"));
    }
    info!("User created {}", user.user_id);
    Ok(user)
}

/// Checks the credentials and returns the matching user.
pub async fn authenticate(users: &dyn UserStore, info: LoginInfo) -> Result<User, ApiError> {
    let email = normalize_email(&info.email);
    let Some(user) = users.find_user_by_email(&email).await? else {
        debug!("Login for unknown email {}", email);
        return Err(ApiError::Unauthenticated);
    };
    let password = info.password;
    let stored_hash = user.password_hash.clone();
    let matches = tokio::task::spawn_blocking(move || verify(password, &stored_hash))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .unwrap_or(false);
    if matches {
        Ok(user)
    } else {
        Err(ApiError::Unauthenticated)
    }
}

// Signup Endpoint
pub async fn signup(
    data: web::Data<AppState>,
    signup_info: web::Json<SignupInfo>,
) -> Result<HttpResponse, ApiError> {
    let user = register(data.users.as_ref(), signup_info.into_inner()).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "status": "User created",
        "user_id": user.user_id,
    })))
}

// Login Endpoint
pub async fn login(
    data: web::Data<AppState>,
    login_info: web::Json<LoginInfo>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(data.users.as_ref(), login_info.into_inner()).await?;
    let identity = ActorIdentity::from(&user);
    let token = create_jwt(&identity, &data.config.jwt_secret, data.config.token_ttl_hours)
        .map_err(|e| ApiError::Internal(format!("Error issuing token: {e}")))?;
    Ok(HttpResponse::Ok().json(LoginResponse {
        token,
        user_id: identity.user_id,
        name: identity.name,
        email: identity.email,
    }))
}

/// The authenticated identity, placed in request extensions by
/// [`Authentication`]. Handlers that take it reject anonymous requests.
impl FromRequest for ActorIdentity {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<ActorIdentity>()
                .cloned()
                .ok_or(ApiError::Unauthenticated),
        )
    }
}

/// Bearer-token middleware. A valid token attaches its [`ActorIdentity`] to
/// the request; an invalid one is answered with 401 right away. Requests
/// without a token pass through and are rejected by handlers that need an
/// identity.
#[derive(Debug, Clone)]
pub struct Authentication {
    secret: String,
}

impl Authentication {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware {
            service,
            secret: self.secret.clone(),
        })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
    secret: String,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = req
            .headers()
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string());

        if let Some(token) = token {
            match validate_jwt(&token, &self.secret) {
                Ok(identity) => {
                    req.extensions_mut().insert(identity);
                }
                Err(e) => {
                    warn!("Rejected bearer token: {}", e);
                    let (req_parts, _payload) = req.into_parts();
                    let resp = HttpResponse::Unauthorized().json(ErrorBody {
                        code: ApiError::Unauthenticated.code().to_string(),
                        message: format!("Invalid token: {e}"),
                    });
                    let srv_resp = ServiceResponse::new(req_parts, resp);
                    return Box::pin(async move { Ok(srv_resp) });
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}
