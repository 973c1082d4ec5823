use crate::server::{
    AuthSettings, Result, ServerError, ServerRouter, ValidationError, auth::AuthenticatedUser,
    json::Json,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
};
use axum_extra::{
    extract::WithRejection,
    routing::{RouterExt, TypedPath},
};
use blogwerk_common::model::{
    auth::{AuthToken, Authentication, IssuedToken, LoginForm},
    user::{CreateUser, SignupForm, User},
};
use blogwerk_db::store::{DbError, SharedStore};
use serde::{Deserialize, Serialize};
use time::UtcDateTime;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(login_form)
        .typed_post(login)
        .typed_post(signup)
        .typed_post(logout)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/login", rejection(ServerError))]
struct LoginPath();

#[derive(Deserialize)]
struct LoginQuery {
    next: Option<String>,
}

/// Where protected routes send anonymous users. `next` is the path they came from.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct LoginDescriptor {
    next: Option<String>,
    fields: &'static [&'static str],
}

async fn login_form(
    LoginPath(): LoginPath,
    WithRejection(Query(query), _): WithRejection<Query<LoginQuery>, ServerError>,
) -> Json<LoginDescriptor> {
    Json(LoginDescriptor {
        next: query.next,
        fields: &["username", "password"],
    })
}

async fn login(
    LoginPath(): LoginPath,
    State(store): State<SharedStore>,
    State(settings): State<AuthSettings>,
    Json(form): Json<LoginForm>,
) -> Result<Json<IssuedToken>> {
    let credentials = store
        .fetch_credentials(&form.username)
        .await?
        .ok_or(ServerError::InvalidCredentials)?;

    if !form.password.verify(&credentials.password_hash)? {
        return Err(ServerError::InvalidCredentials);
    }

    let token = AuthToken::generate_random(credentials.user);
    store
        .create_authentication(&Authentication {
            user: credentials.user,
            token_hash: token.hash()?,
            created_at: UtcDateTime::now(),
            expires_after: settings.token_lifetime,
        })
        .await?;
    info!(user = %credentials.user, "Issued auth token");

    Ok(Json(IssuedToken {
        token: token.as_token_str(),
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/signup", rejection(ServerError))]
struct SignupPath();

async fn signup(
    SignupPath(): SignupPath,
    State(store): State<SharedStore>,
    Json(form): Json<SignupForm>,
) -> Result<(StatusCode, Json<User>)> {
    let new_user = CreateUser {
        password_hash: form.password.hash()?,
        username: form.username,
        first_name: form.first_name,
        last_name: form.last_name,
        email: form.email,
    };

    let user = match store.create_user(&new_user).await {
        Ok(user) => user,
        Err(DbError::UniqueViolation(_)) => {
            return Err(ValidationError::UsernameTaken(new_user.username).into());
        }
        Err(err) => return Err(err.into()),
    };
    info!(user = %user.id, username = %user.username, "User signed up");

    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/logout", rejection(ServerError))]
struct LogoutPath();

async fn logout(
    LogoutPath(): LogoutPath,
    State(store): State<SharedStore>,
    user: AuthenticatedUser,
) -> Result<StatusCode> {
    store.delete_authentication(user.token_hash()).await?;
    info!(user = %user.user_id(), "Auth token revoked");

    Ok(StatusCode::NO_CONTENT)
}
