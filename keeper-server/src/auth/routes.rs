use axum::{
    extract::State,
    http::StatusCode,
    response::Redirect,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use oauth2::CsrfToken;
use serde::{Deserialize, Serialize};
use tower_sessions::{cookie::time::Duration, Expiry, Session};

use crate::{
    config::config,
    mailer::{password_reset_email, verification_email},
    shared::extract::{Json, Path, Query},
    state::AppState,
    users::{
        auth::{
            create_local, delete_user, email_taken, find_by_reset_token, set_reset_token, update_password,
            username_taken, CreateUserParameters,
        },
        PublicUser,
    },
    Error, Result,
};

use super::{
    backend::{AuthSession, Credentials, GoogleCredentials, PasswordCredentials},
    password::{hash_password, is_strong_password, is_valid_email},
    tokens::{generate_reset_token, generate_verification_code, reset_token_expired, reset_token_expires_at},
    GoogleOAuthResponse,
};

const CSRF_STATE_KEY: &str = "oauth.csrf";
const NEXT_URL_KEY: &str = "oauth.next";

const WEAK_PASSWORD: &str =
    "Password must be at least 8 characters long and include uppercase, lowercase, number, and special character.";
const RESET_LINK_SENT: &str = "If that email is registered, a reset link has been sent.";

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailRequest {
    pub email: Option<String>,
    pub verification_code: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub identifier: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub user: PublicUser,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSessionResponse {
    pub is_authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<PublicUser>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Next {
    pub next: Option<String>,
}

pub fn router(state: AppState) -> Router<()> {
    Router::new()
        .route("/register", post(register))
        .route("/verify-email", post(verify_email))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/check-session", get(check_session))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password/:token", post(reset_password))
        .route("/auth/google", get(google_login))
        .route("/auth/google/callback", get(google_callback))
        .with_state(state)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

async fn register(
    State(state): State<AppState>,
    Json(args): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let (Some(username), Some(email), Some(password)) =
        (non_blank(args.username), non_blank(args.email), non_empty(args.password))
    else {
        return Err(Error::bad_request("All fields are required."));
    };
    let email = email.to_lowercase();

    if !is_valid_email(&email) {
        return Err(Error::bad_request("Invalid email address."));
    }
    if !is_strong_password(&password) {
        return Err(Error::bad_request(WEAK_PASSWORD));
    }

    let db = state.conn.clone();
    if username_taken(db.clone(), username.clone()).await? {
        return Err(Error::username_taken());
    }
    if email_taken(db.clone(), email.clone()).await? {
        return Err(Error::email_taken());
    }

    let password_hash = hash_password(password, config().bcrypt_cost).await?;
    let verification_code = generate_verification_code();

    let user = create_local(
        db.clone(),
        CreateUserParameters {
            username,
            email,
            password_hash,
            verification_code: verification_code.clone(),
        },
    )
    .await?;

    let email = verification_email(&user.email, &user.username, &verification_code);
    if let Err(err) = state.mailer.send(email).await {
        tracing::error!(user_id = user.id, "verification mail failed, removing account");
        delete_user(db, user.id).await?;
        return Err(err.into());
    }

    tracing::info!(user_id = user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        MessageResponse::new("Registration successful. Please check your email to verify your account."),
    ))
}

async fn verify_email(
    State(state): State<AppState>,
    Json(args): Json<VerifyEmailRequest>,
) -> Result<Json<MessageResponse>> {
    let (Some(email), Some(code)) = (non_blank(args.email), non_blank(args.verification_code)) else {
        return Err(Error::bad_request("Email and verification code are required."));
    };

    let user = crate::users::auth::verify_email(state.conn.clone(), email, code)
        .await?
        .ok_or_else(|| Error::bad_request("Invalid verification code."))?;

    tracing::info!(user_id = user.id, "email verified");

    Ok(MessageResponse::new("Email verified successfully. You can now log in."))
}

async fn login(
    mut auth_session: AuthSession,
    session: Session,
    Json(args): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let (Some(identifier), Some(password)) = (non_blank(args.identifier), non_empty(args.password)) else {
        return Err(Error::bad_request("Missing credentials"));
    };

    let user = auth_session
        .authenticate(Credentials::Password(PasswordCredentials { identifier, password }))
        .await?
        .ok_or(Error::InvalidCredentials)?;

    auth_session.login(&user).await?;

    let expiry = if args.remember_me {
        Expiry::OnInactivity(Duration::days(config().session_days))
    } else {
        Expiry::OnSessionEnd
    };
    session.set_expiry(Some(expiry));

    tracing::info!(user_id = user.id, remember_me = args.remember_me, "user logged in");

    Ok(Json(LoginResponse {
        message: "Logged in successfully".into(),
        user: PublicUser::from(&user),
    }))
}

async fn logout(mut auth_session: AuthSession) -> Result<Json<MessageResponse>> {
    if let Some(user) = auth_session.logout().await? {
        tracing::info!(user_id = user.id, "user logged out");
    }

    Ok(MessageResponse::new("Logged out successfully"))
}

async fn me(auth_session: AuthSession) -> Result<Json<MeResponse>> {
    let user = auth_session.user.as_ref().ok_or(Error::Unauthorized)?;

    Ok(Json(MeResponse {
        user: PublicUser::from(user),
    }))
}

async fn check_session(auth_session: AuthSession) -> Json<CheckSessionResponse> {
    let user = auth_session.user.as_ref().map(PublicUser::from);

    Json(CheckSessionResponse {
        is_authenticated: user.is_some(),
        user,
    })
}

async fn forgot_password(
    State(state): State<AppState>,
    Json(args): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>> {
    let Some(email) = non_blank(args.email) else {
        return Err(Error::bad_request("Email is required."));
    };

    let token = generate_reset_token();
    let expires = reset_token_expires_at(Utc::now());

    if set_reset_token(state.conn.clone(), email.clone(), token.clone(), expires).await? {
        let reset_url = config().reset_password_url(&token);
        state.mailer.send(password_reset_email(&email, &reset_url)).await?;
        tracing::info!("password reset issued");
    } else {
        tracing::info!("password reset requested for an unknown email");
    }

    Ok(MessageResponse::new(RESET_LINK_SENT))
}

async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(args): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>> {
    let user = find_by_reset_token(state.conn.clone(), token)
        .await?
        .filter(|user| !reset_token_expired(user.reset_password_expires, Utc::now()))
        .ok_or_else(|| Error::bad_request("Invalid or expired password reset token."))?;

    let Some(password) = non_empty(args.password) else {
        return Err(Error::bad_request("Password is required."));
    };
    if !is_strong_password(&password) {
        return Err(Error::bad_request(WEAK_PASSWORD));
    }

    let password_hash = hash_password(password, config().bcrypt_cost).await?;
    update_password(state.conn.clone(), user.id, password_hash).await?;

    tracing::info!(user_id = user.id, "password reset");

    Ok(MessageResponse::new("Your password has been updated successfully."))
}

async fn google_login(
    auth_session: AuthSession,
    session: Session,
    Query(Next { next }): Query<Next>,
) -> Result<Redirect> {
    let (auth_url, csrf_token) = auth_session.backend.authorize_url()?;

    session.insert(CSRF_STATE_KEY, csrf_token.secret()).await?;

    if let Some(next) = next.filter(|next| next.starts_with('/') && !next.starts_with("//")) {
        session.insert(NEXT_URL_KEY, next).await?;
    }

    Ok(Redirect::to(auth_url.as_str()))
}

async fn google_callback(
    mut auth_session: AuthSession,
    session: Session,
    Query(response): Query<GoogleOAuthResponse>,
) -> Redirect {
    match complete_google_login(&mut auth_session, &session, response).await {
        Ok(next) => Redirect::to(&config().frontend_redirect(next.as_deref())),
        Err(err) => {
            tracing::warn!("Google login failed: {err:?}");
            Redirect::to(&config().frontend_redirect(Some("/login?error=auth_failed")))
        }
    }
}

async fn complete_google_login(
    auth_session: &mut AuthSession,
    session: &Session,
    GoogleOAuthResponse { code, state, error }: GoogleOAuthResponse,
) -> Result<Option<String>> {
    if let Some(error) = error {
        return Err(Error::OAuth(error));
    }
    let code = code.ok_or_else(|| Error::OAuth("missing authorization code".into()))?;
    let state = state.ok_or(Error::CsrfValidationFailed)?;
    let old_state = session
        .remove::<CsrfToken>(CSRF_STATE_KEY)
        .await?
        .ok_or(Error::CsrfValidationFailed)?;

    let user = auth_session
        .authenticate(Credentials::Google(GoogleCredentials { code, old_state, state }))
        .await?
        .ok_or(Error::Unauthorized)?;

    auth_session.login(&user).await?;

    tracing::info!(user_id = user.id, "user logged in with Google");

    Ok(session.remove::<String>(NEXT_URL_KEY).await?)
}

#[cfg(test)]
mod tests {
    use axum_test::TestServer;
    use chrono::Duration;
    use serde_json::json;

    use crate::{
        classifier::testing::unreachable_classifier,
        db::{init_test_db, DB},
        errors::Result,
        tests::{create_active_user, login, test_app, TestApp},
        users::{
            auth::{find_one_by_email, GetUserByEmailParameters},
            UserStatus,
        },
    };

    use super::*;

    async fn app() -> Result<TestApp> {
        test_app(init_test_db().await?, unreachable_classifier().await).await
    }

    async fn user_status(db: DB, email: &str) -> UserStatus {
        find_one_by_email(
            db,
            GetUserByEmailParameters {
                user_email: email.into(),
            },
        )
        .await
        .unwrap()
        .status
    }

    async fn reset_token(db: DB, email: &str) -> String {
        find_one_by_email(
            db,
            GetUserByEmailParameters {
                user_email: email.into(),
            },
        )
        .await
        .unwrap()
        .reset_password_token
        .unwrap()
    }

    #[tokio::test]
    async fn register_verify_and_login() -> Result<()> {
        let app = app().await?;

        let response = app
            .server
            .post("/register")
            .json(&json!({ "username": "bob", "email": "Bob@Mail.com", "password": "Secret#123" }))
            .await;
        assert_eq!(response.status_code(), 201);
        assert_eq!(user_status(app.db.clone(), "bob@mail.com").await, UserStatus::Pending);

        let mail = app.mailer.last_to("bob@mail.com").unwrap();
        let code = mail
            .body
            .lines()
            .find_map(|line| line.strip_prefix("Verification Code: "))
            .unwrap()
            .to_string();

        let response = login(&app.server, "bob", "Secret#123").await;
        assert_eq!(response.status_code(), 401);

        let response = app
            .server
            .post("/verify-email")
            .json(&json!({ "email": "bob@mail.com", "verificationCode": code }))
            .await;
        assert_eq!(response.status_code(), 200);
        assert_eq!(user_status(app.db.clone(), "bob@mail.com").await, UserStatus::Active);

        let response = login(&app.server, "BOB@MAIL.COM", "Secret#123").await;
        assert_eq!(response.status_code(), 200);
        let body = response.json::<LoginResponse>();
        assert_eq!(body.user.username, "bob");
        assert_eq!(body.user.email, "bob@mail.com");

        let response = app.server.get("/me").await;
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.json::<MeResponse>().user.username, "bob");
        Ok(())
    }

    #[tokio::test]
    async fn register_validates_input() -> Result<()> {
        let app = app().await?;

        let cases = [
            json!({ "username": "bob", "email": "bob@mail.com" }),
            json!({ "username": "  ", "email": "bob@mail.com", "password": "Secret#123" }),
            json!({ "username": "bob", "email": "not-an-email", "password": "Secret#123" }),
            json!({ "username": "bob", "email": "bob@mail.com", "password": "secret123" }),
            json!({ "username": "bob", "email": "bob@mail.com", "password": "Sec#1" }),
        ];

        for body in cases {
            let response = app.server.post("/register").json(&body).await;
            assert_eq!(response.status_code(), 400, "{body}");
        }

        assert!(app.mailer.sent().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn register_rejects_taken_names_ignoring_case() -> Result<()> {
        let app = app().await?;
        create_active_user(app.db.clone(), "bob", "bob@mail.com", "Secret#123").await?;

        let response = app
            .server
            .post("/register")
            .json(&json!({ "username": "BOB", "email": "new@mail.com", "password": "Secret#123" }))
            .await;
        assert_eq!(response.status_code(), 409);
        assert_eq!(response.json::<serde_json::Value>()["field"], "username");

        let response = app
            .server
            .post("/register")
            .json(&json!({ "username": "robert", "email": "BOB@mail.com", "password": "Secret#123" }))
            .await;
        assert_eq!(response.status_code(), 409);
        assert_eq!(response.json::<serde_json::Value>()["field"], "email");
        Ok(())
    }

    #[tokio::test]
    async fn register_mail_failure_removes_user() -> Result<()> {
        let app = app().await?;
        app.mailer.fail(true);

        let response = app
            .server
            .post("/register")
            .json(&json!({ "username": "bob", "email": "bob@mail.com", "password": "Secret#123" }))
            .await;

        assert_eq!(response.status_code(), 500);
        assert!(!email_taken(app.db.clone(), "bob@mail.com".into()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn verify_rejects_wrong_code() -> Result<()> {
        let app = app().await?;
        app.server
            .post("/register")
            .json(&json!({ "username": "bob", "email": "bob@mail.com", "password": "Secret#123" }))
            .await;

        let response = app
            .server
            .post("/verify-email")
            .json(&json!({ "email": "bob@mail.com", "verificationCode": "00000" }))
            .await;

        assert_eq!(response.status_code(), 400);
        assert_eq!(user_status(app.db.clone(), "bob@mail.com").await, UserStatus::Pending);
        Ok(())
    }

    #[tokio::test]
    async fn login_failures() -> Result<()> {
        let app = app().await?;
        create_active_user(app.db.clone(), "bob", "bob@mail.com", "Secret#123").await?;

        let response = app.server.post("/login").json(&json!({ "identifier": "bob" })).await;
        assert_eq!(response.status_code(), 400);

        let wrong_password = login(&app.server, "bob", "Secret#999").await;
        let unknown_user = login(&app.server, "alice", "Secret#123").await;
        assert_eq!(wrong_password.status_code(), 401);
        assert_eq!(unknown_user.status_code(), 401);
        assert_eq!(
            wrong_password.json::<serde_json::Value>()["message"],
            unknown_user.json::<serde_json::Value>()["message"]
        );

        assert_eq!(app.server.get("/me").await.status_code(), 401);
        Ok(())
    }

    #[tokio::test]
    async fn login_ignores_extra_fields() -> Result<()> {
        let app = app().await?;
        create_active_user(app.db.clone(), "bob", "bob@mail.com", "Secret#123").await?;

        let response = app
            .server
            .post("/login")
            .json(&json!({ "identifier": "bob", "email": "bob@mail.com", "password": "Secret#123" }))
            .await;

        assert_eq!(response.status_code(), 200);
        Ok(())
    }

    #[tokio::test]
    async fn logout_ends_session() -> Result<()> {
        let app = app().await?;
        create_active_user(app.db.clone(), "bob", "bob@mail.com", "Secret#123").await?;
        login(&app.server, "bob", "Secret#123").await;

        let response = app.server.get("/check-session").await;
        let body = response.json::<CheckSessionResponse>();
        assert!(body.is_authenticated);
        assert_eq!(body.user.unwrap().username, "bob");

        let response = app.server.post("/logout").await;
        assert_eq!(response.status_code(), 200);

        let body = app.server.get("/check-session").await.json::<CheckSessionResponse>();
        assert!(!body.is_authenticated);
        assert!(body.user.is_none());
        assert_eq!(app.server.get("/me").await.status_code(), 401);
        Ok(())
    }

    #[tokio::test]
    async fn remember_me_controls_cookie_lifetime() -> Result<()> {
        let app = app().await?;
        create_active_user(app.db.clone(), "bob", "bob@mail.com", "Secret#123").await?;

        let response = login(&app.server, "bob", "Secret#123").await;
        let cookie = response.cookie(super::super::SESSION_COOKIE);
        assert!(cookie.http_only().unwrap_or(false));
        assert!(cookie.max_age().is_none() && cookie.expires_datetime().is_none());

        let response = app
            .server
            .post("/login")
            .json(&json!({ "identifier": "bob", "password": "Secret#123", "rememberMe": true }))
            .await;
        let cookie = response.cookie(super::super::SESSION_COOKIE);
        assert!(cookie.max_age().is_some() || cookie.expires_datetime().is_some());

        let response = login(&app.server, "bob", "Secret#123").await;
        let cookie = response.cookie(super::super::SESSION_COOKIE);
        assert!(cookie.max_age().is_none() && cookie.expires_datetime().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn password_reset_flow() -> Result<()> {
        let app = app().await?;
        create_active_user(app.db.clone(), "bob", "bob@mail.com", "Secret#123").await?;

        let response = app
            .server
            .post("/forgot-password")
            .json(&json!({ "email": "bob@mail.com" }))
            .await;
        assert_eq!(response.status_code(), 200);

        let token = reset_token(app.db.clone(), "bob@mail.com").await;
        let mail = app.mailer.last_to("bob@mail.com").unwrap();
        assert!(mail.body.contains(&format!("/reset-password/{token}")));

        let response = app
            .server
            .post(&format!("/reset-password/{token}"))
            .json(&json!({ "password": "weak" }))
            .await;
        assert_eq!(response.status_code(), 400);

        let response = app
            .server
            .post(&format!("/reset-password/{token}"))
            .json(&json!({ "password": "Changed#456" }))
            .await;
        assert_eq!(response.status_code(), 200);

        let response = app
            .server
            .post(&format!("/reset-password/{token}"))
            .json(&json!({ "password": "Another#789" }))
            .await;
        assert_eq!(response.status_code(), 400);

        assert_eq!(login(&app.server, "bob", "Secret#123").await.status_code(), 401);
        assert_eq!(login(&app.server, "bob", "Changed#456").await.status_code(), 200);
        Ok(())
    }

    #[tokio::test]
    async fn forgot_password_hides_unknown_emails() -> Result<()> {
        let app = app().await?;
        create_active_user(app.db.clone(), "bob", "bob@mail.com", "Secret#123").await?;

        let known = app
            .server
            .post("/forgot-password")
            .json(&json!({ "email": "bob@mail.com" }))
            .await;
        let unknown = app
            .server
            .post("/forgot-password")
            .json(&json!({ "email": "nobody@mail.com" }))
            .await;

        assert_eq!(known.status_code(), 200);
        assert_eq!(unknown.status_code(), 200);
        assert_eq!(known.text(), unknown.text());
        assert!(app.mailer.last_to("nobody@mail.com").is_none());

        let missing = app.server.post("/forgot-password").json(&json!({})).await;
        assert_eq!(missing.status_code(), 400);
        Ok(())
    }

    #[tokio::test]
    async fn expired_reset_token_is_rejected() -> Result<()> {
        let app = app().await?;
        create_active_user(app.db.clone(), "bob", "bob@mail.com", "Secret#123").await?;
        set_reset_token(
            app.db.clone(),
            "bob@mail.com".into(),
            "stale".into(),
            Utc::now() - Duration::minutes(1),
        )
        .await?;

        let response = app
            .server
            .post("/reset-password/stale")
            .json(&json!({ "password": "Changed#456" }))
            .await;

        assert_eq!(response.status_code(), 400);
        assert_eq!(login(&app.server, "bob", "Secret#123").await.status_code(), 200);
        Ok(())
    }

    #[tokio::test]
    async fn password_reset_invalidates_other_sessions() -> Result<()> {
        let app = app().await?;
        create_active_user(app.db.clone(), "bob", "bob@mail.com", "Secret#123").await?;
        login(&app.server, "bob", "Secret#123").await;
        assert_eq!(app.server.get("/me").await.status_code(), 200);

        let other: TestServer = app.client().await?;
        other
            .post("/forgot-password")
            .json(&json!({ "email": "bob@mail.com" }))
            .await;
        let token = reset_token(app.db.clone(), "bob@mail.com").await;
        other
            .post(&format!("/reset-password/{token}"))
            .json(&json!({ "password": "Changed#456" }))
            .await;

        assert_eq!(app.server.get("/me").await.status_code(), 401);
        Ok(())
    }

    #[tokio::test]
    async fn google_login_unconfigured() -> Result<()> {
        let app = app().await?;

        let response = app.server.get("/auth/google").await;

        assert_eq!(response.status_code(), 503);
        Ok(())
    }

    #[tokio::test]
    async fn google_callback_failure_redirects_to_login() -> Result<()> {
        let app = app().await?;

        let response = app
            .server
            .get("/auth/google/callback")
            .add_query_param("code", "abc")
            .add_query_param("state", "xyz")
            .await;

        assert_eq!(response.status_code(), 303);
        assert_eq!(
            response.header("location"),
            "http://localhost:5173/login?error=auth_failed"
        );
        Ok(())
    }
}
