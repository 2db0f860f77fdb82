use axum::async_trait;
use axum_login::AuthUser;
use oauth2::{url::Url, CsrfToken};

use crate::{
    db::{self, DB},
    users::{
        auth::{find_active_by_identifier, find_one_by_id, google_login, GetUserByIdParameters, GoogleLoginParameters},
        User, UserId,
    },
    Error,
};

use super::{password::verify_password, GoogleOAuth};

#[derive(Debug, Clone)]
pub enum Credentials {
    Password(PasswordCredentials),
    Google(GoogleCredentials),
}

#[derive(Clone)]
pub struct PasswordCredentials {
    pub identifier: String,
    pub password: String,
}

impl std::fmt::Debug for PasswordCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordCredentials")
            .field("identifier", &self.identifier)
            .field("password", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GoogleCredentials {
    pub code: String,
    pub old_state: CsrfToken,
    pub state: CsrfToken,
}

impl AuthUser for User {
    type Id = UserId;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn session_auth_hash(&self) -> &[u8] {
        self.password
            .as_deref()
            .or(self.google_id.as_deref())
            .map(str::as_bytes)
            .unwrap_or(&[])
    }
}

#[derive(Clone)]
pub struct AuthBackend {
    db: DB,
    google: Option<GoogleOAuth>,
}

impl AuthBackend {
    pub fn new(db: DB, google: Option<GoogleOAuth>) -> Self {
        Self { db, google }
    }

    pub fn google(&self) -> Result<&GoogleOAuth, Error> {
        self.google
            .as_ref()
            .ok_or_else(|| Error::ServiceUnavailable("Google login is not configured".into()))
    }

    pub fn authorize_url(&self) -> Result<(Url, CsrfToken), Error> {
        Ok(self.google()?.authorize_url())
    }

    async fn authenticate_password(&self, creds: PasswordCredentials) -> Result<Option<User>, Error> {
        let Some(user) = find_active_by_identifier(self.db.clone(), creds.identifier.clone()).await? else {
            tracing::warn!(identifier = %creds.identifier, "login failed: no active account");
            return Ok(None);
        };

        let Some(hash) = user.password.clone() else {
            tracing::warn!(user_id = user.id, "login failed: account has no password");
            return Ok(None);
        };

        if !verify_password(creds.password, hash).await? {
            tracing::warn!(user_id = user.id, "login failed: wrong password");
            return Ok(None);
        }

        Ok(Some(user))
    }

    async fn authenticate_google(&self, creds: GoogleCredentials) -> Result<Option<User>, Error> {
        if creds.old_state.secret() != creds.state.secret() {
            return Err(Error::CsrfValidationFailed);
        }

        let profile = self.google()?.fetch_profile(creds.code).await?;
        let email = profile
            .email
            .clone()
            .ok_or_else(|| Error::OAuth("Google account has no email address".into()))?;

        let user = google_login(
            self.db.clone(),
            GoogleLoginParameters {
                google_id: profile.sub,
                email,
                display_name: profile.name,
            },
        )
        .await?;

        Ok(Some(user))
    }
}

#[async_trait]
impl axum_login::AuthnBackend for AuthBackend {
    type User = User;
    type Credentials = Credentials;
    type Error = Error;

    async fn authenticate(&self, creds: Self::Credentials) -> Result<Option<Self::User>, Self::Error> {
        let user = match creds {
            Credentials::Password(creds) => self.authenticate_password(creds).await?,
            Credentials::Google(creds) => self.authenticate_google(creds).await?,
        };

        if let Some(user) = &user {
            tracing::info!(user_id = user.id, "user authenticated");
        }

        Ok(user)
    }

    async fn get_user(&self, user_id: &axum_login::UserId<Self>) -> Result<Option<Self::User>, Self::Error> {
        let user = find_one_by_id(
            self.db.clone(),
            GetUserByIdParameters {
                user_id: user_id.to_owned(),
            },
        )
        .await;

        match user {
            Ok(user) => Ok(Some(user)),
            Err(db::Error::NotFound(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

pub type AuthSession = axum_login::AuthSession<AuthBackend>;

#[cfg(test)]
mod tests {
    use axum_login::AuthnBackend;

    use crate::{db::init_test_db, tests::create_active_user, users::auth::create_local};

    use super::*;

    fn password(identifier: &str, password: &str) -> Credentials {
        Credentials::Password(PasswordCredentials {
            identifier: identifier.into(),
            password: password.into(),
        })
    }

    #[tokio::test]
    async fn authenticates_by_username_or_email() {
        let db = init_test_db().await.unwrap();
        let bob = create_active_user(db.clone(), "bob", "bob@mail.com", "Secret#123").await.unwrap();
        let backend = AuthBackend::new(db, None);

        let by_username = backend.authenticate(password("BOB", "Secret#123")).await.unwrap();
        let by_email = backend.authenticate(password("Bob@Mail.com", "Secret#123")).await.unwrap();

        assert_eq!(by_username.unwrap().id, bob.id);
        assert_eq!(by_email.unwrap().id, bob.id);
    }

    #[tokio::test]
    async fn rejects_wrong_password_and_pending_users() {
        let db = init_test_db().await.unwrap();
        create_active_user(db.clone(), "bob", "bob@mail.com", "Secret#123").await.unwrap();
        create_local(
            db.clone(),
            crate::users::auth::CreateUserParameters {
                username: "alice".into(),
                email: "alice@mail.com".into(),
                password_hash: bcrypt::hash("Secret#123", crate::auth::password::MIN_BCRYPT_COST).unwrap(),
                verification_code: "12345".into(),
            },
        )
        .await
        .unwrap();
        let backend = AuthBackend::new(db, None);

        assert!(backend.authenticate(password("bob", "Secret#124")).await.unwrap().is_none());
        assert!(backend.authenticate(password("alice", "Secret#123")).await.unwrap().is_none());
        assert!(backend.authenticate(password("nobody", "Secret#123")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn google_requires_matching_state() {
        let db = init_test_db().await.unwrap();
        let backend = AuthBackend::new(db, None);

        let result = backend
            .authenticate(Credentials::Google(GoogleCredentials {
                code: "code".into(),
                old_state: CsrfToken::new("a".into()),
                state: CsrfToken::new("b".into()),
            }))
            .await;

        assert!(matches!(result, Err(Error::CsrfValidationFailed)));
    }

    #[tokio::test]
    async fn google_unconfigured() {
        let backend = AuthBackend::new(init_test_db().await.unwrap(), None);

        assert!(matches!(backend.authorize_url(), Err(Error::ServiceUnavailable(_))));
    }

    #[tokio::test]
    async fn get_user_missing_is_none() {
        let db = init_test_db().await.unwrap();
        let bob = create_active_user(db.clone(), "bob", "bob@mail.com", "Secret#123").await.unwrap();
        let backend = AuthBackend::new(db, None);

        assert!(backend.get_user(&bob.id).await.unwrap().is_some());
        assert!(backend.get_user(&(bob.id + 100)).await.unwrap().is_none());
    }

    #[test]
    fn session_hash_follows_password() {
        let bob = User {
            id: 1,
            username: "bob".into(),
            email: "bob@mail.com".into(),
            password: Some("hash-1".into()),
            google_id: Some("g-1".into()),
            status: crate::users::UserStatus::Active,
            verification_code: None,
            reset_password_token: None,
            reset_password_expires: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let google_only = User {
            password: None,
            ..bob.clone()
        };

        assert_eq!(bob.session_auth_hash(), b"hash-1");
        assert_eq!(google_only.session_auth_hash(), b"g-1");
    }
}
