use axum::{
    async_trait,
    extract::{Extension, FromRequestParts},
    http::request::Parts,
    response::{IntoResponse, Response},
    RequestPartsExt,
};

use crate::{
    auth::AuthSession,
    db::DB,
    users::{PublicUser, UserId},
    Error,
};

/// Per-request handles passed down to the handlers.
#[derive(Clone, FromRequestParts)]
pub struct BaseParams {
    pub ctx: Ctx,
    #[from_request(via(Extension))]
    pub db: DB,
}

#[derive(Clone, Debug)]
pub struct Ctx {
    pub user: Option<PublicUser>,
}

impl Ctx {
    pub fn get_user_id(&self) -> Option<UserId> {
        self.user.as_ref().map(|u| u.id)
    }

    pub fn require_user_id(&self) -> Result<UserId, Error> {
        self.get_user_id().ok_or(Error::Unauthorized)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .extract::<AuthSession>()
            .await
            .map_err(|e| e.into_response())?
            .user
            .as_ref()
            .map(PublicUser::from);

        Ok(Self { user })
    }
}
