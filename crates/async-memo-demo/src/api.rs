//! A mock user API with random latency.
use std::sync::Arc;
use std::time::Duration;

use async_memo::Operation;
use futures::FutureExt;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::config::Api;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: u32,
    pub name: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDetail {
    pub detail: &'static str,
}

pub const USERS: &[User] = &[
    User { id: 0, name: "Ann" },
    User { id: 1, name: "Bob" },
    User { id: 2, name: "Cid" },
];

pub const DETAILS: &[UserDetail] = &[
    UserDetail {
        detail: "Ann has been a member since 2019.",
    },
    UserDetail {
        detail: "Bob prefers dark mode.",
    },
    UserDetail {
        detail: "Cid has not logged in yet.",
    },
];

/// The id of the user after `id`, wrapping around after the last one.
pub fn next_user(id: u32) -> u32 {
    let count = USERS.len() as u32;
    (id % count + 1) % count
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("user {0} does not exist")]
    NotFound(u32),
    #[error("the user api is unavailable for user {0}")]
    Unavailable(u32),
}

/// The mock API shared by all its operations.
#[derive(Debug, Clone)]
pub struct FakeApi {
    max_latency: Duration,
    unavailable_users: Arc<[u32]>,
}

impl FakeApi {
    pub fn new(config: &Api) -> Self {
        Self {
            max_latency: config.max_latency,
            unavailable_users: config.unavailable_users.as_slice().into(),
        }
    }

    /// Waits a random time, then looks up the record of user `id`.
    async fn respond<T: Clone>(&self, records: &[T], id: u32) -> Result<T, ApiError> {
        let latency = rand::random_range(Duration::ZERO..=self.max_latency);
        tracing::trace!(id, ?latency, "Responding to user api request");
        tokio::time::sleep(latency).await;

        if self.unavailable_users.contains(&id) {
            return Err(ApiError::Unavailable(id));
        }
        records
            .get(id as usize)
            .cloned()
            .ok_or(ApiError::NotFound(id))
    }

    pub fn get_user(&self) -> GetUser {
        GetUser(self.clone())
    }

    pub fn get_user_detail(&self) -> GetUserDetail {
        GetUserDetail(self.clone())
    }
}

/// Fetches a [`User`] by id.
#[derive(Debug, Clone)]
pub struct GetUser(FakeApi);

impl Operation for GetUser {
    type Args = (u32,);
    type Output = User;
    type Error = ApiError;

    fn id(&self) -> &str {
        "getUser"
    }

    fn call(&self, (id,): (u32,)) -> BoxFuture<'static, Result<User, ApiError>> {
        let api = self.0.clone();
        async move { api.respond(USERS, id).await }.boxed()
    }
}

/// Fetches the [`UserDetail`] of a user by id.
#[derive(Debug, Clone)]
pub struct GetUserDetail(FakeApi);

impl Operation for GetUserDetail {
    type Args = (u32,);
    type Output = UserDetail;
    type Error = ApiError;

    fn id(&self) -> &str {
        "getUserDetail"
    }

    fn call(&self, (id,): (u32,)) -> BoxFuture<'static, Result<UserDetail, ApiError>> {
        let api = self.0.clone();
        async move { api.respond(DETAILS, id).await }.boxed()
    }
}
