//! Text renditions of the user pages.
//!
//! Every page is rendered into a [`Frame`]. A frame that still waits for data carries the
//! handles of the computations it waits for, so the caller can render it again once they have
//! settled.
use async_memo::{AsyncMemoCache, Boundary, LoadState, Suspend, View};
use futures::future::join_all;
use tokio::runtime::Handle;

use crate::api::{ApiError, FakeApi, GetUser, GetUserDetail, User, UserDetail, next_user};

/// One rendered frame of a page.
#[derive(Debug)]
pub struct Frame {
    pub text: String,
    pub pending: Vec<Suspend>,
}

impl Frame {
    /// Returns `true` if nothing on the page is loading anymore.
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    /// Waits until everything this frame was waiting for has settled.
    pub async fn settled(self) {
        join_all(self.pending).await;
    }
}

/// A user page showing a user's name and details, each behind its own boundary.
#[derive(Debug)]
pub struct UserPage {
    users: AsyncMemoCache<User, ApiError>,
    details: AsyncMemoCache<UserDetail, ApiError>,
    get_user: GetUser,
    get_user_detail: GetUserDetail,
    user_boundary: Boundary,
    detail_boundary: Boundary,
}

impl UserPage {
    pub fn new(api: &FakeApi, runtime: Handle) -> Self {
        Self {
            users: AsyncMemoCache::new("users", runtime.clone()),
            details: AsyncMemoCache::new("user_details", runtime),
            get_user: api.get_user(),
            get_user_detail: api.get_user_detail(),
            user_boundary: Boundary::new("loading user...", "error!"),
            detail_boundary: Boundary::new("loading user detail...", "error!"),
        }
    }

    /// Renders the page for user `id`.
    pub fn render(&self, id: u32) -> Frame {
        let user = View::from(self.users.read(&self.get_user, (id,)));
        let detail = View::from(self.details.read(&self.get_user_detail, (id,)));

        let text = format!(
            "[next]\n{}\n{}",
            self.user_boundary
                .render(&user, |user| format!("# {}", user.name)),
            self.detail_boundary
                .render(&detail, |detail| detail.detail.to_string()),
        );
        let pending = [user.pending(), detail.pending()]
            .into_iter()
            .flatten()
            .cloned()
            .collect();

        Frame { text, pending }
    }

    /// Shows user `start` and then clicks "next" `steps` times.
    ///
    /// Every frame is passed to `emit`, including the loading ones.
    pub async fn walk<F>(&self, start: u32, steps: usize, mut emit: F)
    where
        F: FnMut(u32, &str),
    {
        let mut id = start;
        for step in 0..=steps {
            if step > 0 {
                id = next_user(id);
            }
            loop {
                let frame = self.render(id);
                emit(id, &frame.text);
                if frame.is_complete() {
                    break;
                }
                frame.settled().await;
            }
        }
    }
}

/// Renders the state of a user loader.
pub fn render_loader(state: &LoadState<User, ApiError>) -> String {
    if let Some(err) = &state.error {
        return format!("error: {err}");
    }
    if state.is_loading {
        return "loading......".to_owned();
    }
    match &state.data {
        Some(user) => format!("{} (#{})", user.name, user.id),
        None => String::new(),
    }
}
