use crate::adapter::{rejected, BackendRequest, StoreAdapter};
use crate::backend::Backend;
use crate::error::{FetchError, Result};
use crate::models::{ChatHistory, UserProfile};
use crate::request_key::RequestKey;
use crate::retry::RetryPolicy;
use crate::store::{Reducer, Store};
use crate::throttle_config::ThrottleConfig;
use crate::throttler::Throttler;
use futures::future::{BoxFuture, FutureExt};
use serde::de::IgnoredAny;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatResource {
    User,
    Chats,
    Users,
    Insert,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChatLoading {
    pub user: bool,
    pub chats: bool,
    pub users: bool,
    pub insert: bool,
}

impl ChatLoading {
    pub fn get(&self, resource: ChatResource) -> bool {
        match resource {
            ChatResource::User => self.user,
            ChatResource::Chats => self.chats,
            ChatResource::Users => self.users,
            ChatResource::Insert => self.insert,
        }
    }

    fn set(&mut self, resource: ChatResource, value: bool) {
        match resource {
            ChatResource::User => self.user = value,
            ChatResource::Chats => self.chats = value,
            ChatResource::Users => self.users = value,
            ChatResource::Insert => self.insert = value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatState {
    pub error: Option<FetchError>,
    pub chats: Vec<ChatHistory>,
    pub user: Option<UserProfile>,
    pub users: Vec<UserProfile>,
    pub loading: ChatLoading,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatAction {
    HasError(FetchError),
    SetLoading { key: ChatResource, value: bool },
    GetUserSuccess(UserProfile),
    GetUserChatsSuccess(Vec<ChatHistory>),
    GetUsersSuccess(Vec<UserProfile>),
    InsertChatSuccess,
}

pub struct ChatReducer;

impl Reducer for ChatReducer {
    type State = ChatState;
    type Action = ChatAction;
    type Resource = ChatResource;

    fn reduce(state: &mut ChatState, action: ChatAction) {
        match action {
            ChatAction::HasError(err) => state.error = Some(err),
            ChatAction::SetLoading { key, value } => state.loading.set(key, value),
            ChatAction::GetUserSuccess(user) => {
                state.user = Some(user);
                state.loading.user = false;
            }
            ChatAction::GetUserChatsSuccess(chats) => {
                state.chats = chats;
                state.loading.chats = false;
            }
            ChatAction::GetUsersSuccess(users) => {
                state.users = users;
                state.loading.users = false;
            }
            ChatAction::InsertChatSuccess => state.loading.insert = false,
        }
    }

    fn set_loading(resource: ChatResource, value: bool) -> ChatAction {
        ChatAction::SetLoading { key: resource, value }
    }

    fn has_error(error: FetchError) -> ChatAction {
        ChatAction::HasError(error)
    }
}

/// Chat users and histories backed by the REST API
pub struct ChatContext {
    adapter: StoreAdapter<ChatReducer>,
}

impl ChatContext {
    pub fn new(backend: Arc<dyn Backend>, config: ThrottleConfig) -> Result<Self> {
        let throttler = Arc::new(Throttler::new(config)?);
        Ok(Self::with_throttler(backend, throttler))
    }

    /// Share `throttler` with other holders; it is only reset when the last
    /// holder drops
    pub fn with_throttler(backend: Arc<dyn Backend>, throttler: Arc<Throttler<Value>>) -> Self {
        Self {
            adapter: StoreAdapter::new(Store::default(), throttler, backend),
        }
    }

    pub fn state(&self) -> ChatState {
        self.adapter.store().state()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.adapter.store().subscribe()
    }

    pub fn dispatch(&self, action: ChatAction) {
        self.adapter.store().dispatch(action);
    }

    pub fn throttler(&self) -> &Arc<Throttler<Value>> {
        self.adapter.throttler()
    }

    pub fn get_user(&self, id: u64, force_refresh: bool) -> BoxFuture<'static, Result<UserProfile>> {
        self.adapter.fetch(
            ChatResource::User,
            RequestKey::with_param("getUser", id),
            BackendRequest::post("/api/chat/users/id", json!({ "id": id })),
            force_refresh,
            ChatAction::GetUserSuccess,
        )
    }

    /// Resolves to `None` without touching the store when `user` is absent
    pub fn get_user_chats(
        &self,
        user: Option<&str>,
        force_refresh: bool,
    ) -> BoxFuture<'static, Result<Option<Vec<ChatHistory>>>> {
        let Some(user) = user else {
            return futures::future::ready(Ok(None)).boxed();
        };
        self.adapter
            .fetch(
                ChatResource::Chats,
                RequestKey::with_param("getUserChats", user),
                BackendRequest::post("/api/chat/filter", json!({ "user": user })),
                force_refresh,
                ChatAction::GetUserChatsSuccess,
            )
            .map(|result| result.map(Some))
            .boxed()
    }

    pub fn get_users(&self, force_refresh: bool) -> BoxFuture<'static, Result<Vec<UserProfile>>> {
        self.adapter.fetch(
            ChatResource::Users,
            RequestKey::new("getUsers"),
            BackendRequest::get("/api/chat/users").field("users"),
            force_refresh,
            ChatAction::GetUsersSuccess,
        )
    }

    /// Single attempt, never deduplicated; any response body is ignored
    pub fn insert_chat(&self, chat: &ChatHistory) -> BoxFuture<'static, Result<()>> {
        let body = match serde_json::to_value(chat) {
            Ok(body) => body,
            Err(err) => return rejected(err.into()),
        };
        self.adapter
            .mutate(
                ChatResource::Insert,
                BackendRequest::post("/api/chat/insert", body),
                RetryPolicy::no_retry(),
                |_: IgnoredAny| ChatAction::InsertChatSuccess,
            )
            .map(|result| result.map(|_| ()))
            .boxed()
    }
}

impl Drop for ChatContext {
    fn drop(&mut self) {
        // Shared throttlers keep their state for the remaining owners
        if Arc::strong_count(self.adapter.throttler()) == 1 {
            self.adapter.throttler().reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_success_only_clears_insert_flag() {
        let mut state = ChatState::default();
        ChatReducer::reduce(&mut state, ChatReducer::set_loading(ChatResource::Insert, true));
        ChatReducer::reduce(&mut state, ChatReducer::set_loading(ChatResource::Users, true));
        ChatReducer::reduce(&mut state, ChatAction::InsertChatSuccess);

        assert!(!state.loading.insert);
        assert!(state.loading.get(ChatResource::Users));
    }

    #[test]
    fn test_last_error_wins() {
        let mut state = ChatState::default();
        ChatReducer::reduce(&mut state, ChatReducer::has_error(FetchError::Transport("first".into())));
        ChatReducer::reduce(&mut state, ChatReducer::has_error(FetchError::Transport("second".into())));
        assert_eq!(state.error, Some(FetchError::Transport("second".into())));
    }
}
