//! Reducer-driven state containers observed through a watch channel.

use crate::error::FetchError;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Pure state transition function plus the action vocabulary the
/// orchestration layer needs to report loading and failure.
pub trait Reducer: Send + Sync + 'static {
    type State: Clone + Default + fmt::Debug + Send + Sync + 'static;
    type Action: fmt::Debug + Send + 'static;
    /// Resource whose loading flag an action toggles
    type Resource: Copy + fmt::Debug + Send + Sync + 'static;

    fn reduce(state: &mut Self::State, action: Self::Action);

    fn set_loading(resource: Self::Resource, value: bool) -> Self::Action;

    fn has_error(error: FetchError) -> Self::Action;
}

/// Holds the state of one reducer. Actions are applied one at a time in
/// dispatch order; subscribers see every resulting state.
pub struct Store<R: Reducer> {
    state: Arc<watch::Sender<R::State>>,
}

impl<R: Reducer> Clone for Store<R> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<R: Reducer> Default for Store<R> {
    fn default() -> Self {
        Self::new(R::State::default())
    }
}

impl<R: Reducer> Store<R> {
    pub fn new(initial: R::State) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            state: Arc::new(sender),
        }
    }

    pub fn dispatch(&self, action: R::Action) {
        debug!(?action, "Dispatching action");
        self.state.send_modify(|state| R::reduce(state, action));
    }

    /// Snapshot of the current state
    pub fn state(&self) -> R::State {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<R::State> {
        self.state.subscribe()
    }
}
