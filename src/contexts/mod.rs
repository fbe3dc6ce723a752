//! Reducer stores for each group of screens, each owning its throttler.

pub mod chat;
pub mod product;

pub use chat::{ChatAction, ChatContext, ChatReducer, ChatResource, ChatState};
pub use product::{ProductAction, ProductContext, ProductReducer, ProductResource, ProductState};
