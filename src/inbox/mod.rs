//! Inbox: conversations with contacts and a live message view.

pub mod routes;
pub mod timeline;
pub mod view;

pub use routes::{InboxRouteState, inbox_routes};
pub use timeline::MessageTimeline;
pub use view::{ConversationView, InboxEvent};
