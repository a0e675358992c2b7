//! Session synchronization core: fetches a session and its history, keeps one
//! live-channel handler set per session view, merges live traffic into an
//! ordered transcript, and derives the state a chat surface renders.

pub mod api;
pub mod bootstrap;
pub mod error;
pub mod lifecycle;
pub mod reducer;
pub mod session_view;
pub mod transcript;
pub mod view_state;

pub use api::{HttpSessionApi, SessionApi};
pub use bootstrap::BootstrapController;
pub use error::{FetchTarget, SyncError};
pub use lifecycle::{ChannelLifecycle, JoinStep, SESSION_EVENTS};
pub use reducer::{ChannelPhase, Effect, SessionViewState, ViewAction};
pub use session_view::{SessionView, SessionViewConfig, ViewNotice, ViewSnapshot};
pub use transcript::{merge, Transcript, TranscriptStore};
pub use view_state::{ChatStatus, ScrollAnchor, ScrollRequest, Viewport, DEFAULT_SCROLL_DELAY};
