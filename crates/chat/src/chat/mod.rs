/// Message cache mirroring the authoritative lists.
pub mod cache;
pub mod collapse;
pub mod deletion;
/// Notifications emitted to the rendering layer.
pub mod events;
/// Domain entities shared by the view components.
pub mod message;
pub mod navigator;
/// Sibling groups derived from parent links.
pub mod tree;
pub mod view;
pub mod viewport;

pub use cache::MessageCache;
pub use collapse::{
    CollapseConfig, CollapseController, CollapseRender, CollapseState, CollapseTask, ContentKind,
    ToggleLabel, collapsed_preference_key,
};
pub use deletion::{DeletionOutcome, descendant_closure, remove_subtree};
pub use events::{
    CollapseToggled, ConversationOpened, MessageEdited, MessagesRevalidated, SiblingSelected,
    SubtreeDeleted, ViewEvent,
};
pub use message::{ConversationId, Message, MessageId, Role};
pub use navigator::{NavigationAffordance, SiblingNavigator};
pub use tree::{GroupAnchor, MessageTree, RowKey, ThreadRow};
pub use view::{ContentMount, ConversationView, RenderedRow, ViewTask};
pub use viewport::{
    AttemptOutcome, BringIntoView, JumpKind, JumpOutcome, JumpRequest, RequestId, ViewportConfig,
    ViewportCoordinator, ViewportTask,
};
