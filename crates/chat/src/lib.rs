#![deny(unsafe_code)]

/// Client core of a branching conversation view.
///
/// Tracks the displayed sibling at every branch point, mirrors subtree deletions in
/// the local cache, keeps rows visible while their layout settles and manages
/// per-message collapsing. Rendering itself stays with the embedding runtime.
pub mod chat;
/// Element geometry and scrolling contract of the rendering layer.
pub mod layout;
pub mod schedule;
pub mod selection;
/// Settings persistence.
pub mod settings;
