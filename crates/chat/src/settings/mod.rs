pub mod state;

pub use state::{CollapseSettings, SettingsError, SettingsStore, ViewSettings, ViewportSettings};
