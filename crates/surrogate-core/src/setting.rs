//! Administrative feature flag

use tokio::sync::watch;

/// Setting key as registered with the host
pub const ENABLE_SETTING_KEY: &str = "enablePlayerTileEditing";

/// Scope the setting is stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingScope {
    /// Shared by every participant of the world
    World,
    /// Per client process
    Client,
}

/// Boolean feature flag with change notification.
///
/// Cheap to read; safe to call from per-interaction permission checks.
#[derive(Debug)]
pub struct FeatureFlag {
    key: &'static str,
    scope: SettingScope,
    tx: watch::Sender<bool>,
}

impl FeatureFlag {
    pub fn new(key: &'static str, scope: SettingScope, initial: bool) -> Self {
        let (tx, _rx) = watch::channel(initial);
        FeatureFlag { key, scope, tx }
    }

    /// The delegation switch, world scoped, off by default
    pub fn delegation() -> Self {
        Self::new(ENABLE_SETTING_KEY, SettingScope::World, false)
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn scope(&self) -> SettingScope {
        self.scope
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Set the flag; subscribers are notified only when the value changes.
    /// Returns true if it changed.
    pub fn set(&self, enabled: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == enabled {
                return false;
            }
            *current = enabled;
            true
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for FeatureFlag {
    fn default() -> Self {
        Self::delegation()
    }
}
