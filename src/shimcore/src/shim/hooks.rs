//! An explicit registry of log hooks. Its owner installs and removes hooks;
//! nothing about it is process wide.

use core::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use spin::RwLock;

/// The signature of a log sink, such as [`super::on_host_log_request`].
pub type LogSinkFn = fn(&str);

/// Identifies an installed hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HookId(u32);

/// The reasons a registry operation fails.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// Every slot holds a hook.
    #[error("all hook slots are in use")]
    Full,

    /// Hook names are unique within a registry.
    #[error("a hook named `{name}` is already installed")]
    DuplicateName {
        /// The name that was requested.
        name: &'static str,
    },

    /// The hook was never installed or was already removed.
    #[error("no such hook is installed")]
    NotInstalled,
}

#[derive(Clone, Copy)]
struct Hook {
    id: HookId,
    name: &'static str,
    sink: LogSinkFn,
}

/// A fixed capacity table of named log sinks.
pub struct HookRegistry<const N: usize> {
    hooks: RwLock<[Option<Hook>; N]>,
    next_id: AtomicU32,
}

impl<const N: usize> HookRegistry<N> {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hooks: RwLock::new([None; N]),
            next_id: AtomicU32::new(1),
        }
    }

    /// Installs `sink` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] if `name` is taken, or
    /// [`RegistryError::Full`] if every slot is used.
    pub fn install(&self, name: &'static str, sink: LogSinkFn) -> Result<HookId, RegistryError> {
        let mut hooks = self.hooks.write();
        if hooks.iter().flatten().any(|hook| hook.name == name) {
            return Err(RegistryError::DuplicateName { name });
        }
        let slot = hooks
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(RegistryError::Full)?;
        let id = HookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        *slot = Some(Hook { id, name, sink });
        Ok(id)
    }

    /// Removes the hook `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotInstalled`] if `id` was already removed.
    pub fn remove(&self, id: HookId) -> Result<(), RegistryError> {
        let mut hooks = self.hooks.write();
        let slot = hooks
            .iter_mut()
            .find(|slot| slot.is_some_and(|hook| hook.id == id))
            .ok_or(RegistryError::NotInstalled)?;
        *slot = None;
        Ok(())
    }

    /// Removes every hook.
    pub fn clear(&self) {
        *self.hooks.write() = [None; N];
    }

    /// Passes `message` to every installed hook and returns how many ran.
    pub fn dispatch(&self, message: &str) -> usize {
        // Sinks run on a copy so that they may install or remove hooks.
        let hooks = *self.hooks.read();
        let mut count = 0;
        for hook in hooks.iter().flatten() {
            (hook.sink)(message);
            count += 1;
        }
        count
    }

    /// Returns whether a hook named `name` is installed.
    pub fn contains(&self, name: &str) -> bool {
        self.hooks.read().iter().flatten().any(|hook| hook.name == name)
    }

    /// Returns the number of installed hooks.
    pub fn len(&self) -> usize {
        self.hooks.read().iter().flatten().count()
    }

    /// Returns whether no hook is installed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<const N: usize> Default for HookRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for HookRegistry<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hooks = *self.hooks.read();
        f.debug_list()
            .entries(hooks.iter().flatten().map(|hook| (hook.id, hook.name)))
            .finish()
    }
}
