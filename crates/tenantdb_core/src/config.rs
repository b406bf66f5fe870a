//! Store configuration.

/// Whether a store accepts entity operations from the current context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessPolicy {
    /// All operations are allowed.
    #[default]
    Allow,
    /// Every operation fails with [`CoreError::Forbidden`](crate::CoreError::Forbidden).
    ///
    /// Used for stores handed to code that must not touch entities directly.
    Forbid,
}

/// Configuration for an [`EmulatedStore`](crate::EmulatedStore).
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Access policy.
    pub access: AccessPolicy,
}

impl StoreConfig {
    /// Creates a configuration that allows every operation.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            access: AccessPolicy::Allow,
        }
    }

    /// Sets the access policy.
    #[must_use]
    pub const fn access(mut self, access: AccessPolicy) -> Self {
        self.access = access;
        self
    }

    /// Creates a configuration whose store rejects every operation.
    #[must_use]
    pub const fn forbidden() -> Self {
        Self::new().access(AccessPolicy::Forbid)
    }
}
