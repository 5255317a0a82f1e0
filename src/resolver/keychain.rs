//! Credential storage keyed on chain comparables.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::spec::PathSpec;

/// One credential value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Passwords, recovery passwords.
    Text(String),
    /// Raw keys, startup key material.
    Bytes(Vec<u8>),
}

impl Credential {
    /// The credential as raw bytes (UTF-8 for text).
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Credential::Text(text) => text.as_bytes(),
            Credential::Bytes(bytes) => bytes,
        }
    }
}

impl From<&str> for Credential {
    fn from(value: &str) -> Self {
        Credential::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Credential {
    fn from(value: Vec<u8>) -> Self {
        Credential::Bytes(value)
    }
}

/// Mapping (chain comparable → credential name → value).
///
/// Credential names are per back-end type: `password`, `recovery_password`,
/// `key`, `startup_key`. Cloning is cheap; clones share the store, which is
/// what lets a scanner and a resolver context observe the same unlocks.
#[derive(Debug, Default, Clone)]
pub struct KeyChain {
    inner: Arc<Mutex<HashMap<String, HashMap<String, Credential>>>>,
}

impl KeyChain {
    /// An empty key chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide convenience instance.
    pub fn global() -> &'static KeyChain {
        static GLOBAL: OnceLock<KeyChain> = OnceLock::new();
        GLOBAL.get_or_init(KeyChain::new)
    }

    /// Store a credential for the exact chain.
    pub fn set(&self, spec: &PathSpec, name: &str, credential: impl Into<Credential>) {
        let mut inner = self.inner.lock().expect("key chain lock");
        inner
            .entry(spec.comparable())
            .or_default()
            .insert(name.to_string(), credential.into());
    }

    /// Look up a credential for the exact chain.
    pub fn get(&self, spec: &PathSpec, name: &str) -> Option<Credential> {
        let inner = self.inner.lock().expect("key chain lock");
        inner.get(&spec.comparable())?.get(name).cloned()
    }

    /// Drop every credential stored for the chain.
    pub fn forget(&self, spec: &PathSpec) {
        let mut inner = self.inner.lock().expect("key chain lock");
        inner.remove(&spec.comparable());
    }

    /// Drop all credentials.
    pub fn clear(&self) {
        self.inner.lock().expect("key chain lock").clear();
    }
}
