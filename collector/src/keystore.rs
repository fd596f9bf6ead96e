//! Immutable store of MAC signing secrets.
//!
//! Secrets are decoded from base64 once at startup and never mutated, so
//! the store is safe for unsynchronized concurrent reads across request
//! handlers.

use std::collections::HashMap;
use std::fmt;

use base64::prelude::*;
use thiserror::Error;

/// A named signing secret.
#[derive(Clone)]
pub struct Secret {
    name: String,
    bytes: Vec<u8>,
}

impl Secret {
    /// Decode a secret from its base64-encoded configuration value.
    pub fn from_base64(name: impl Into<String>, encoded: &str) -> Result<Self, KeyStoreError> {
        let name = name.into();
        let bytes = BASE64_STANDARD
            .decode(encoded.trim())
            .map_err(|_| KeyStoreError::InvalidSecret { name: name.clone() })?;
        Ok(Secret { name, bytes })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

// Secret bytes must never reach logs.
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("name", &self.name)
            .field("bytes", &format_args!("[{} bytes]", self.bytes.len()))
            .finish()
    }
}

/// Errors raised while building the key store from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyStoreError {
    /// Configured value for a key is not valid base64.
    #[error("secret for key {name} is not valid base64")]
    InvalidSecret { name: String },
}

/// Immutable mapping of credential key names to signing secrets.
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    keys: HashMap<String, Secret>,
}

impl KeyStore {
    /// Build the store from `(name, base64 secret)` configuration pairs.
    pub fn from_config<'a, I>(pairs: I) -> Result<Self, KeyStoreError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut keys = HashMap::new();
        for (name, encoded) in pairs {
            let secret = Secret::from_base64(name, encoded)?;
            keys.insert(name.to_string(), secret);
        }
        Ok(KeyStore { keys })
    }

    pub fn get(&self, name: &str) -> Option<&Secret> {
        self.keys.get(name)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_decodes_base64() {
        let secret = Secret::from_base64("TestKey1", "dGVzdA==").unwrap();
        assert_eq!(secret.name(), "TestKey1");
        assert_eq!(secret.bytes(), b"test");
    }

    #[test]
    fn test_secret_rejects_invalid_base64() {
        let err = Secret::from_base64("Bad", "not base64!!!").unwrap_err();
        assert_eq!(
            err,
            KeyStoreError::InvalidSecret {
                name: "Bad".to_string()
            }
        );
    }

    #[test]
    fn test_secret_debug_redacts_bytes() {
        let secret = Secret::from_base64("TestKey1", "dGVzdA==").unwrap();
        let debug = format!("{secret:?}");
        assert!(debug.contains("TestKey1"));
        assert!(debug.contains("[4 bytes]"));
        assert!(!debug.contains("test"));
    }

    #[test]
    fn test_keystore_lookup() {
        let store = KeyStore::from_config(vec![
            ("TestKey1", "dGVzdA=="),
            ("TestKey2", "c2VjcmV0"),
        ])
        .unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("TestKey1").unwrap().bytes(), b"test");
        assert_eq!(store.get("TestKey2").unwrap().bytes(), b"secret");
        assert!(store.get("UnknownKey").is_none());
    }

    #[test]
    fn test_keystore_empty() {
        let store = KeyStore::from_config(vec![]).unwrap();
        assert!(store.is_empty());
        assert!(store.get("anything").is_none());
    }
}
