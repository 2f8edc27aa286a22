//! Secret registry
//!
//! Values registered here never show up in plain text: the console writer
//! and the log collector both run their output through [`SecretRegistry::mask`].

use std::io;
use std::sync::{Arc, PoisonError, RwLock};
use tracing_subscriber::fmt::MakeWriter;

/// Replacement written in place of a secret
pub const MASK: &str = "****";

/// Shared list of values that must not be printed
#[derive(Debug, Clone, Default)]
pub struct SecretRegistry {
    secrets: Arc<RwLock<Vec<String>>>,
}

impl SecretRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a value to be masked from now on
    ///
    /// Empty values are ignored.
    pub fn register(&self, secret: impl Into<String>) {
        let secret = secret.into();
        if secret.is_empty() {
            return;
        }

        let mut secrets = self.secrets.write().unwrap_or_else(PoisonError::into_inner);
        if !secrets.contains(&secret) {
            secrets.push(secret);
            // Longest first, so a secret containing another is masked whole
            secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
        }
    }

    /// Returns `text` with every registered secret replaced by [`MASK`]
    pub fn mask(&self, text: &str) -> String {
        let secrets = self.secrets.read().unwrap_or_else(PoisonError::into_inner);
        secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), MASK))
    }

    pub fn len(&self) -> usize {
        self.secrets.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `MakeWriter` wrapper that masks secrets before they reach the inner writer
#[derive(Debug, Clone)]
pub struct MaskingMakeWriter<M> {
    inner: M,
    secrets: SecretRegistry,
}

impl<M> MaskingMakeWriter<M> {
    pub fn new(inner: M, secrets: SecretRegistry) -> Self {
        Self { inner, secrets }
    }
}

impl<'a, M> MakeWriter<'a> for MaskingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = MaskingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        MaskingWriter {
            inner: self.inner.make_writer(),
            secrets: self.secrets.clone(),
        }
    }
}

/// Writer produced by [`MaskingMakeWriter`]
pub struct MaskingWriter<W> {
    inner: W,
    secrets: SecretRegistry,
}

impl<W: io::Write> io::Write for MaskingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let masked = self.secrets.mask(&text);
        self.inner.write_all(masked.as_bytes())?;
        // The caller's bytes are consumed even if masking changed the length
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_mask_replaces_registered_values() {
        let secrets = SecretRegistry::new();
        secrets.register("Splunk abc-123");

        assert_eq!(
            secrets.mask("Authorization: Splunk abc-123"),
            "Authorization: ****"
        );
    }

    #[test]
    fn test_longer_secret_masked_first() {
        let secrets = SecretRegistry::new();
        secrets.register("abc");
        secrets.register("Splunk abc");

        assert_eq!(secrets.mask("token=Splunk abc"), "token=****");
        assert_eq!(secrets.mask("raw=abc"), "raw=****");
    }

    #[test]
    fn test_empty_and_duplicate_secrets_ignored() {
        let secrets = SecretRegistry::new();
        secrets.register("");
        secrets.register("value");
        secrets.register("value");

        assert_eq!(secrets.len(), 1);
        assert_eq!(secrets.mask("nothing here"), "nothing here");
    }

    #[test]
    fn test_clones_share_registrations() {
        let secrets = SecretRegistry::new();
        let clone = secrets.clone();
        clone.register("shared");

        assert_eq!(secrets.mask("shared"), MASK);
    }

    #[test]
    fn test_masking_writer() {
        let secrets = SecretRegistry::new();
        secrets.register("hunter2");

        let mut writer = MaskingWriter {
            inner: Vec::new(),
            secrets,
        };
        let written = writer.write(b"password is hunter2\n").unwrap();

        assert_eq!(written, 20);
        assert_eq!(String::from_utf8(writer.inner).unwrap(), "password is ****\n");
    }
}
