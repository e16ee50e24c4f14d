//! Control-node key pair and the public key handed to the access stage.
//!
//! Pure functions only: no I/O, no async, no filesystem access.

use std::path::{Path, PathBuf};

use anyhow::Result;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

use crate::domain::error::CredentialError;

/// Key algorithm passed to `ssh-keygen -t`.
pub const KEY_ALGORITHM: &str = "rsa";

/// Key type token at the start of an OpenSSH RSA public key.
pub const KEY_TYPE: &str = "ssh-rsa";

/// Smallest RSA modulus accepted from configuration.
pub const MIN_KEY_BITS: u32 = 2048;

/// Location and shape of the control-node key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private: PathBuf,
    pub public: PathBuf,
    pub bits: u32,
}

impl KeyPair {
    /// Key pair rooted at `private`; the public half is `<private>.pub`.
    #[must_use]
    pub fn at(private: PathBuf, bits: u32) -> Self {
        let mut public = private.clone().into_os_string();
        public.push(".pub");
        Self {
            private,
            public: PathBuf::from(public),
            bits,
        }
    }

    /// `ssh-keygen` arguments that create this pair without a passphrase.
    ///
    /// `ssh-keygen` refuses to overwrite silently, so callers must only
    /// invoke it when the private half is absent.
    #[must_use]
    pub fn keygen_args(&self, comment: &str) -> Vec<String> {
        vec![
            "-q".to_string(),
            "-t".to_string(),
            KEY_ALGORITHM.to_string(),
            "-b".to_string(),
            self.bits.to_string(),
            "-N".to_string(),
            String::new(),
            "-C".to_string(),
            comment.to_string(),
            "-f".to_string(),
            self.private.display().to_string(),
        ]
    }

    /// `ssh-keygen` arguments that print the public half of the private key.
    #[must_use]
    pub fn derive_public_args(&self) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-f".to_string(),
            self.private.display().to_string(),
        ]
    }
}

/// The public half of the key pair, validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicKey {
    key_type: String,
    material: String,
    comment: Option<String>,
}

impl PublicKey {
    /// Parse the contents of an OpenSSH `.pub` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not an RSA key or its material is not
    /// a well-formed OpenSSH key blob.
    pub fn parse(text: &str, origin: &Path) -> Result<Self> {
        let malformed = |reason: &str| CredentialError::MalformedPublicKey {
            path: origin.display().to_string(),
            reason: reason.to_string(),
        };

        let line = text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && !l.starts_with('#'))
            .ok_or_else(|| malformed("file is empty"))?;

        let mut fields = line.split_whitespace();
        let key_type = fields.next().ok_or_else(|| malformed("missing key type"))?;
        if key_type != KEY_TYPE {
            return Err(malformed(&format!("expected {KEY_TYPE}, found {key_type}")).into());
        }
        let material = fields.next().ok_or_else(|| malformed("missing key material"))?;
        let blob = STANDARD
            .decode(material)
            .map_err(|e| malformed(&format!("key material is not base64: {e}")))?;
        if blob_key_type(&blob) != Some(KEY_TYPE.as_bytes()) {
            return Err(malformed("key blob does not describe an RSA key").into());
        }
        let comment = fields.collect::<Vec<_>>().join(" ");

        Ok(Self {
            key_type: key_type.to_string(),
            material: material.to_string(),
            comment: (!comment.is_empty()).then_some(comment),
        })
    }

    /// The line appended to `authorized_keys`.
    #[must_use]
    pub fn authorized_line(&self) -> String {
        match &self.comment {
            Some(comment) => format!("{} {} {comment}", self.key_type, self.material),
            None => format!("{} {}", self.key_type, self.material),
        }
    }

    /// True if `line` carries this key, ignoring options and comments.
    ///
    /// Lines may be prefixed with `authorized_keys` options
    /// (`from="...",no-pty ssh-rsa AAAA...`), so the key is located by
    /// scanning for the type token followed by identical material.
    #[must_use]
    pub fn matches_line(&self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return false;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        fields
            .windows(2)
            .any(|w| w[0] == self.key_type && w[1] == self.material)
    }

    /// Short fingerprint-like label for logs: type plus the tail of the material.
    #[must_use]
    pub fn short(&self) -> String {
        let tail_start = self.material.len().saturating_sub(12);
        format!("{} …{}", self.key_type, &self.material[tail_start..])
    }
}

/// Read the length-prefixed key type at the start of an OpenSSH key blob.
fn blob_key_type(blob: &[u8]) -> Option<&[u8]> {
    let len_bytes: [u8; 4] = blob.get(..4)?.try_into().ok()?;
    let len = usize::try_from(u32::from_be_bytes(len_bytes)).ok()?;
    blob.get(4..4 + len)
}

/// True if any line of an `authorized_keys` file carries `key`.
#[must_use]
pub fn authorized_keys_contains(content: &str, key: &PublicKey) -> bool {
    content.lines().any(|line| key.matches_line(line))
}

/// Expand a leading `~` against `home`.
#[must_use]
pub fn expand_tilde(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}
