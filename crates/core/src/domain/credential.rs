// Credential Domain Model
// SECURITY: the secret is wiped on drop and never printed

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Password that zeros its memory on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret for an authentication call
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Username/secret pair, supplied once at startup and shared read-only
#[derive(Debug, Clone)]
pub struct Credential {
    username: String,
    secret: Secret,
}

impl Credential {
    pub fn new(username: impl Into<String>, secret: Secret) -> Self {
        Self {
            username: username.into(),
            secret,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_secret() {
        let cred = Credential::new("admin", Secret::new("hunter2"));
        let printed = format!("{:?}", cred);
        assert!(printed.contains("admin"));
        assert!(!printed.contains("hunter2"));
    }
}
