use std::error::Error;
use std::fmt;

/// Failure talking to the platform credential store.
///
/// `Unavailable` covers a locked or missing keychain backend; the caller can
/// fall back to `FLEXGPT_TOKEN`. `Other` is reported as-is.
#[derive(Debug)]
pub enum KeyringAccessError {
    Unavailable(keyring::Error),
    Other(keyring::Error),
}

impl KeyringAccessError {
    fn inner(&self) -> &keyring::Error {
        match self {
            KeyringAccessError::Unavailable(err) | KeyringAccessError::Other(err) => err,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, KeyringAccessError::Unavailable(_))
    }
}

impl From<keyring::Error> for KeyringAccessError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::PlatformFailure(_) | keyring::Error::NoStorageAccess(_) => {
                KeyringAccessError::Unavailable(err)
            }
            other => KeyringAccessError::Other(other),
        }
    }
}

impl fmt::Display for KeyringAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unavailable() {
            write!(f, "system keyring unavailable: {}", self.inner())
        } else {
            write!(f, "{}", self.inner())
        }
    }
}

impl Error for KeyringAccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_failures_are_unavailable() {
        let err = KeyringAccessError::from(keyring::Error::NoStorageAccess("locked".into()));
        assert!(err.is_unavailable());
        assert!(err.to_string().starts_with("system keyring unavailable"));

        let err = KeyringAccessError::from(keyring::Error::NoEntry);
        assert!(!err.is_unavailable());
        assert!(err.source().is_some());
    }
}
