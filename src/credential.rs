//! Password of a protected share.
//!
//! Kept out of logs: the debug output of a [`Credential`] is redacted, and
//! it has no [`Display`](std::fmt::Display) implementation.
//!
//! # Secrets File
//!
//! ```toml
//! password = "changeme"
//! ```

use std::{fs, ops::Deref, str::FromStr};

use serde::Deserialize;
use veil::Redact;

use crate::error::{Error, Result};

/// Contents of a secrets file.
#[derive(Deserialize)]
struct Secrets {
    password: Option<String>,
}

/// Password sent with every request to a protected share.
#[derive(Clone, Redact, Hash, PartialEq, Eq)]
pub struct Credential(#[redact] String);

impl Credential {
    /// Secrets files are tiny; anything larger is not one.
    const MAX_FILE_SIZE: u64 = 1024;

    /// Reads the `password` key of a TOML secrets file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is larger than 1 KiB,
    /// is not valid TOML or holds no non-empty `password`.
    pub fn from_file(path: &str) -> Result<Self> {
        let attributes = fs::metadata(path)?;
        if attributes.len() > Self::MAX_FILE_SIZE {
            return Err(Error::resource_exhausted(format!("{path} is too large")));
        }

        let contents = fs::read_to_string(path)?;
        let secrets: Secrets = toml::from_str(&contents)?;

        match secrets.password {
            Some(password) => password.parse(),
            None => Err(Error::not_found(format!("{path} does not contain a password"))),
        }
    }
}

impl FromStr for Credential {
    type Err = Error;

    fn from_str(password: &str) -> Result<Self> {
        if password.is_empty() {
            return Err(Error::invalid_argument("password is empty"));
        }

        Ok(Self(password.to_owned()))
    }
}

impl Deref for Credential {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::error::ErrorKind;

    fn secrets_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("daapr-{}-{name}.toml", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn debug_output_is_redacted() {
        let credential: Credential = "hunter2".parse().unwrap();
        assert!(!format!("{credential:?}").contains("hunter2"));
        assert_eq!(&*credential, "hunter2");
    }

    #[test]
    fn empty_password_is_rejected() {
        let err = "".parse::<Credential>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn reads_secrets_file() {
        let path = secrets_file("valid", "# share password\npassword = \"s3cret\"\n");
        let credential = Credential::from_file(path.to_str().unwrap()).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(&*credential, "s3cret");
    }

    #[test]
    fn rejects_bad_secrets_files() {
        let missing_key = secrets_file("missing", "user = \"me\"\n");
        let err = Credential::from_file(missing_key.to_str().unwrap()).unwrap_err();
        fs::remove_file(&missing_key).unwrap();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let password = "x".repeat(2048);
        let oversized = secrets_file("oversized", &format!("password = \"{password}\"\n"));
        let err = Credential::from_file(oversized.to_str().unwrap()).unwrap_err();
        fs::remove_file(&oversized).unwrap();
        assert_eq!(err.kind, ErrorKind::ResourceExhausted);

        let err = Credential::from_file("/nonexistent/daapr/secrets.toml").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
