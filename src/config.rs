use std::time::Duration;

use url::Url;

use crate::{credential::Credential, error::Result, protocol::dmap::UnknownTagPolicy};

/// Connection settings of one share.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// Sent when the share is protected.
    pub credential: Option<Credential>,

    pub user_agent: String,

    /// Limit for each request of the handshake.
    pub timeout: Duration,

    /// Whether to ask the share for its content codes before logging in.
    pub learn_content_codes: bool,
    pub unknown_tags: UnknownTagPolicy,
}

impl Config {
    /// Port DAAP shares listen on unless told otherwise.
    pub const DEFAULT_PORT: u16 = 3689;

    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        let app_name = env!("CARGO_PKG_NAME");
        let app_version = env!("CARGO_PKG_VERSION");

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version().unwrap_or_else(|| String::from("0"));

        let user_agent = format!("{app_name}/{app_version} (Rust; {os_name}/{os_version})");
        trace!("user agent: {user_agent}");

        Self {
            host: host.into(),
            port: Self::DEFAULT_PORT,
            credential: None,
            user_agent,
            timeout: Self::DEFAULT_TIMEOUT,
            learn_content_codes: false,
            unknown_tags: UnknownTagPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Root URL of the share, such as `http://192.168.1.2:3689/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not form a valid URL.
    pub fn base_url(&self) -> Result<Url> {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };

        Url::parse(&format!("http://{host}:{}/", self.port)).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::new("jukebox.local");
        assert_eq!(config.port, 3689);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.credential.is_none());
        assert!(!config.learn_content_codes);
        assert!(config.user_agent.starts_with("daapr/"));
    }

    #[test]
    fn base_url_includes_port() {
        let mut config = Config::new("192.168.1.2");
        assert_eq!(config.base_url().unwrap().as_str(), "http://192.168.1.2:3689/");

        config.port = 3690;
        assert_eq!(config.base_url().unwrap().as_str(), "http://192.168.1.2:3690/");
    }

    #[test]
    fn base_url_brackets_ipv6_hosts() {
        let config = Config::new("fe80::1");
        assert_eq!(config.base_url().unwrap().as_str(), "http://[fe80::1]:3689/");
    }

    #[test]
    fn invalid_host_is_rejected() {
        assert!(Config::new("no such host").base_url().is_err());
    }
}
