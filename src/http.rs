//! HTTP transport for DAAP shares.
//!
//! This module provides a wrapper around `reqwest::Client` that adds:
//! * Request rate limiting so a client never floods a share
//! * The request headers DAAP shares expect
//! * Basic authorization for protected shares
//! * Consistent timeouts
//!
//! # Example
//!
//! ```rust
//! use daapr::{config::Config, http::Client, session::Transport};
//!
//! let client = Client::new(&Config::new("192.168.1.2"))?;
//! let response = client.get("/server-info").await?;
//! ```

use std::{num::NonZeroU32, time::Duration};

use base64::prelude::*;
use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use http::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use url::Url;

use crate::{
    config::Config,
    error::{Error, Result},
    session::{Response, Transport},
};

/// HTTP client bound to one share.
pub struct Client {
    /// Request client without rate limiting.
    unlimited: reqwest::Client,

    rate_limiter: DefaultDirectRateLimiter,

    /// Root of the share, such as `http://192.168.1.2:3689/`.
    base_url: Url,
}

impl Client {
    /// Shares are small home servers; stay well below what they can take.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(1);
    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 10;

    /// Duration to keep idle connections alive.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    const DAAP_VERSION: &'static str = "3.0";
    const ACCESS_INDEX: &'static str = "2";
    const CONTENT_TYPE: &'static str = "application/x-dmap-tagged";

    /// User name sent with the password; shares only check the password.
    const USER_NAME: &'static str = env!("CARGO_PKG_NAME");

    /// Creates a client for the share in `config`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// * the host does not form a valid URL
    /// * the credential cannot be sent as a header
    /// * the HTTP client cannot be built
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("client-daap-version"),
            HeaderValue::from_static(Self::DAAP_VERSION),
        );
        headers.insert(
            HeaderName::from_static("client-daap-access-index"),
            HeaderValue::from_static(Self::ACCESS_INDEX),
        );
        headers.insert(ACCEPT, HeaderValue::from_static(Self::CONTENT_TYPE));

        if let Some(credential) = &config.credential {
            let token = BASE64_STANDARD.encode(format!("{}:{}", Self::USER_NAME, &**credential));
            let mut authorization = HeaderValue::from_str(&format!("Basic {token}"))?;
            authorization.set_sensitive(true);
            headers.insert(AUTHORIZATION, authorization);
        }

        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .timeout(config.timeout)
            .default_headers(headers)
            .user_agent(&config.user_agent);

        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .ok_or_else(|| Error::internal("quota time interval is zero"))?
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .ok_or_else(|| Error::internal("calls per interval is zero"))?,
            );

        Ok(Self {
            unlimited: http_client.build()?,
            rate_limiter: governor::RateLimiter::direct(quota),
            base_url: config.base_url()?,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Executes a request with rate limiting.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or times out.
    pub async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        // No need to await with jitter because the level of concurrency is low.
        let throttle = self.rate_limiter.until_ready();
        throttle
            .then(|()| self.unlimited.execute(request).map_err(Into::into))
            .await
    }
}

impl Transport for Client {
    async fn get(&self, path_and_query: &str) -> Result<Response> {
        let url = self.base_url.join(path_and_query)?;
        trace!("GET {url}");

        let request = reqwest::Request::new(reqwest::Method::GET, url);
        let response = self.execute(request).await?;

        let status = response.status();
        let body = response.bytes().await?.to_vec();

        Ok(Response { status, body })
    }
}
