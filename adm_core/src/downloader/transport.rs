use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header;
use reqwest::{Client, StatusCode, Url};

use crate::types::types::TransportError;

/// Maximum redirect hops before a fetch fails with `TooManyRedirects`.
pub const MAX_REDIRECT_HOPS: usize = 5;

/// Whole-request timeout. Large payloads stream well within this as long as
/// bytes keep arriving; a stalled server trips it.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Some hosting providers reject requests without a browser-looking agent.
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/91.0.4472.124 Safari/537.36";

/// A resolved terminal response: the byte stream plus the size the server
/// declared for it.
pub struct Fetched {
    pub final_url: Url,
    pub content_length: Option<u64>,
    pub status: StatusCode,
    body: BoxStream<'static, reqwest::Result<Bytes>>,
}

impl Fetched {
    pub fn into_stream(self) -> BoxStream<'static, reqwest::Result<Bytes>> {
        self.body
    }
}

/// Performs a single GET with manual redirect following.
///
/// Redirects are followed by hand (the client's built-in policy is disabled)
/// so that hop counting, missing-Location handling, and relative-Location
/// resolution are all under this type's control.
pub struct Transport {
    client: Client,
}

impl Transport {
    pub fn new() -> Self {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .tcp_nodelay(true)
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }

    /// Fetch `url`, following up to [`MAX_REDIRECT_HOPS`] redirects, and
    /// return the terminal response as a byte stream.
    ///
    /// `extra_headers` are applied on top of the standing header set. The
    /// request always asks for an identity encoding so the declared
    /// content-length matches the bytes that will actually arrive.
    pub async fn fetch(
        &self,
        url: &str,
        extra_headers: &HashMap<String, String>,
    ) -> Result<Fetched, TransportError> {
        let mut current: Url = url
            .parse()
            .map_err(|_| TransportError::InvalidUrl(url.to_string()))?;

        for _hop in 0..=MAX_REDIRECT_HOPS {
            let mut builder = self
                .client
                .get(current.clone())
                .header(header::USER_AGENT, BROWSER_USER_AGENT)
                .header(header::ACCEPT, "application/octet-stream, */*")
                .header(header::ACCEPT_ENCODING, "identity")
                .header(header::CACHE_CONTROL, "no-cache");
            for (key, value) in extra_headers {
                builder = builder.header(key, value);
            }

            let response = builder.send().await.map_err(TransportError::from_reqwest)?;
            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or(TransportError::MalformedRedirect)?;

                // Location may be relative; resolve it against the URL that
                // produced the redirect.
                current = current
                    .join(location)
                    .map_err(|_| TransportError::MalformedRedirect)?;
                log::debug!("following redirect ({}) to {}", status.as_u16(), current);
                continue;
            }

            if !status.is_success() {
                return Err(TransportError::HttpError(status.as_u16()));
            }

            let content_length = response.content_length();
            let final_url = response.url().clone();
            return Ok(Fetched {
                final_url,
                content_length,
                status,
                body: response.bytes_stream().boxed(),
            });
        }

        Err(TransportError::TooManyRedirects {
            limit: MAX_REDIRECT_HOPS,
        })
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}
