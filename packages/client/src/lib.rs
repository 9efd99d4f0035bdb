#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Socrata data client for the Oakland 311 illegal dumping dataset.
//!
//! Issues paginated/filtered reads against the SODA API using the
//! `$limit`, `$offset`, `$order`, and `$where` query parameters, attaches
//! derived WGS84 coordinates to every row, and recovers from a rejected
//! app token by retrying the request once without authentication.

pub mod rows;
pub mod soql;

use dump_map_models::RequestCollection;
use thiserror::Error;

/// Socrata domain hosting the dataset.
pub const OAKLAND_DOMAIN: &str = "data.oaklandca.gov";

/// Dataset identifier for Oakland 311 service requests.
pub const DATASET_ID: &str = "quth-gb8e";

/// Environment variable consulted for an app token when none is passed
/// to [`DumpClient::open`].
pub const TOKEN_ENV_VAR: &str = "OAK311_API_TOKEN";

/// The production dataset endpoint.
#[must_use]
pub fn default_api_url() -> String {
    format!("https://{OAKLAND_DOMAIN}/resource/{DATASET_ID}.json")
}

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// An operation was attempted without an open connection.
    #[error("client is not open")]
    NotOpen,

    /// HTTP request failed at the transport level.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not valid JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The remote rejected the credential (HTTP 401/403).
    #[error("authentication rejected (HTTP {status})")]
    AuthRejected {
        /// HTTP status code the server answered with.
        status: u16,
    },

    /// Any other non-success HTTP status.
    #[error("HTTP {status}")]
    Status {
        /// HTTP status code the server answered with.
        status: u16,
    },

    /// The response shape did not match the expected SODA output.
    #[error("unexpected response: {message}")]
    UnexpectedResponse {
        /// Description of what went wrong.
        message: String,
    },
}

/// Connection lifecycle, modeled explicitly rather than as a nullable
/// handle.
enum ClientState {
    /// No live connection.
    Closed,
    /// Connection handle present, optionally carrying an app token.
    Open {
        http: reqwest::Client,
        token: Option<String>,
    },
}

/// Pagination and filtering parameters for a single query.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Number of rows to skip.
    pub offset: u64,
    /// Maximum rows to return.
    pub limit: u64,
    /// SoQL boolean filter expression, e.g.
    /// `REQCATEGORY='ILLDUMP' AND date_extract_y(DATETIMEINIT)=2024`.
    pub where_clause: Option<String>,
    /// SoQL sort expression, e.g. `DATETIMEINIT DESC`.
    pub order: Option<String>,
}

/// Client for querying Oakland 311 illegal dumping data.
///
/// Two states: closed (no HTTP handle) and open (handle plus optional
/// token). Queries are valid only while open.
pub struct DumpClient {
    api_url: String,
    state: ClientState,
}

impl DumpClient {
    /// Creates the client against the production endpoint and opens it
    /// immediately, resolving the token from the argument or the
    /// `OAK311_API_TOKEN` environment variable.
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self::with_api_url(default_api_url(), token)
    }

    /// Creates the client against an explicit dataset endpoint (e.g., a
    /// local stand-in during tests) and opens it immediately.
    #[must_use]
    pub fn with_api_url(api_url: impl Into<String>, token: Option<String>) -> Self {
        let mut client = Self {
            api_url: api_url.into(),
            state: ClientState::Closed,
        };
        client.open(token);
        client
    }

    /// Opens the connection. The token comes from the argument when
    /// given, else from `OAK311_API_TOKEN`; an empty or whitespace-only
    /// token is normalized to anonymous access.
    pub fn open(&mut self, token: Option<String>) {
        let token = token
            .or_else(|| std::env::var(TOKEN_ENV_VAR).ok())
            .filter(|t| !t.trim().is_empty());
        self.state = ClientState::Open {
            http: reqwest::Client::new(),
            token,
        };
    }

    /// Reopens anonymously after a rejected token. Unlike [`Self::open`]
    /// this never falls back to the environment, so the rejected token
    /// cannot sneak back in.
    fn reopen_anonymous(&mut self) {
        self.state = ClientState::Open {
            http: reqwest::Client::new(),
            token: None,
        };
    }

    /// Closes the connection, dropping the handle and any token.
    pub fn close(&mut self) {
        self.state = ClientState::Closed;
    }

    /// Whether the client currently holds a live connection.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.state, ClientState::Open { .. })
    }

    /// Whether the open connection carries an app token.
    #[must_use]
    pub const fn has_token(&self) -> bool {
        matches!(self.state, ClientState::Open { token: Some(_), .. })
    }

    /// Queries one page of service requests.
    ///
    /// Zero matching rows yield an empty collection. Each returned row is
    /// marked visible and gets WGS84 coordinates derived from its
    /// `srx`/`sry` columns; a row whose coordinates are missing or
    /// unparseable keeps the `(0.0, 0.0)` sentinel and the batch
    /// continues.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotOpen`] when called on a closed client. An auth
    /// rejection while a token is held closes the connection, reopens it
    /// anonymously, and retries exactly once; every other failure (and a
    /// failed retry) is logged and returned directly, leaving the client
    /// state as-is.
    pub async fn query(
        &mut self,
        options: &QueryOptions,
    ) -> Result<RequestCollection, ClientError> {
        let mut params = vec![
            ("$offset".to_string(), options.offset.to_string()),
            ("$limit".to_string(), options.limit.to_string()),
        ];
        if let Some(where_clause) = &options.where_clause {
            params.push(("$where".to_string(), where_clause.clone()));
        }
        if let Some(order) = &options.order {
            params.push(("$order".to_string(), order.clone()));
        }

        let body = self.fetch_body(&params).await?;
        let raw: Vec<serde_json::Value> = serde_json::from_str(&body)?;
        Ok(rows::map_rows(raw))
    }

    /// Fetches every matching row by paging until a short page, in
    /// `page_size` chunks.
    ///
    /// # Errors
    ///
    /// Returns the first [`ClientError`] any page produces; rows from
    /// earlier pages are discarded.
    pub async fn query_all(
        &mut self,
        where_clause: Option<&str>,
        order: Option<&str>,
        page_size: u64,
    ) -> Result<RequestCollection, ClientError> {
        let mut all_records = Vec::new();
        let mut offset: u64 = 0;

        loop {
            log::info!("Fetching requests: offset={offset}, limit={page_size}");
            let page = self
                .query(&QueryOptions {
                    offset,
                    limit: page_size,
                    where_clause: where_clause.map(ToString::to_string),
                    order: order.map(ToString::to_string),
                })
                .await?;

            let count = page.len() as u64;
            if count == 0 {
                break;
            }

            all_records.extend(page);
            offset += count;

            if count < page_size {
                break;
            }
        }

        log::info!("Downloaded {} request records total", all_records.len());
        Ok(all_records)
    }

    /// Server-side row count via `$select=count(*)`, avoiding a full
    /// download when only the total matters.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on fetch failure or when the count column
    /// is missing from the response.
    pub async fn count(&mut self, where_clause: Option<&str>) -> Result<u64, ClientError> {
        let mut params = vec![("$select".to_string(), "count(*)".to_string())];
        if let Some(where_clause) = where_clause {
            params.push(("$where".to_string(), where_clause.to_string()));
        }

        let body = self.fetch_body(&params).await?;
        let raw: Vec<serde_json::Value> = serde_json::from_str(&body)?;

        raw.first()
            .and_then(|row| row.get("count"))
            .and_then(|count| {
                count
                    .as_str()
                    .and_then(|c| c.parse::<u64>().ok())
                    .or_else(|| count.as_u64())
            })
            .ok_or_else(|| ClientError::UnexpectedResponse {
                message: format!("count(*) response had no count column: {body}"),
            })
    }

    /// Issues the request, recovering from a rejected token by retrying
    /// once anonymously. Explicit attempt counter; never more than one
    /// retry.
    async fn fetch_body(&mut self, params: &[(String, String)]) -> Result<String, ClientError> {
        let mut attempt: u8 = 0;

        loop {
            match self.send_once(params).await {
                Ok(body) => return Ok(body),
                Err(e @ ClientError::NotOpen) => return Err(e),
                Err(ClientError::AuthRejected { status }) if attempt == 0 && self.has_token() => {
                    log::warn!(
                        "Token rejected (HTTP {status}), retrying without authentication..."
                    );
                    self.close();
                    self.reopen_anonymous();
                    attempt += 1;
                }
                Err(e) => {
                    log::error!("Unable to obtain information from the API: {e}");
                    return Err(e);
                }
            }
        }
    }

    /// One GET against the dataset endpoint, returning the raw body.
    async fn send_once(&self, params: &[(String, String)]) -> Result<String, ClientError> {
        let ClientState::Open { http, token } = &self.state else {
            return Err(ClientError::NotOpen);
        };

        let mut request = http.get(&self.api_url).query(params);
        if let Some(token) = token {
            request = request.header("X-App-Token", token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::UNAUTHORIZED
        {
            return Err(ClientError::AuthRejected {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read as _, Write as _};
    use std::net::TcpListener;

    use super::*;

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }

    struct StubServer {
        url: String,
        /// Joins to one bool per served request: whether it carried an
        /// `X-App-Token` header.
        handle: std::thread::JoinHandle<Vec<bool>>,
    }

    /// Serves the scripted `(status, body)` responses on a local
    /// listener, one connection each, then exits. A request beyond the
    /// script gets connection-refused rather than hanging, so response
    /// count doubles as a request-count assertion.
    fn serve_responses(responses: Vec<(u16, String)>) -> StubServer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = std::thread::spawn(move || {
            let mut token_seen = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();

                let mut request = Vec::new();
                let mut buf = [0_u8; 1024];
                loop {
                    let n = stream.read(&mut buf).unwrap();
                    request.extend_from_slice(&buf[..n]);
                    if n == 0 || request.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let request = String::from_utf8_lossy(&request).to_lowercase();
                token_seen.push(request.contains("x-app-token"));

                let response = format!(
                    "HTTP/1.1 {status} STUB\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).unwrap();
            }
            token_seen
        });

        StubServer {
            url: format!("http://{addr}/resource/test.json"),
            handle,
        }
    }

    fn default_options() -> QueryOptions {
        QueryOptions {
            offset: 0,
            limit: 10,
            ..QueryOptions::default()
        }
    }

    #[test]
    fn closed_client_reports_not_open() {
        let mut client = DumpClient::new(None);
        client.close();
        assert!(!client.is_open());

        let result = block_on(client.query(&default_options()));
        assert!(matches!(result, Err(ClientError::NotOpen)));
    }

    #[test]
    fn auth_rejection_with_token_retries_once_anonymously() {
        let body = r#"[{"requestid":"1462932","srx":"-13610789.0","sry":"4552055.0"}]"#;
        let server = serve_responses(vec![(403, "[]".to_string()), (200, body.to_string())]);
        let mut client = DumpClient::with_api_url(server.url, Some("bad-token".to_string()));

        let records = block_on(client.query(&default_options())).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].requestid.as_deref(), Some("1462932"));
        assert!((records[0].lat - 37.8).abs() < 0.1);

        // First request carried the token, the retry did not.
        assert_eq!(server.handle.join().unwrap(), vec![true, false]);
        assert!(client.is_open());
        assert!(!client.has_token());
    }

    #[test]
    fn failed_retry_leaves_client_open_without_token() {
        let server = serve_responses(vec![(403, "[]".to_string()), (403, "[]".to_string())]);
        let mut client = DumpClient::with_api_url(server.url, Some("bad-token".to_string()));

        let result = block_on(client.query(&default_options()));
        assert!(matches!(
            result,
            Err(ClientError::AuthRejected { status: 403 })
        ));

        // Exactly two requests total, only the first with a token.
        assert_eq!(server.handle.join().unwrap(), vec![true, false]);
        assert!(client.is_open());
        assert!(!client.has_token());
    }

    #[test]
    fn auth_rejection_without_token_does_not_retry() {
        let server = serve_responses(vec![(401, "[]".to_string())]);
        // Blank explicit token opens anonymously without env fallback.
        let mut client = DumpClient::with_api_url(server.url, Some(String::new()));

        let result = block_on(client.query(&default_options()));
        assert!(matches!(
            result,
            Err(ClientError::AuthRejected { status: 401 })
        ));
        assert_eq!(server.handle.join().unwrap(), vec![false]);
    }

    #[test]
    fn non_auth_failure_maps_to_status_and_does_not_retry() {
        let server = serve_responses(vec![(500, "oops".to_string())]);
        let mut client = DumpClient::with_api_url(server.url, Some("abc123".to_string()));

        let result = block_on(client.query(&default_options()));
        assert!(matches!(result, Err(ClientError::Status { status: 500 })));
        assert_eq!(server.handle.join().unwrap(), vec![true]);
        assert!(client.has_token());
    }

    #[test]
    fn zero_row_response_yields_empty_collection() {
        let server = serve_responses(vec![(200, "[]".to_string())]);
        let mut client = DumpClient::with_api_url(server.url, Some(String::new()));

        let records = block_on(client.query(&default_options())).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn open_normalizes_blank_token_to_anonymous() {
        let mut client = DumpClient::new(None);
        client.open(Some("   ".to_string()));
        assert!(client.is_open());
        assert!(!client.has_token());
    }

    #[test]
    fn open_keeps_explicit_token() {
        let mut client = DumpClient::new(Some("abc123".to_string()));
        assert!(client.has_token());
        client.close();
        assert!(!client.has_token());
    }

    #[test]
    fn reopen_anonymous_drops_token() {
        let mut client = DumpClient::new(Some("abc123".to_string()));
        client.close();
        client.reopen_anonymous();
        assert!(client.is_open());
        assert!(!client.has_token());
    }
}
