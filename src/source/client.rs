use super::rate_limit::{Pause, RateLimitReply, TokioPause, parse_rate_limit};
use super::{DonationQuery, SourceSystem};
use crate::config::{OrganizationCredentials, SyncConfig};
use crate::core::{Result, SourceDonation, SourceDonor, SyncError};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Request, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Header carrying the JSON pagination block.
const PAGINATION_HEADER: &str = "x-pagination";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    total_pages: u32,
}

/// Response with its body already read.
#[derive(Debug)]
struct Fetched {
    status: StatusCode,
    pagination: Option<String>,
    body: String,
}

/// REST client for the source donor platform
///
/// Lists are fetched page by page; throttled requests are resent after the
/// server-reported wait plus a safety margin.
pub struct SourceSystemClient {
    http: Client,
    base_url: Url,
    page_size: u32,
    rate_limit_margin: Duration,
    max_rate_limit_retries: u32,
    pause: Arc<dyn Pause>,
}

impl SourceSystemClient {
    pub fn new(credentials: &OrganizationCredentials, config: &SyncConfig) -> Result<Self> {
        let base_url = Url::parse(&config.source_base_url)
            .map_err(|e| SyncError::Config(format!("Invalid source base URL: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-organizationkey",
            HeaderValue::from_str(&credentials.key)
                .map_err(|e| SyncError::Config(format!("Invalid organization key: {}", e)))?,
        );
        let mut auth = HeaderValue::from_str(&format!("BASIC {}", credentials.license))
            .map_err(|e| SyncError::Config(format!("Invalid license: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            base_url,
            page_size: config.source_page_size,
            rate_limit_margin: config.rate_limit_margin,
            max_rate_limit_retries: config.max_rate_limit_retries,
            pause: Arc::new(TokioPause),
        })
    }

    /// Replace how throttled requests wait before being resent.
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| SyncError::Config(format!("Invalid endpoint '{}': {}", path, e)))
    }

    /// Sends `request`, resending the identical request after each recognized throttle.
    ///
    /// Anything else that is not a 200 is logged and handed back; callers
    /// decide how to fail.
    async fn send(&self, request: Request) -> Result<Fetched> {
        let mut throttled = 0u32;

        loop {
            let attempt = request.try_clone().ok_or_else(|| {
                SyncError::Transport("request cannot be replayed".to_string())
            })?;
            debug!(url = %attempt.url(), "Sending source request");

            let response = self.http.execute(attempt).await?;
            let status = response.status();
            let pagination = response
                .headers()
                .get(PAGINATION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await?;

            if status == StatusCode::TOO_MANY_REQUESTS {
                match parse_rate_limit(&body) {
                    RateLimitReply::Wait(wait) if throttled < self.max_rate_limit_retries => {
                        throttled += 1;
                        let total = wait + self.rate_limit_margin;
                        warn!(
                            url = %request.url(),
                            wait_secs = total.as_secs(),
                            attempt = throttled,
                            "Source rate limit reached, sleeping before retry"
                        );
                        self.pause.pause(total).await;
                        continue;
                    }
                    RateLimitReply::Wait(_) => {
                        error!(
                            url = %request.url(),
                            retries = throttled,
                            "Source still rate limited after retries, giving up"
                        );
                    }
                    RateLimitReply::UnexpectedDetails => {
                        warn!(
                            status = %status,
                            body = %body,
                            "Rate limit details were not in second(s), not retrying"
                        );
                    }
                    RateLimitReply::Unknown => {
                        error!(status = %status, body = %body, "Unknown HTTP 429 response");
                    }
                }
            } else if status != StatusCode::OK {
                error!(status = %status, body = %body, "Unexpected HTTP status from source");
            }

            return Ok(Fetched {
                status,
                pagination,
                body,
            });
        }
    }

    fn donations_url(&self, query: &DonationQuery, page: u32) -> Result<Url> {
        let mut url = match query.donor_id {
            Some(donor_id) => self.endpoint(&format!("donors/{}/donations", donor_id))?,
            None => self.endpoint("donations")?,
        };
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("page", &page.to_string());
            pairs.append_pair("pageSize", &self.page_size.to_string());
            if let Some(after) = &query.created_after {
                pairs.append_pair("createdAfter", after);
            }
            if let Some(before) = &query.created_before {
                pairs.append_pair("createdBefore", before);
            }
        }
        Ok(url)
    }
}

fn expect_ok(fetched: &Fetched) -> Result<()> {
    if fetched.status == StatusCode::OK {
        Ok(())
    } else {
        Err(SyncError::UnexpectedStatus {
            status: fetched.status.as_u16(),
            body: fetched.body.clone(),
        })
    }
}

/// Malformed bodies count as a transport problem of the single request.
fn parse_body<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| SyncError::Transport(format!("Malformed source response: {}", e)))
}

fn total_pages(header: Option<&str>) -> Option<u32> {
    let raw = header?;
    match serde_json::from_str::<Pagination>(raw) {
        Ok(p) => Some(p.total_pages),
        Err(e) => {
            warn!(header = %raw, error = %e, "Unreadable pagination header");
            None
        }
    }
}

#[async_trait]
impl SourceSystem for SourceSystemClient {
    async fn fetch_donor(&self, secondary_key: &str) -> Result<SourceDonor> {
        let mut url = self.endpoint("donors")?;
        url.query_pairs_mut().append_pair("crmKeySecond", secondary_key);

        let fetched = self.send(self.http.get(url).build()?).await?;
        expect_ok(&fetched)?;

        let mut donors: Vec<JsonValue> = parse_body(&fetched.body)?;
        match donors.len() {
            0 => Err(SyncError::DonorNotFound {
                key: secondary_key.to_string(),
                body: fetched.body,
            }),
            1 => serde_json::from_value(donors.remove(0))
                .map_err(|e| SyncError::Transport(format!("Malformed source donor: {}", e))),
            _ => Err(SyncError::MultipleDonors {
                key: secondary_key.to_string(),
                donors,
                body: fetched.body,
            }),
        }
    }

    async fn fetch_donations(&self, query: &DonationQuery) -> Result<Vec<SourceDonation>> {
        let mut donations = Vec::new();
        let mut page = 1u32;

        loop {
            let url = self.donations_url(query, page)?;
            let fetched = self.send(self.http.get(url).build()?).await?;
            expect_ok(&fetched)?;

            let batch: Vec<SourceDonation> = parse_body(&fetched.body)?;
            if query.approved_only {
                donations.extend(batch.into_iter().filter(SourceDonation::is_approved));
            } else {
                donations.extend(batch);
            }

            let Some(total) = total_pages(fetched.pagination.as_deref()) else {
                warn!(page, "No pagination metadata, treating page as last");
                break;
            };
            if page >= total {
                break;
            }
            page += 1;
        }

        info!(
            donor_id = ?query.donor_id,
            count = donations.len(),
            pages = page,
            "Fetched source donations"
        );
        Ok(donations)
    }
}
