use super::transport::{RpcFault, RpcTransport};
use super::{AccountLookup, TargetSystem};
use crate::config::TargetCredentials;
use crate::core::{Result, SyncError, TargetAccount, TargetDonation, TargetDonationRecord};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
struct JournalPage {
    #[serde(default)]
    count: Option<JsonValue>,
    #[serde(default)]
    data: Vec<TargetDonation>,
}

/// Logged-in session with the target platform
///
/// A session is opened once per process with [`TargetSystemClient::login`]
/// and must be closed with [`TargetSystemClient::logout`] on every exit path.
/// Any fault reported by a call is returned as [`SyncError::SessionFault`];
/// the session is unusable afterwards and callers halt.
pub struct TargetSystemClient<T: RpcTransport> {
    transport: T,
    page_size: u32,
    logged_in: AtomicBool,
}

impl<T: RpcTransport> TargetSystemClient<T> {
    /// Log in, following the endpoint redirect the service may answer with.
    pub async fn login(mut transport: T, credentials: &TargetCredentials, page_size: u32) -> Result<Self> {
        let params = json!([credentials.database_id, credentials.api_key]);

        info!(database = %credentials.database_id, "Logging into target");
        let reply = transport
            .call("apiKeyLogin", params.clone())
            .await
            .map_err(|fault| halt("apiKeyLogin", fault))?;

        if let Some(endpoint) = reply.as_str().filter(|e| !e.trim().is_empty()) {
            info!(endpoint = %endpoint, "Target database lives on another endpoint, logging in again");
            transport.redirect(endpoint)?;
            transport
                .call("apiKeyLogin", params)
                .await
                .map_err(|fault| halt("apiKeyLogin", fault))?;
        }

        info!("Target login successful");
        Ok(Self {
            transport,
            page_size: page_size.max(1),
            logged_in: AtomicBool::new(true),
        })
    }

    /// End the session. Safe to call more than once.
    pub async fn logout(&self) -> Result<()> {
        if !self.logged_in.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Logging out of target");
        self.transport
            .call("logout", json!([]))
            .await
            .map(|_| ())
            .map_err(|fault| halt("logout", fault))
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    async fn call(&self, method: &str, params: JsonValue) -> Result<JsonValue> {
        if !self.is_logged_in() {
            return Err(SyncError::SessionFault {
                code: "closed".to_string(),
                message: format!("{} called after logout", method),
            });
        }
        debug!(method, "Calling target");
        self.transport
            .call(method, params)
            .await
            .map_err(|fault| halt(method, fault))
    }
}

fn halt(method: &str, fault: RpcFault) -> SyncError {
    error!(
        method,
        fault_code = %fault.code,
        fault_string = %fault.message,
        "Target session fault, halting"
    );
    SyncError::SessionFault {
        code: fault.code,
        message: fault.message,
    }
}

fn protocol_fault(method: &str, err: serde_json::Error) -> SyncError {
    halt(method, RpcFault::new("protocol", err.to_string()))
}

fn page_count(count: &JsonValue) -> Option<u64> {
    match count {
        JsonValue::Number(n) => n.as_u64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Lookups answer `null` or an empty object when nothing matches.
fn account_from_reply(method: &str, reply: JsonValue) -> Result<Option<TargetAccount>> {
    let absent = match &reply {
        JsonValue::Null => true,
        JsonValue::Object(map) => map.get("ref").is_none_or(JsonValue::is_null),
        _ => false,
    };
    if absent {
        return Ok(None);
    }
    serde_json::from_value(reply)
        .map(Some)
        .map_err(|e| protocol_fault(method, e))
}

#[async_trait]
impl<T: RpcTransport> TargetSystem for TargetSystemClient<T> {
    async fn resolve_account(&self, lookup: &AccountLookup) -> Result<Option<TargetAccount>> {
        let (method, params) = match lookup {
            AccountLookup::ById(id) => ("getAccountById", json!([id])),
            AccountLookup::ByUniqueField { name, value } => (
                "getAccountByUniqueDefinedValue",
                json!([{ "fieldName": name, "value": value }]),
            ),
        };
        let reply = self.call(method, params).await?;
        let account = account_from_reply(method, reply)?;

        if let (AccountLookup::ByUniqueField { name, value }, Some(found)) = (lookup, &account) {
            if let Some(held) = found.defined_value(name).filter(|held| held != value) {
                warn!(
                    account_ref = %found.account_ref,
                    field = %name,
                    expected = %value,
                    held = %held,
                    "Target returned an account holding another value, ignoring it"
                );
                return Ok(None);
            }
        }
        Ok(account)
    }

    async fn fetch_account_donations(&self, account_ref: &str) -> Result<Vec<TargetDonation>> {
        let mut donations = Vec::new();
        let mut start = 0u32;

        loop {
            let params = json!([{
                "start": start,
                "count": self.page_size,
                "accountRef": account_ref,
            }]);
            let reply = self.call("getJournalEntries", params).await?;
            let page: JournalPage =
                serde_json::from_value(reply).map_err(|e| protocol_fault("getJournalEntries", e))?;

            let returned = page
                .count
                .as_ref()
                .and_then(page_count)
                .unwrap_or(page.data.len() as u64);
            donations.extend(page.data);
            if returned < u64::from(self.page_size) {
                break;
            }
            start += self.page_size;
        }

        debug!(account_ref, count = donations.len(), "Fetched target journal entries");
        Ok(donations)
    }

    async fn create_donation(&self, record: &TargetDonationRecord) -> Result<String> {
        let reply = self.call("addGift", json!([record, false])).await?;
        Ok(match reply {
            JsonValue::String(gift_ref) => gift_ref,
            other => other.to_string(),
        })
    }
}

impl<T: RpcTransport> Drop for TargetSystemClient<T> {
    fn drop(&mut self) {
        if self.is_logged_in() {
            warn!("Target session dropped without logout");
        }
    }
}
