//! Network connectivity checks

use crate::client::Client;
use crate::error::{NetworkError, NetworkResult};

/// Reachability probe against one or more URLs
#[derive(Clone)]
pub struct ConnectivityChecker {
    client: Client,
    check_urls: Vec<String>,
}

impl ConnectivityChecker {
    /// Probes a single URL, usually the remote store itself
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            check_urls: vec![url.into()],
        }
    }

    /// Probes several URLs; any one answering means online
    pub fn with_urls(client: Client, urls: Vec<String>) -> Self {
        Self {
            client,
            check_urls: urls,
        }
    }

    /// URLs this checker probes
    pub fn urls(&self) -> &[String] {
        &self.check_urls
    }

    /// Checks if any probe URL answers
    pub async fn is_online(&self) -> bool {
        for url in &self.check_urls {
            if self.client.is_reachable(url).await {
                return true;
            }
        }
        false
    }

    /// Checks network connectivity and returns error if offline
    pub async fn check(&self) -> NetworkResult<()> {
        if self.is_online().await {
            Ok(())
        } else {
            Err(NetworkError::NetworkUnavailable)
        }
    }
}
