//! Network utilities for the sync transport
//!
//! A thin layer over `reqwest`: JSON reads with retry, single-shot JSON
//! writes, a shared circuit breaker and a reachability probe.

mod client;
mod connectivity;
mod error;

pub use client::{join_url, Client, ClientConfig};
pub use connectivity::ConnectivityChecker;
pub use error::{NetworkError, NetworkResult};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_exports_accessible() {
        let client = Client::new().unwrap();
        let _: ConnectivityChecker = ConnectivityChecker::new(client, "http://localhost/health");
        let _: NetworkResult<()> = Err(NetworkError::NetworkUnavailable);
    }
}
