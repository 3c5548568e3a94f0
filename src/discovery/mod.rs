//! Receiver discovery (collaborator role).
//!
//! Shipped as an optional module so the crate is runnable end to end
//! without requiring a caller to wire its own mDNS browser. The core
//! streaming engine never depends on this module directly; it
//! only ever consumes the [`Receiver`](crate::receiver::Receiver) values
//! this module produces.

pub mod browser;
pub mod parser;
pub mod raop;

pub use browser::{DeviceBrowser, DiscoveryEvent};
pub use raop::RAOP_SERVICE_TYPE;

use std::time::Duration;

use futures::StreamExt;

use crate::error::Result;
use crate::receiver::Receiver;

/// Browse for `timeout` and return every receiver resolved during that
/// window, deduplicated by service name (later resolutions for the same
/// name replace earlier ones).
///
/// # Errors
/// [`crate::error::AirTunesError::NetworkError`] if the local mDNS daemon
/// cannot be started.
pub async fn scan(timeout: Duration) -> Result<Vec<Receiver>> {
    let mut stream = std::pin::pin!(DeviceBrowser::browse()?);
    let mut found = std::collections::HashMap::new();

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            () = &mut deadline => break,
            event = stream.next() => {
                match event {
                    Some(DiscoveryEvent::Added(receiver) | DiscoveryEvent::Updated(receiver)) => {
                        found.insert(receiver.service_name.clone(), receiver);
                    }
                    Some(DiscoveryEvent::Removed(name)) => {
                        found.remove(&name);
                    }
                    None => break,
                }
            }
        }
    }
    Ok(found.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scan_with_short_timeout_does_not_hang() {
        let result = scan(Duration::from_millis(50)).await;
        assert!(result.is_ok());
    }
}
