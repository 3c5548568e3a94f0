//! mDNS browser for `_raop._tcp.local.` services.
//!
//! A stream adapter over `mdns_sd::ServiceDaemon`, narrowed to the fields
//! RAOP actually needs: the core only wants `(service-name, ipv4, port,
//! hostname)` per receiver, which this module turns directly into
//! [`Receiver`] instances.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;

use super::parser;
use super::raop::RAOP_SERVICE_TYPE;
use crate::error::{AirTunesError, Result};
use crate::receiver::Receiver;

/// A change in the set of reachable RAOP receivers.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// A new receiver appeared.
    Added(Receiver),
    /// A previously-seen receiver's mDNS record updated (new TXT data or
    /// readvertised address/port).
    Updated(Receiver),
    /// A receiver went offline. Carries its service instance name.
    Removed(String),
}

/// Browses for RAOP receivers on the local network.
pub struct DeviceBrowser;

impl DeviceBrowser {
    /// Start browsing. The returned stream yields one [`DiscoveryEvent`]
    /// per mDNS resolve/remove notification until dropped.
    ///
    /// # Errors
    /// [`AirTunesError::NetworkError`] if the local mDNS daemon cannot be
    /// started or the browse request cannot be registered.
    pub fn browse() -> Result<impl Stream<Item = DiscoveryEvent>> {
        DeviceBrowserStream::new()
    }
}

struct DeviceBrowserStream {
    mdns: mdns_sd::ServiceDaemon,
    stream: Box<dyn Stream<Item = mdns_sd::ServiceEvent> + Send + Unpin>,
    known: HashMap<String, Receiver>,
}

impl DeviceBrowserStream {
    fn new() -> Result<Self> {
        let mdns = mdns_sd::ServiceDaemon::new().map_err(|error| {
            AirTunesError::NetworkError(std::io::Error::other(format!("mDNS daemon init failed: {error}")))
        })?;
        let events = mdns.browse(RAOP_SERVICE_TYPE).map_err(|error| {
            AirTunesError::NetworkError(std::io::Error::other(format!("mDNS browse failed: {error}")))
        })?;
        Ok(Self { mdns, stream: Box::new(events.into_stream()), known: HashMap::new() })
    }

    fn process_event(&mut self, event: mdns_sd::ServiceEvent) -> Option<DiscoveryEvent> {
        match event {
            mdns_sd::ServiceEvent::ServiceResolved(info) => self.handle_resolved(&info),
            mdns_sd::ServiceEvent::ServiceRemoved(_, fullname) => self.handle_removed(&fullname),
            _ => None,
        }
    }

    fn handle_resolved(&mut self, info: &mdns_sd::ServiceInfo) -> Option<DiscoveryEvent> {
        let service_name = info.get_fullname().trim_end_matches(RAOP_SERVICE_TYPE).trim_end_matches('.').to_string();
        let address = info.get_addresses().iter().find_map(|addr| match addr {
            std::net::IpAddr::V4(v4) => Some(*v4),
            std::net::IpAddr::V6(_) => None,
        })?;

        let txt: HashMap<String, String> =
            info.get_properties().iter().map(|prop| (prop.key().to_string(), prop.val_str().to_string())).collect();

        let mut receiver = Receiver::new(service_name.clone(), address, info.get_port());
        receiver.hostname = Some(info.get_hostname().trim_end_matches('.').to_string());
        receiver.capabilities = parser::parse_capabilities(&txt);

        let event = if self.known.contains_key(&service_name) {
            DiscoveryEvent::Updated(receiver.clone())
        } else {
            DiscoveryEvent::Added(receiver.clone())
        };
        self.known.insert(service_name, receiver);
        Some(event)
    }

    fn handle_removed(&mut self, fullname: &str) -> Option<DiscoveryEvent> {
        let service_name = fullname.trim_end_matches(RAOP_SERVICE_TYPE).trim_end_matches('.').to_string();
        self.known.remove(&service_name).map(|_| DiscoveryEvent::Removed(service_name))
    }
}

impl Stream for DeviceBrowserStream {
    type Item = DiscoveryEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.stream).poll_next(cx) {
                Poll::Ready(Some(event)) => {
                    if let Some(discovered) = self.process_event(event) {
                        return Poll::Ready(Some(discovered));
                    }
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for DeviceBrowserStream {
    fn drop(&mut self) {
        let _ = self.mdns.stop_browse(RAOP_SERVICE_TYPE);
        let _ = self.mdns.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_strip_matches_instance_name() {
        let fullname = format!("0050C212A23F@Living Room.{RAOP_SERVICE_TYPE}");
        let stripped = fullname.trim_end_matches(RAOP_SERVICE_TYPE).trim_end_matches('.');
        assert_eq!(stripped, "0050C212A23F@Living Room");
    }
}
