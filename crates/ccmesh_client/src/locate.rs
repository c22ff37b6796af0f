//! Job server address resolution. Real mDNS discovery is out of scope (see
//! `ccmesh_protocol::mdns`); this crate ships a static locator and the small
//! trait a future discovery client could implement alongside it.

use async_trait::async_trait;
use ccmesh_protocol::Address;

use crate::error::Result;

#[async_trait]
pub trait ServerLocator: Send + Sync {
    async fn locate(&self) -> Result<Vec<Address>>;
}

/// Resolves to a fixed, caller-supplied set of addresses.
pub struct StaticLocator {
    addrs: Vec<Address>,
}

impl StaticLocator {
    pub fn new(addrs: Vec<Address>) -> Self {
        Self { addrs }
    }

    pub fn single(addr: Address) -> Self {
        Self { addrs: vec![addr] }
    }
}

#[async_trait]
impl ServerLocator for StaticLocator {
    async fn locate(&self) -> Result<Vec<Address>> {
        Ok(self.addrs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_locator_returns_configured_addrs() {
        let locator = StaticLocator::single(Address::new("127.0.0.1", 8372));
        let addrs = locator.locate().await.unwrap();
        assert_eq!(addrs, vec![Address::new("127.0.0.1", 8372)]);
    }
}
