//! C6, the block accessor: resolves a [`BlockId`] to bytes by asking the
//! overlay for providers and fetching from them one at a time. Implements
//! `taskmesh_sync::BlockFetcher` so `DagSyncer` can drive it without caring
//! that the fetch crossed the network.

use std::time::{Duration, Instant};

use taskmesh_dag::Node;
use taskmesh_network_primitives::ProviderDiscovery;
use taskmesh_primitives::block::BlockId;
use taskmesh_sync::{BlockFetcher, FetchError};
use tracing::debug;

use crate::client::NetworkClient;

/// Default from SPEC_FULL §6's `block_request_timeout`.
pub const DEFAULT_BLOCK_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct BlockAccessor {
    client: NetworkClient,
    request_timeout: Duration,
}

impl BlockAccessor {
    #[must_use]
    pub const fn new(client: NetworkClient, request_timeout: Duration) -> Self {
        Self { client, request_timeout }
    }

    #[must_use]
    pub const fn with_default_timeout(client: NetworkClient) -> Self {
        Self::new(client, DEFAULT_BLOCK_REQUEST_TIMEOUT)
    }
}

#[async_trait::async_trait]
impl BlockFetcher for BlockAccessor {
    async fn fetch(&self, id: &BlockId) -> Result<Node, FetchError> {
        let deadline = Instant::now() + self.request_timeout;

        loop {
            let providers = self
                .client
                .find_providers(id)
                .await
                .map_err(|err| FetchError::Other(err.to_string()))?;

            for peer in providers {
                match self.client.request_block_from(peer, *id).await {
                    Ok(Some(bytes)) => {
                        return Node::decode(&bytes).map_err(|err| FetchError::Other(err.to_string()));
                    }
                    Ok(None) => continue,
                    Err(err) => {
                        debug!(%peer, %err, "block request failed, trying next provider");
                        continue;
                    }
                }
            }

            if Instant::now() >= deadline {
                return Err(FetchError::Timeout);
            }
        }
    }
}
