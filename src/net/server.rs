//! Peer Server
//!
//! Accepts peer links and answers `PeerRequest` frames against the node's store catalog.
//! Requests on one link are answered strictly in arrival order; store calls run on the
//! blocking pool.

use super::protocol::{PeerRequest, PeerResponse, decode, encode};
use crate::storage::catalog::StoreCatalog;
use crate::storage::cursor;
use crate::storage::types::{self as store_types, StoreError};

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

pub struct PeerServer {
    catalog: Arc<StoreCatalog>,
    listener: TcpListener,
}

impl PeerServer {
    pub async fn bind(addr: SocketAddr, catalog: Arc<StoreCatalog>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { catalog, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop. Each peer link is served on its own task.
    pub async fn run(self) -> Result<()> {
        tracing::info!("Peer server listening on {}", self.listener.local_addr()?);

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Failed to accept peer link: {}", e);
                    continue;
                }
            };
            tracing::debug!("Accepted peer link from {}", peer);

            let catalog = self.catalog.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_peer(catalog, stream).await {
                    tracing::warn!("Peer link from {} failed: {}", peer, e);
                }
                tracing::debug!("Peer link from {} closed", peer);
            });
        }
    }
}

async fn serve_peer(catalog: Arc<StoreCatalog>, stream: TcpStream) -> Result<()> {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());

    while let Some(frame) = framed.next().await {
        let frame = frame?;
        let response = match decode::<PeerRequest>(&frame) {
            Ok(request) => {
                let catalog = catalog.clone();
                tokio::task::spawn_blocking(move || respond(&catalog, request))
                    .await
                    .unwrap_or_else(|e| PeerResponse::Error(format!("request failed: {}", e)))
            }
            Err(e) => PeerResponse::Error(e.to_string()),
        };
        framed.send(encode(&response)?).await?;
    }

    Ok(())
}

/// Runs one request against the catalog; store failures become `PeerResponse::Error`.
pub fn respond(catalog: &StoreCatalog, request: PeerRequest) -> PeerResponse {
    match dispatch(catalog, request) {
        Ok(response) => response,
        Err(e) => PeerResponse::Error(e.to_string()),
    }
}

fn dispatch(catalog: &StoreCatalog, request: PeerRequest) -> store_types::Result<PeerResponse> {
    let lookup = |map: &str| {
        catalog
            .get(map)
            .ok_or_else(|| StoreError::Config(format!("unknown map: {}", map)))
    };

    match request {
        PeerRequest::Get { map, key } => Ok(PeerResponse::Value(lookup(&map)?.get(&key)?)),
        PeerRequest::Put { map, key, value } => {
            lookup(&map)?.put(&key, value)?;
            Ok(PeerResponse::Stored)
        }
        PeerRequest::HasKey { map, key } => {
            Ok(PeerResponse::Exists(lookup(&map)?.has_key(&key)?))
        }
        PeerRequest::Scan { map, partial } => match lookup(&map)?.scan(&partial)? {
            Some(mut found) => Ok(PeerResponse::Entries(Some(cursor::drain(&mut found)?))),
            None => Ok(PeerResponse::Entries(None)),
        },
        PeerRequest::Aggregate { map, partial, op } => {
            Ok(PeerResponse::Value(lookup(&map)?.aggregate(&partial, op)?))
        }
        PeerRequest::Dump { map } => Ok(PeerResponse::Dump(lookup(&map)?.dump()?)),
        PeerRequest::Ping => Ok(PeerResponse::Pong {
            maps: catalog.names(),
        }),
    }
}
