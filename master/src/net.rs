//! The typed transport seam between the master and the byte-level network.

use std::{collections::HashMap, io, sync::Arc};

use async_trait::async_trait;
use futures::future;
use log::warn;
use parking_lot::RwLock;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{Mutex, mpsc::UnboundedSender},
    task::JoinHandle,
};

use comms::{RelayReceiver, RelaySender, msg::Msg};

use crate::master::Master;

/// Typed send/broadcast/multicast over network ids.
///
/// Implementations own the per-peer connections; the master never sees
/// bytes or sockets.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, nid: u32, msg: &Msg<'_>) -> io::Result<()>;

    async fn broadcast(&self, msg: &Msg<'_>) -> io::Result<()>;

    async fn multicast(&self, nids: &[u32], msg: &Msg<'_>) -> io::Result<()>;
}

/// Reads one peer's stream until it ends: immediate control is handled
/// in place on the receive task, everything else queues for the
/// dispatcher.
pub fn spawn_reader<R>(
    master: Arc<Master>,
    nid: u32,
    mut receiver: RelayReceiver<R>,
    queue: UnboundedSender<(u32, Msg<'static>)>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let msg = match receiver.recv::<Msg>().await {
                Ok(msg) => msg.into_owned(),
                Err(e) => {
                    warn!("peer {nid} read ended: {e}");
                    break;
                }
            };

            if let Msg::Immediate(ctl) = &msg {
                master.handle_immediate(nid, ctl);
                continue;
            }
            if queue.send((nid, msg)).is_err() {
                break;
            }
        }
    })
}

/// Comms-backed transport: one framed sender per connected peer.
pub struct RelayTransport<W: AsyncWrite + Unpin + Send> {
    peers: RwLock<HashMap<u32, Arc<Mutex<RelaySender<W>>>>>,
}

impl<W: AsyncWrite + Unpin + Send> RelayTransport<W> {
    pub fn new() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers the sending half of a freshly accepted connection.
    pub fn add_peer(&self, nid: u32, sender: RelaySender<W>) {
        self.peers.write().insert(nid, Arc::new(Mutex::new(sender)));
    }

    fn peer(&self, nid: u32) -> io::Result<Arc<Mutex<RelaySender<W>>>> {
        self.peers
            .read()
            .get(&nid)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, format!("no peer {nid}")))
    }

    fn selected(&self, nids: &[u32]) -> Vec<Arc<Mutex<RelaySender<W>>>> {
        let peers = self.peers.read();
        nids.iter().filter_map(|nid| peers.get(nid).cloned()).collect()
    }
}

impl<W: AsyncWrite + Unpin + Send> Default for RelayTransport<W> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Transport for RelayTransport<W> {
    async fn send(&self, nid: u32, msg: &Msg<'_>) -> io::Result<()> {
        let peer = self.peer(nid)?;
        let mut sender = peer.lock().await;
        sender.send(msg).await
    }

    async fn broadcast(&self, msg: &Msg<'_>) -> io::Result<()> {
        let peers: Vec<_> = self.peers.read().values().cloned().collect();
        let sends = peers.iter().map(|peer| async {
            let mut sender = peer.lock().await;
            sender.send(msg).await
        });
        future::try_join_all(sends).await.map(drop)
    }

    async fn multicast(&self, nids: &[u32], msg: &Msg<'_>) -> io::Result<()> {
        let peers = self.selected(nids);
        let sends = peers.iter().map(|peer| async {
            let mut sender = peer.lock().await;
            sender.send(msg).await
        });
        future::try_join_all(sends).await.map(drop)
    }
}
