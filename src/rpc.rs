//! Wire types and transport plumbing shared by the coordinator and workers.
//!
//! The transport is a Unix domain socket at a path derived from the
//! invoking user's uid, so workers and coordinator started by the same
//! user rendezvous without configuration and two users on one host never
//! collide.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

pub mod pb {
    tonic::include_proto!("mapreduce");
}

use pb::coordinator_client::CoordinatorClient;

/// Default socket path for the per-user rendezvous.
pub fn coordinator_sock() -> PathBuf {
    PathBuf::from(format!("/var/tmp/minimr-{}.sock", nix::unistd::getuid()))
}

/// Dial the coordinator over its Unix socket.
///
/// The endpoint URI is a placeholder: the connector ignores it and dials
/// `sock` instead.
pub async fn connect(sock: &Path) -> Result<CoordinatorClient<Channel>> {
    let sock = sock.to_path_buf();
    let channel = Endpoint::try_from("http://[::]:50051")?
        .connect_with_connector(service_fn(move |_: Uri| UnixStream::connect(sock.clone())))
        .await
        .context("dialing coordinator socket")?;
    Ok(CoordinatorClient::new(channel))
}
