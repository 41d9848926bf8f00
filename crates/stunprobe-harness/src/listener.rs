//! Sockets served by a listening [`SimInstance`](crate::SimInstance).

use std::{io, net::SocketAddr};

use stunprobe_config::Protocol;
use stunprobe_core::ServiceError;
use tokio::{
    net::{TcpListener, TcpStream, UdpSocket},
    runtime::Handle,
    task::{AbortHandle, JoinSet},
};

use crate::binding;

const MAX_DATAGRAM: usize = 1500;

/// Serving tasks for one running instance. Dropping aborts them, which closes
/// the sockets.
#[derive(Debug)]
pub(crate) struct Listeners {
    tasks: Vec<AbortHandle>,
}

impl Listeners {
    /// Bind every address, then serve binding requests on the current Tokio
    /// runtime.
    ///
    /// Binding happens before `bind` returns, so a taken port is reported
    /// here. All or nothing: on error no socket stays open.
    pub(crate) fn bind(protocol: Protocol, addrs: &[SocketAddr]) -> Result<Self, ServiceError> {
        let handle = Handle::try_current()
            .map_err(|e| ServiceError::StartFailed(format!("listening needs a runtime: {e}")))?;
        let _entered = handle.enter();

        let sockets = addrs
            .iter()
            .map(|&addr| Socket::bind(protocol, addr).map_err(|e| bind_error(addr, &e)))
            .collect::<Result<Vec<_>, _>>()?;

        let tasks = sockets
            .into_iter()
            .map(|socket| handle.spawn(socket.serve()).abort_handle())
            .collect();
        Ok(Self { tasks })
    }
}

impl Drop for Listeners {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn bind_error(addr: SocketAddr, err: &io::Error) -> ServiceError {
    match err.kind() {
        io::ErrorKind::AddrInUse => ServiceError::AddressInUse { port: addr.port() },
        _ => ServiceError::StartFailed(format!("bind {addr}: {err}")),
    }
}

enum Socket {
    Tcp(TcpListener),
    Udp(UdpSocket),
}

impl Socket {
    // Bound through std so the call stays synchronous.
    fn bind(protocol: Protocol, addr: SocketAddr) -> io::Result<Self> {
        match protocol {
            Protocol::Tcp => {
                let listener = std::net::TcpListener::bind(addr)?;
                listener.set_nonblocking(true)?;
                Ok(Self::Tcp(TcpListener::from_std(listener)?))
            },
            Protocol::Udp => {
                let socket = std::net::UdpSocket::bind(addr)?;
                socket.set_nonblocking(true)?;
                Ok(Self::Udp(UdpSocket::from_std(socket)?))
            },
        }
    }

    async fn serve(self) {
        match self {
            Self::Tcp(listener) => serve_tcp(listener).await,
            Self::Udp(socket) => serve_udp(socket).await,
        }
    }
}

async fn serve_udp(socket: UdpSocket) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let (len, source) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                tracing::debug!(error = %e, "receive failed");
                continue;
            },
        };
        if let Some(response) = binding::respond(&buf[..len], source) {
            if let Err(e) = socket.send_to(&response, source).await {
                tracing::debug!(%source, error = %e, "response not sent");
            }
        }
    }
}

// Connection tasks live in the set, so aborting the accept loop drops them too.
async fn serve_tcp(listener: TcpListener) {
    let mut connections = JoinSet::new();
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                connections.spawn(serve_connection(stream, peer));
            },
            Err(e) => tracing::debug!(error = %e, "accept failed"),
        }
        while connections.try_join_next().is_some() {}
    }
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr) {
    let mut pending = Vec::new();
    let mut chunk = [0u8; MAX_DATAGRAM];
    loop {
        if stream.readable().await.is_err() {
            return;
        }
        match stream.try_read(&mut chunk) {
            Ok(0) => return,
            Ok(n) => pending.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => {
                tracing::debug!(%peer, error = %e, "connection dropped");
                return;
            },
        }

        while let Some(len) = binding::frame_len(&pending) {
            let message: Vec<u8> = pending.drain(..len).collect();
            let Some(response) = binding::respond(&message, peer) else { continue };
            if let Err(e) = write_all(&stream, &response).await {
                tracing::debug!(%peer, error = %e, "response not sent");
                return;
            }
        }
    }
}

async fn write_all(stream: &TcpStream, mut bytes: &[u8]) -> io::Result<()> {
    while !bytes.is_empty() {
        stream.writable().await?;
        match stream.try_write(bytes) {
            Ok(n) => bytes = &bytes[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {},
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
