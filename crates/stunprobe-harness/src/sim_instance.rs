//! Object-lifecycle target and the shared port registry.

use std::{
    collections::HashSet,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use stunprobe_config::{HostInterfaces, OptionMap, Protocol, ServerConfig};
use stunprobe_core::{ServiceError, ServiceInstance};

use crate::listener::Listeners;

/// Ports held by running [`SimInstance`]s, shared between instances.
///
/// Stands in for the host's socket table: two instances claiming the same
/// `(protocol, port)` pair interfere exactly as two real servers would.
/// Cloning shares the same registry.
#[derive(Debug, Clone, Default)]
pub struct PortRegistry {
    claimed: Arc<Mutex<HashSet<(Protocol, u16)>>>,
}

impl PortRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `port` is held for `protocol`.
    pub fn is_claimed(&self, protocol: Protocol, port: u16) -> bool {
        self.lock().contains(&(protocol, port))
    }

    /// Number of held `(protocol, port)` pairs.
    pub fn claimed_count(&self) -> usize {
        self.lock().len()
    }

    // All or nothing: on conflict no port is claimed.
    fn claim(&self, protocol: Protocol, ports: &[u16]) -> Result<(), ServiceError> {
        let mut claimed = self.lock();
        if let Some(&port) = ports.iter().find(|&&port| claimed.contains(&(protocol, port))) {
            return Err(ServiceError::AddressInUse { port });
        }
        claimed.extend(ports.iter().map(|&port| (protocol, port)));
        Ok(())
    }

    fn release(&self, protocol: Protocol, ports: &[u16]) {
        let mut claimed = self.lock();
        for &port in ports {
            claimed.remove(&(protocol, port));
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<(Protocol, u16)>> {
        // The set stays consistent even if a holder panicked.
        self.claimed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process server instance created with its configuration.
///
/// The configuration is validated at construction, so a bad option object
/// never produces an instance. `start` claims the configuration's ports in the
/// shared [`PortRegistry`]; `stop` and `Drop` release them.
///
/// A [`listening`](Self::listening) instance also binds real sockets on those
/// ports and answers STUN binding requests until stopped, so an external
/// client can reach it.
#[derive(Debug)]
pub struct SimInstance {
    config: ServerConfig,
    registry: PortRegistry,
    running: bool,
    listen: bool,
    listeners: Option<Listeners>,
}

impl SimInstance {
    /// Validate `options` and create a stopped instance.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidConfig`] if the options are rejected.
    pub fn new(
        options: &OptionMap,
        host: &impl HostInterfaces,
        registry: PortRegistry,
    ) -> Result<Self, ServiceError> {
        let config = ServerConfig::from_options(options, host)?;
        Ok(Self { config, registry, running: false, listen: false, listeners: None })
    }

    /// Bind the bound ports for real on start, on the wildcard address of
    /// the configured family, and serve binding requests there.
    ///
    /// `start` must then run inside a Tokio runtime.
    #[must_use]
    pub fn listening(mut self) -> Self {
        self.listen = true;
        self
    }

    fn listen_addrs(&self) -> Vec<SocketAddr> {
        let ip = self.config.family.unspecified();
        self.config.bound_ports().into_iter().map(|port| SocketAddr::new(ip, port)).collect()
    }

    /// Validated configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Whether the instance holds its ports.
    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl ServiceInstance for SimInstance {
    fn start(&mut self) -> Result<bool, ServiceError> {
        if self.running {
            return Err(ServiceError::AlreadyRunning);
        }

        let ports = self.config.bound_ports();
        self.registry.claim(self.config.protocol, &ports)?;
        if self.listen {
            match Listeners::bind(self.config.protocol, &self.listen_addrs()) {
                Ok(listeners) => self.listeners = Some(listeners),
                Err(e) => {
                    self.registry.release(self.config.protocol, &ports);
                    return Err(e);
                },
            }
        }
        self.running = true;

        tracing::debug!(
            protocol = ?self.config.protocol,
            ?ports,
            listening = self.listen,
            "instance started"
        );
        Ok(true)
    }

    fn stop(&mut self) -> Result<(), ServiceError> {
        if !self.running {
            return Err(ServiceError::NotRunning);
        }

        self.listeners = None;
        self.registry.release(self.config.protocol, &self.config.bound_ports());
        self.running = false;

        tracing::debug!(primary_port = self.config.primary_port, "instance stopped");
        Ok(())
    }
}

impl Drop for SimInstance {
    fn drop(&mut self) {
        if self.running {
            self.registry.release(self.config.protocol, &self.config.bound_ports());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        net::{TcpListener, TcpStream, UdpSocket},
        time::Duration,
    };

    use stunprobe_config::{StaticInterfaces, keys};

    use super::*;
    use crate::binding::tests::{binding_request, mapped_address};

    // IPv4 success response: header plus two 12-byte address attributes.
    const RESPONSE_LEN: usize = 44;

    fn tcp_basic(primary: u16, alternate: u16) -> OptionMap {
        OptionMap::new()
            .with(keys::PROTOCOL, "tcp")
            .with(keys::MODE, "basic")
            .with(keys::PRIMARY_PORT, primary)
            .with(keys::ALTERNATE_PORT, alternate)
    }

    fn instance(options: &OptionMap, registry: &PortRegistry) -> SimInstance {
        SimInstance::new(options, &StaticInterfaces::dual_homed(), registry.clone())
            .expect("valid config")
    }

    #[test]
    fn invalid_options_fail_construction() {
        let options = OptionMap::new().with(keys::MODE, "half");
        let result =
            SimInstance::new(&options, &StaticInterfaces::dual_homed(), PortRegistry::new());

        assert!(matches!(result, Err(ServiceError::InvalidConfig(_))));
    }

    #[test]
    fn start_claims_and_stop_releases() {
        let registry = PortRegistry::new();
        let mut server = instance(&tcp_basic(3000, 3001), &registry);

        assert_eq!(server.start(), Ok(true));
        assert!(registry.is_claimed(Protocol::Tcp, 3000));
        // Basic mode listens on the primary port only.
        assert!(!registry.is_claimed(Protocol::Tcp, 3001));

        assert_eq!(server.stop(), Ok(()));
        assert_eq!(registry.claimed_count(), 0);
    }

    #[test]
    fn stop_when_stopped_errors() {
        let mut server = instance(&tcp_basic(3000, 3001), &PortRegistry::new());

        assert_eq!(server.stop(), Err(ServiceError::NotRunning));
        server.start().expect("start");
        assert_eq!(server.start(), Err(ServiceError::AlreadyRunning));
    }

    #[test]
    fn conflicting_instances_interfere() {
        let registry = PortRegistry::new();
        let mut first = instance(&tcp_basic(3000, 3001), &registry);
        let mut second = instance(&tcp_basic(3000, 3005), &registry);

        first.start().expect("first start");
        assert_eq!(second.start(), Err(ServiceError::AddressInUse { port: 3000 }));
        assert!(!second.is_running());

        first.stop().expect("first stop");
        assert_eq!(second.start(), Ok(true));
    }

    #[test]
    fn protocols_do_not_conflict() {
        let registry = PortRegistry::new();
        let udp = OptionMap::new().with(keys::PRIMARY_PORT, 3000).with(keys::ALTERNATE_PORT, 3001);
        let mut a = instance(&udp, &registry);
        let mut b = instance(&tcp_basic(3000, 3001), &registry);

        assert_eq!(a.start(), Ok(true));
        assert_eq!(b.start(), Ok(true));
        assert_eq!(registry.claimed_count(), 2);
    }

    #[test]
    fn full_mode_claims_both_ports_atomically() {
        let registry = PortRegistry::new();
        let full = OptionMap::new()
            .with(keys::MODE, "full")
            .with(keys::PRIMARY_PORT, 4000)
            .with(keys::ALTERNATE_PORT, 4001);
        let blocker = OptionMap::new().with(keys::PRIMARY_PORT, 4001).with(keys::ALTERNATE_PORT, 4002);

        let mut b = instance(&blocker, &registry);
        b.start().expect("blocker start");

        let mut f = instance(&full, &registry);
        assert_eq!(f.start(), Err(ServiceError::AddressInUse { port: 4001 }));
        assert!(!registry.is_claimed(Protocol::Udp, 4000));
    }

    #[test]
    fn drop_releases_ports() {
        let registry = PortRegistry::new();
        {
            let mut server = instance(&tcp_basic(3000, 3001), &registry);
            server.start().expect("start");
            assert_eq!(registry.claimed_count(), 1);
        }
        assert_eq!(registry.claimed_count(), 0);
    }

    fn free_tcp_port() -> u16 {
        TcpListener::bind("127.0.0.1:0").and_then(|l| l.local_addr()).expect("ephemeral port").port()
    }

    fn free_udp_port() -> u16 {
        UdpSocket::bind("127.0.0.1:0").and_then(|s| s.local_addr()).expect("ephemeral port").port()
    }

    #[tokio::test]
    async fn listening_tcp_instance_answers_binding_requests() {
        let registry = PortRegistry::new();
        let port = free_tcp_port();
        let mut server = instance(&tcp_basic(port, port - 1), &registry).listening();
        assert_eq!(server.start(), Ok(true));

        let (local, response) = tokio::task::spawn_blocking(move || {
            let mut stream = TcpStream::connect(("127.0.0.1", port))?;
            stream.set_read_timeout(Some(Duration::from_secs(5)))?;
            stream.write_all(&binding_request([9; 12]))?;
            let mut response = vec![0u8; RESPONSE_LEN];
            stream.read_exact(&mut response)?;
            std::io::Result::Ok((stream.local_addr()?, response))
        })
        .await
        .unwrap()
        .expect("binding exchange");

        assert_eq!(mapped_address(&response), Some(local));
        assert_eq!(server.stop(), Ok(()));
        assert_eq!(registry.claimed_count(), 0);
    }

    #[tokio::test]
    async fn listening_udp_instance_answers_binding_requests() {
        let port = free_udp_port();
        let options =
            OptionMap::new().with(keys::PRIMARY_PORT, port).with(keys::ALTERNATE_PORT, port - 1);
        let mut server = instance(&options, &PortRegistry::new()).listening();
        assert_eq!(server.start(), Ok(true));

        let (local, response) = tokio::task::spawn_blocking(move || {
            let socket = UdpSocket::bind("127.0.0.1:0")?;
            socket.set_read_timeout(Some(Duration::from_secs(5)))?;
            socket.send_to(&binding_request([4; 12]), ("127.0.0.1", port))?;
            let mut response = vec![0u8; 512];
            let (len, _) = socket.recv_from(&mut response)?;
            response.truncate(len);
            std::io::Result::Ok((socket.local_addr()?, response))
        })
        .await
        .unwrap()
        .expect("binding exchange");

        assert_eq!(response.len(), RESPONSE_LEN);
        assert_eq!(mapped_address(&response), Some(local));
    }

    #[tokio::test]
    async fn taken_socket_fails_start_and_releases_the_claim() {
        let registry = PortRegistry::new();
        let holder = TcpListener::bind("0.0.0.0:0").expect("bind");
        let port = holder.local_addr().expect("local addr").port();

        let mut server = instance(&tcp_basic(port, port - 1), &registry).listening();
        assert_eq!(server.start(), Err(ServiceError::AddressInUse { port }));
        assert!(!server.is_running());
        assert_eq!(registry.claimed_count(), 0);
    }

    #[test]
    fn listening_outside_a_runtime_fails_start() {
        let registry = PortRegistry::new();
        let mut server = instance(&tcp_basic(3000, 3001), &registry).listening();

        assert!(matches!(server.start(), Err(ServiceError::StartFailed(_))));
        assert_eq!(registry.claimed_count(), 0);
    }
}
