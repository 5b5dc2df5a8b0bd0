/**
 * HEARTH NET - Canal de diffusion UDP multicast
 *
 * RÔLE : Côté émission, un envoi fire-and-forget vers le groupe (annonces,
 * capteurs de test). Côté réception, un socket abonné au groupe avec timeout
 * de lecture court : les boucles d'unités restent interruptibles entre deux
 * datagrammes.
 */

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(225, 1, 1, 1);
pub const ANNOUNCE_PORT: u16 = 5100;
pub const COMMAND_PORT: u16 = 5200;
pub const SENSOR_PORT: u16 = 5300;
pub const ZONE_PORT: u16 = 5500;

const RECV_BUFFER_BYTES: usize = 2048;

/// Émetteur sans état : un datagramme par appel, pas d'accusé de réception.
pub struct MulticastSender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl MulticastSender {
    pub fn new(group: Ipv4Addr, port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        Ok(Self {
            socket,
            target: SocketAddr::from((group, port)),
        })
    }

    /// L'échec d'envoi est signalé puis oublié, le canal n'a aucune garantie
    /// de livraison de toute façon.
    pub fn send(&self, msg: &str) {
        if let Err(e) = self.socket.send_to(msg.as_bytes(), self.target) {
            warn!(target = %self.target, "envoi multicast échoué: {e}");
        }
    }
}

/// Récepteur abonné au groupe. recv() rend None sur timeout, ce qui laisse
/// la boucle appelante re-tester son drapeau d'arrêt.
pub struct UdpChannel {
    socket: UdpSocket,
}

impl UdpChannel {
    pub fn bind(group: Ipv4Addr, port: u16, timeout: Duration) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?;
        socket.set_read_timeout(Some(timeout))?;
        // sans route multicast (conteneur isolé) on reste utilisable en
        // unicast direct sur le port
        if let Err(e) = socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED) {
            warn!(%group, port, "abonnement multicast refusé: {e}");
        }
        Ok(Self { socket })
    }

    pub fn local_port(&self) -> u16 {
        self.socket
            .local_addr()
            .map(|a| a.port())
            .unwrap_or_default()
    }

    pub fn recv(&self) -> Option<String> {
        let mut buf = [0u8; RECV_BUFFER_BYTES];
        match self.socket.recv_from(&mut buf) {
            Ok((len, _peer)) => Some(String::from_utf8_lossy(&buf[..len]).trim().to_string()),
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                None
            }
            Err(e) => {
                warn!("réception UDP en erreur: {e}");
                None
            }
        }
    }
}
