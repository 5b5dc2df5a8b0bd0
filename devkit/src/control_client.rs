/*!
Client d'injection de commandes.

Pousse sur le port de commandes les mêmes messages `topic,arg,arg` que la
page d'état : consignes de chauffage et armement de l'alarme, depuis un
script ou un test d'intégration.
*/

use anyhow::Result;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(225, 1, 1, 1);
pub const COMMAND_PORT: u16 = 5200;

pub struct ControlClient {
    socket: UdpSocket,
    group: Ipv4Addr,
    command_port: u16,
}

impl ControlClient {
    pub fn new() -> Result<Self> {
        Self::with_group(DEFAULT_GROUP)
    }

    pub fn with_group(group: Ipv4Addr) -> Result<Self> {
        Ok(Self {
            socket: UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?,
            group,
            command_port: COMMAND_PORT,
        })
    }

    pub fn with_command_port(mut self, port: u16) -> Self {
        self.command_port = port;
        self
    }

    pub fn set_point(&self, zone: &str, fahrenheit: f64) -> Result<()> {
        self.send_raw(&format!("set_point,{zone},{fahrenheit}"))
    }

    pub fn arm_alarm(&self) -> Result<()> {
        self.send_raw("alarm,arm")
    }

    pub fn disarm_alarm(&self) -> Result<()> {
        self.send_raw("alarm,disarm")
    }

    /// Message brut, pour les sujets non couverts par les raccourcis.
    pub fn send_raw(&self, command: &str) -> Result<()> {
        self.socket.send_to(
            command.as_bytes(),
            SocketAddrV4::new(self.group, self.command_port),
        )?;
        log::info!("📤 commande: {command}");
        Ok(())
    }
}
