/*!
Émetteur de trames capteur synthétiques.

Rejoue sur UDP ce que les vrais capteurs envoient : `device_id:temp` pour
les thermomètres, une chaîne de 0/1 (0 = ouvert) pour les ouvrants. Permet
de faire vivre un contrôleur complet sans un seul capteur branché.
*/

use anyhow::Result;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(225, 1, 1, 1);
pub const SENSOR_PORT: u16 = 5300;
pub const ZONE_PORT: u16 = 5500;

pub struct SensorStub {
    socket: UdpSocket,
    group: Ipv4Addr,
    sensor_port: u16,
    zone_port: u16,
}

impl SensorStub {
    pub fn new() -> Result<Self> {
        Self::with_group(DEFAULT_GROUP)
    }

    /// Cible un autre groupe (ou une adresse unicast pour les tests).
    pub fn with_group(group: Ipv4Addr) -> Result<Self> {
        Ok(Self {
            socket: UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?,
            group,
            sensor_port: SENSOR_PORT,
            zone_port: ZONE_PORT,
        })
    }

    pub fn with_sensor_port(mut self, port: u16) -> Self {
        self.sensor_port = port;
        self
    }

    pub fn with_zone_port(mut self, port: u16) -> Self {
        self.zone_port = port;
        self
    }

    /// Trame thermomètre `device_id:temp`, température en Fahrenheit.
    pub fn send_temperature(&self, device_id: &str, fahrenheit: f64) -> Result<()> {
        let frame = format!("{device_id}:{fahrenheit:.2}");
        self.socket
            .send_to(frame.as_bytes(), SocketAddrV4::new(self.group, self.sensor_port))?;
        log::info!("📤 température: {frame}");
        Ok(())
    }

    /// Trame d'ouvrants, un booléen par zone dans l'ordre déclaré,
    /// true = ouvert (encodé 0 sur le fil).
    pub fn send_zone_frame(&self, open: &[bool]) -> Result<()> {
        let frame: String = open.iter().map(|o| if *o { '0' } else { '1' }).collect();
        self.socket
            .send_to(frame.as_bytes(), SocketAddrV4::new(self.group, self.zone_port))?;
        log::info!("📤 ouvrants: {frame}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn listener() -> (UdpSocket, u16) {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, port)
    }

    fn recv(socket: &UdpSocket) -> String {
        let mut buf = [0u8; 256];
        let (n, _) = socket.recv_from(&mut buf).unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[test]
    fn temperature_frames_carry_device_and_two_decimals() {
        let (socket, port) = listener();
        let stub = SensorStub::with_group(Ipv4Addr::LOCALHOST)
            .unwrap()
            .with_sensor_port(port);

        stub.send_temperature("thermostat_a", 68.5).unwrap();
        assert_eq!(recv(&socket), "thermostat_a:68.50");
    }

    #[test]
    fn zone_frames_encode_open_as_zero() {
        let (socket, port) = listener();
        let stub = SensorStub::with_group(Ipv4Addr::LOCALHOST)
            .unwrap()
            .with_zone_port(port);

        stub.send_zone_frame(&[true, false, false]).unwrap();
        assert_eq!(recv(&socket), "011");
    }
}
