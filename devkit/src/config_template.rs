/*!
Constructeur de configuration de départ.

Assemble un fichier YAML prêt pour le contrôleur à partir de la
description de la maison : zones chauffées, habitants, ouvrants, compteur.
Les sections sans matière sont omises, l'unité correspondante restera
désactivée.
*/

#[derive(Debug)]
pub struct TemplateBuilder {
    data_dir: String,
    bind_address: String,
    multicast_group: String,
    zones: Vec<(String, String)>,
    users: Vec<(String, String)>,
    rules: Vec<(String, Vec<String>)>,
    security_zones: Vec<String>,
    meter_serial: Option<u64>,
    notify: Option<(String, String)>,
}

impl Default for TemplateBuilder {
    fn default() -> Self {
        Self {
            data_dir: "data".into(),
            bind_address: "0.0.0.0:8080".into(),
            multicast_group: "225.1.1.1".into(),
            zones: Vec::new(),
            users: Vec::new(),
            rules: Vec::new(),
            security_zones: Vec::new(),
            meter_serial: None,
            notify: None,
        }
    }
}

impl TemplateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_dir(mut self, dir: &str) -> Self {
        self.data_dir = dir.to_string();
        self
    }

    pub fn bind_address(mut self, addr: &str) -> Self {
        self.bind_address = addr.to_string();
        self
    }

    pub fn multicast_group(mut self, group: &str) -> Self {
        self.multicast_group = group.to_string();
        self
    }

    /// Zone chauffée : identifiant du thermomètre et nom affiché.
    pub fn zone(mut self, device_id: &str, name: &str) -> Self {
        self.zones.push((device_id.to_string(), name.to_string()));
        self
    }

    /// Habitant suivi par sa MAC.
    pub fn user(mut self, name: &str, mac: &str) -> Self {
        self.users.push((name.to_string(), mac.to_string()));
        self
    }

    /// Zones dont la consigne de cet habitant compte quand il est là.
    pub fn rule(mut self, user: &str, zones: &[&str]) -> Self {
        self.rules
            .push((user.to_string(), zones.iter().map(|z| z.to_string()).collect()));
        self
    }

    pub fn security_zone(mut self, name: &str) -> Self {
        self.security_zones.push(name.to_string());
        self
    }

    pub fn meter(mut self, serial: u64) -> Self {
        self.meter_serial = Some(serial);
        self
    }

    pub fn notify_command(mut self, command: &str, number: &str) -> Self {
        self.notify = Some((command.to_string(), number.to_string()));
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "general:\n  data_dir: {}\n  bind_address: {}\n  multicast_group: {}\n\n",
            self.data_dir, self.bind_address, self.multicast_group
        ));

        if let Some((command, number)) = &self.notify {
            out.push_str(&format!(
                "notify:\n  command: \"{command}\"\n  number: \"{number}\"\n\n"
            ));
        }

        out.push_str("commands:\n  enabled: true\n\n");

        if !self.zones.is_empty() {
            out.push_str("temperature:\n  enabled: true\n");
            for (n, (device_id, name)) in self.zones.iter().enumerate() {
                out.push_str(&format!("  zone_{n}: \"{device_id}={name}\"\n"));
            }
            out.push('\n');
        }

        if !self.users.is_empty() {
            out.push_str("presence:\n  enabled: true\n");
            for (n, (name, mac)) in self.users.iter().enumerate() {
                out.push_str(&format!("  user_{n}: \"{name}={mac}\"\n"));
            }
            out.push('\n');
        }

        out.push_str("memory:\n  enabled: true\n\n");

        if let Some(serial) = self.meter_serial {
            out.push_str(&format!(
                "energy:\n  enabled: true\n  collector_command: \"rtlamr -format=json\"\n  meter_serial: {serial}\n\n"
            ));
        }

        if !self.zones.is_empty() {
            out.push_str("setpoint:\n  enabled: true\n");
            for (n, (user, zones)) in self.rules.iter().enumerate() {
                out.push_str(&format!("  rule_{n}: \"{user}={}\"\n", zones.join(",")));
            }
            out.push('\n');
            out.push_str("furnace:\n  enabled: true\n\n");
        }

        if !self.security_zones.is_empty() {
            out.push_str("security:\n  enabled: true\n");
            for (n, name) in self.security_zones.iter().enumerate() {
                out.push_str(&format!("  zone_{n}: {name}\n"));
            }
            out.push('\n');
        }

        out.push_str("status:\n  enabled: true\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_full_house_gets_every_section() {
        let yaml = TemplateBuilder::new()
            .data_dir("/var/lib/hearth")
            .zone("thermostat_a", "Living Room")
            .zone("thermostat_b", "Bedroom")
            .user("alice", "aa:bb:cc:dd:ee:ff")
            .rule("alice", &["Living Room", "Bedroom"])
            .security_zone("front_door")
            .meter(12345678)
            .notify_command("signal-cli send -m {message} {number}", "+15550000000")
            .render();

        assert!(yaml.contains("data_dir: /var/lib/hearth"));
        assert!(yaml.contains("zone_1: \"thermostat_b=Bedroom\""));
        assert!(yaml.contains("user_0: \"alice=aa:bb:cc:dd:ee:ff\""));
        assert!(yaml.contains("rule_0: \"alice=Living Room,Bedroom\""));
        assert!(yaml.contains("meter_serial: 12345678"));
        assert!(yaml.contains("zone_0: front_door"));
        assert!(yaml.contains("furnace:\n  enabled: true"));
    }

    #[test]
    fn empty_sections_are_omitted() {
        let yaml = TemplateBuilder::new().render();
        assert!(yaml.contains("general:"));
        assert!(yaml.contains("commands:"));
        assert!(yaml.contains("status:"));
        assert!(!yaml.contains("temperature:"));
        assert!(!yaml.contains("presence:"));
        assert!(!yaml.contains("energy:"));
        assert!(!yaml.contains("security:"));
    }
}
