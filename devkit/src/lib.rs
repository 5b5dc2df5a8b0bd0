/*!
# Hearth DevKit - Simulateurs et utilitaires de mise en route

Bibliothèque pour développer et tester autour du contrôleur sans matériel :
- Émetteur de trames capteur synthétiques (températures, ouvrants)
- Client d'injection de commandes (consignes, alarme)
- Simulateur de compteur au format du collecteur radio
- Constructeur de configuration de départ

Aucune dépendance sur le noyau : seul le contrat réseau est partagé.
*/

pub mod config_template;
pub mod control_client;
pub mod meter;
pub mod sensor_stub;

pub use config_template::TemplateBuilder;
pub use control_client::ControlClient;
pub use meter::{MeterReading, MeterSimulator};
pub use sensor_stub::SensorStub;

/// Journalisation des outils, pilotée par RUST_LOG. Sans effet si un
/// logger est déjà en place.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
