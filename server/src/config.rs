//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use emlink_core::{AudioDevice, DeviceStatus};
use emlink_signaling::SignalingConfig;
use serde::{Deserialize, Serialize};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Sitzungs- und Broadcast-Einstellungen
    pub sitzung: SitzungsEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
    /// Statische Geraeteliste (ersetzt die Hardware-Erkennung)
    pub geraete: Vec<GeraetEintrag>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: ServerEinstellungen::default(),
            netzwerk: NetzwerkEinstellungen::default(),
            sitzung: SitzungsEinstellungen::default(),
            logging: LoggingEinstellungen::default(),
            observability: ObservabilityEinstellungen::default(),
            geraete: GeraetEintrag::usb_standard(),
        }
    }
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Clients
    pub max_clients: u32,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "emlink".into(),
            max_clients: 64,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer alle Listener
    pub bind_adresse: String,
    /// Port fuer das Control-Protokoll (TCP)
    pub tcp_port: u16,
    /// Port fuer Metriken und Health
    pub observability_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            tcp_port: 3001,
            observability_port: 9300,
        }
    }
}

/// Sitzungs-, Telemetrie- und Broadcast-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SitzungsEinstellungen {
    /// Lautstaerke neuer Verbindungen (0.0 bis 1.0)
    pub standard_lautstaerke: f32,
    /// Periode der Pegel-Telemetrie in Millisekunden
    pub telemetrie_intervall_ms: u64,
    /// Queue-Groesse pro Beobachter
    pub queue_kapazitaet: usize,
    /// Ping-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Inaktivitaets-Timeout in Sekunden
    pub verbindungs_timeout_sek: u64,
}

impl Default for SitzungsEinstellungen {
    fn default() -> Self {
        Self {
            standard_lautstaerke: 0.8,
            telemetrie_intervall_ms: 100,
            queue_kapazitaet: 256,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self { aktiviert: true }
    }
}

/// Ein Eintrag der `[[geraete]]`-Liste
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeraetEintrag {
    pub id: String,
    pub name: String,
    #[serde(default = "standard_kanaele")]
    pub kanaele: u16,
    #[serde(default = "standard_status")]
    pub status: DeviceStatus,
}

fn standard_kanaele() -> u16 {
    2
}

fn standard_status() -> DeviceStatus {
    DeviceStatus::Active
}

impl GeraetEintrag {
    /// Vier USB-Soundkarten `usb0..usb3`, `usb2` ist inaktiv
    pub fn usb_standard() -> Vec<Self> {
        (0..4)
            .map(|i| Self {
                id: format!("usb{i}"),
                name: format!("USB Audio Device {}", i + 1),
                kanaele: 2,
                status: if i == 2 {
                    DeviceStatus::Inactive
                } else {
                    DeviceStatus::Active
                },
            })
            .collect()
    }
}

impl From<GeraetEintrag> for AudioDevice {
    fn from(e: GeraetEintrag) -> Self {
        AudioDevice {
            id: e.id,
            name: e.name,
            channel_count: e.kanaele,
            status: e.status,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                config.pruefen()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Prueft Wertebereiche, die serde nicht abdeckt
    pub fn pruefen(&self) -> anyhow::Result<()> {
        let volume = self.sitzung.standard_lautstaerke;
        if !(0.0..=1.0).contains(&volume) {
            anyhow::bail!("sitzung.standard_lautstaerke muss zwischen 0.0 und 1.0 liegen, ist {volume}");
        }
        if self.sitzung.telemetrie_intervall_ms == 0 {
            anyhow::bail!("sitzung.telemetrie_intervall_ms muss groesser als 0 sein");
        }
        if self.sitzung.keepalive_sek == 0 {
            anyhow::bail!("sitzung.keepalive_sek muss groesser als 0 sein");
        }
        if self.sitzung.verbindungs_timeout_sek <= self.sitzung.keepalive_sek {
            anyhow::bail!("sitzung.verbindungs_timeout_sek muss groesser als keepalive_sek sein");
        }
        if !emlink_observability::logging::log_format_gueltig(&self.logging.format) {
            anyhow::bail!("logging.format '{}' unbekannt (text/json)", self.logging.format);
        }
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse fuer TCP zurueck
    pub fn tcp_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.tcp_port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> String {
        format!(
            "{}:{}",
            self.netzwerk.bind_adresse, self.netzwerk.observability_port
        )
    }

    /// Leitet die Konfiguration des Signaling-Service ab
    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            server_name: self.server.name.clone(),
            max_clients: self.server.max_clients,
            keepalive_sek: self.sitzung.keepalive_sek,
            verbindungs_timeout_sek: self.sitzung.verbindungs_timeout_sek,
        }
    }

    /// Konfigurierte Geraete als Datenmodell
    pub fn geraete_liste(&self) -> Vec<AudioDevice> {
        self.geraete.iter().cloned().map(AudioDevice::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.server.max_clients, 64);
        assert_eq!(cfg.netzwerk.tcp_port, 3001);
        assert_eq!(cfg.sitzung.standard_lautstaerke, 0.8);
        assert_eq!(cfg.sitzung.telemetrie_intervall_ms, 100);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.pruefen().is_ok());
    }

    #[test]
    fn standard_geraete_sind_vier_usb_karten() {
        let geraete = ServerConfig::default().geraete_liste();
        assert_eq!(geraete.len(), 4);
        assert_eq!(geraete[0].id, "usb0");
        assert_eq!(geraete[3].name, "USB Audio Device 4");
        assert_eq!(geraete[2].status, DeviceStatus::Inactive);
        assert!(geraete.iter().all(|g| g.channel_count == 2));
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.tcp_bind_adresse(), "0.0.0.0:3001");
        assert_eq!(cfg.observability_bind_adresse(), "0.0.0.0:9300");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Leitstand"
            max_clients = 8

            [sitzung]
            queue_kapazitaet = 32

            [[geraete]]
            id = "line1"
            name = "Leitung 1"

            [[geraete]]
            id = "line2"
            name = "Leitung 2"
            kanaele = 1
            status = "error"
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.name, "Leitstand");
        assert_eq!(cfg.server.max_clients, 8);
        assert_eq!(cfg.sitzung.queue_kapazitaet, 32);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.sitzung.keepalive_sek, 30);
        assert_eq!(cfg.netzwerk.tcp_port, 3001);

        let geraete = cfg.geraete_liste();
        assert_eq!(geraete.len(), 2);
        assert_eq!(geraete[0].channel_count, 2);
        assert_eq!(geraete[0].status, DeviceStatus::Active);
        assert_eq!(geraete[1].status, DeviceStatus::Error);
    }

    #[test]
    fn signaling_config_uebernimmt_werte() {
        let mut cfg = ServerConfig::default();
        cfg.server.max_clients = 3;
        cfg.sitzung.keepalive_sek = 5;
        let sc = cfg.signaling_config();
        assert_eq!(sc.max_clients, 3);
        assert_eq!(sc.keepalive_sek, 5);
        assert_eq!(sc.server_name, "emlink");
    }

    #[test]
    fn ungueltige_werte_werden_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.sitzung.standard_lautstaerke = 1.5;
        assert!(cfg.pruefen().is_err());

        let mut cfg = ServerConfig::default();
        cfg.sitzung.telemetrie_intervall_ms = 0;
        assert!(cfg.pruefen().is_err());

        let mut cfg = ServerConfig::default();
        cfg.sitzung.verbindungs_timeout_sek = cfg.sitzung.keepalive_sek;
        assert!(cfg.pruefen().is_err());

        let mut cfg = ServerConfig::default();
        cfg.logging.format = "xml".into();
        assert!(cfg.pruefen().is_err());
    }

    #[test]
    fn fehlende_datei_liefert_standard() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/emlink.toml").unwrap();
        assert_eq!(cfg.netzwerk.tcp_port, 3001);
    }
}
