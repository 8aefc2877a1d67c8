//! E&M-Leitungssignalisierung
//!
//! Reine Zustandsuebergaenge auf `SignalingSnapshot`, ohne I/O und ohne
//! eigenen Zustand. Der Aufrufer (die Session-Registry) speichert das
//! Ergebnis in seiner Session-Tabelle.
//!
//! ```text
//! idle --belegen--> seized --melden--> answered --durchschalten--> connected
//! {seized, answered, connected} --ausloesen--> disconnected
//! ```
//!
//! `disconnected` ist fuer eine Session-Instanz endgueltig.

use emlink_core::model::{EmZustand, SignalingSnapshot};

/// Die vier Uebergaenge der Zustandsmaschine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmUebergang {
    /// seize: M-Ader anlegen
    Belegen,
    /// answer: E-Ader anlegen
    Melden,
    /// connect
    Durchschalten,
    /// disconnect: beide Adern freigeben
    Ausloesen,
}

impl std::fmt::Display for EmUebergang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Belegen => "seize",
            Self::Melden => "answer",
            Self::Durchschalten => "connect",
            Self::Ausloesen => "disconnect",
        };
        f.write_str(name)
    }
}

/// Unzulaessiger Uebergang aus dem aktuellen Zustand
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{versucht} im Zustand {aktuell} nicht erlaubt")]
pub struct UngueltigerUebergang {
    pub versucht: EmUebergang,
    pub aktuell: EmZustand,
}

pub type EmResult = Result<SignalingSnapshot, UngueltigerUebergang>;

/// Wendet einen Uebergang an; der Eingabewert bleibt bei Fehlern unberuehrt
pub fn anwenden(aktuell: SignalingSnapshot, uebergang: EmUebergang) -> EmResult {
    use EmZustand::*;

    let neu = match (uebergang, aktuell.state) {
        (EmUebergang::Belegen, Idle) => SignalingSnapshot {
            state: Seized,
            m_lead: true,
            ..aktuell
        },
        (EmUebergang::Melden, Seized) => SignalingSnapshot {
            state: Answered,
            e_lead: true,
            ..aktuell
        },
        (EmUebergang::Durchschalten, Answered) => SignalingSnapshot {
            state: Connected,
            ..aktuell
        },
        (EmUebergang::Ausloesen, Seized | Answered | Connected) => SignalingSnapshot {
            state: Disconnected,
            e_lead: false,
            m_lead: false,
        },
        (versucht, zustand) => {
            return Err(UngueltigerUebergang {
                versucht,
                aktuell: zustand,
            })
        }
    };
    Ok(neu)
}

pub fn belegen(s: SignalingSnapshot) -> EmResult {
    anwenden(s, EmUebergang::Belegen)
}

pub fn melden(s: SignalingSnapshot) -> EmResult {
    anwenden(s, EmUebergang::Melden)
}

pub fn durchschalten(s: SignalingSnapshot) -> EmResult {
    anwenden(s, EmUebergang::Durchschalten)
}

pub fn ausloesen(s: SignalingSnapshot) -> EmResult {
    anwenden(s, EmUebergang::Ausloesen)
}

/// Aufnahme-Sequenz einer neuen Verbindung: belegen, melden, durchschalten
///
/// Laeuft als ein Schritt; Zwischenzustaende werden nie gespeichert.
pub fn aufnahme(s: SignalingSnapshot) -> EmResult {
    belegen(s).and_then(melden).and_then(durchschalten)
}

/// Prueft ob `ausloesen` aus dem Zustand zulaessig ist
pub fn kann_ausloesen(zustand: EmZustand) -> bool {
    matches!(
        zustand,
        EmZustand::Seized | EmZustand::Answered | EmZustand::Connected
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn belegen_setzt_m_ader() {
        let s = belegen(SignalingSnapshot::IDLE).unwrap();
        assert_eq!(s.state, EmZustand::Seized);
        assert!(s.m_lead);
        assert!(!s.e_lead);
    }

    #[test]
    fn melden_setzt_e_ader() {
        let s = belegen(SignalingSnapshot::IDLE).and_then(melden).unwrap();
        assert_eq!(s.state, EmZustand::Answered);
        assert!(s.m_lead && s.e_lead);
    }

    #[test]
    fn aufnahme_endet_durchgeschaltet() {
        let s = aufnahme(SignalingSnapshot::IDLE).unwrap();
        assert_eq!(s.state, EmZustand::Connected);
        assert!(s.e_lead);
        assert!(s.m_lead);
    }

    #[test]
    fn ausloesen_gibt_adern_frei() {
        for start in [
            belegen(SignalingSnapshot::IDLE).unwrap(),
            belegen(SignalingSnapshot::IDLE).and_then(melden).unwrap(),
            aufnahme(SignalingSnapshot::IDLE).unwrap(),
        ] {
            let s = ausloesen(start).unwrap();
            assert_eq!(s.state, EmZustand::Disconnected);
            assert!(!s.e_lead && !s.m_lead);
        }
    }

    #[test]
    fn uebergaenge_ausser_der_reihe_scheitern() {
        let idle = SignalingSnapshot::IDLE;
        let err = melden(idle).unwrap_err();
        assert_eq!(err.versucht, EmUebergang::Melden);
        assert_eq!(err.aktuell, EmZustand::Idle);

        assert!(durchschalten(idle).is_err());
        assert!(ausloesen(idle).is_err());

        let belegt = belegen(idle).unwrap();
        assert!(belegen(belegt).is_err());
        assert!(durchschalten(belegt).is_err());

        let verbunden = aufnahme(idle).unwrap();
        assert!(belegen(verbunden).is_err());
        assert!(melden(verbunden).is_err());
    }

    #[test]
    fn disconnected_ist_endgueltig() {
        let getrennt = ausloesen(aufnahme(SignalingSnapshot::IDLE).unwrap()).unwrap();
        for u in [
            EmUebergang::Belegen,
            EmUebergang::Melden,
            EmUebergang::Durchschalten,
            EmUebergang::Ausloesen,
        ] {
            let err = anwenden(getrennt, u).unwrap_err();
            assert_eq!(err.aktuell, EmZustand::Disconnected);
        }
    }

    #[test]
    fn fehlertext_nennt_uebergang_und_zustand() {
        let err = durchschalten(SignalingSnapshot::IDLE).unwrap_err();
        assert_eq!(err.to_string(), "connect im Zustand idle nicht erlaubt");
    }

    #[test]
    fn kann_ausloesen_nur_aus_aktiven_zustaenden() {
        assert!(!kann_ausloesen(EmZustand::Idle));
        assert!(!kann_ausloesen(EmZustand::Disconnected));
        assert!(kann_ausloesen(EmZustand::Connected));
    }
}
