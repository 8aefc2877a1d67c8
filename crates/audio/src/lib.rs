//! emlink-audio – Geraete-Registry
//!
//! Haelt die Menge der verfuegbaren Audio-Endpunkte (USB-Soundkarten).
//! Die eigentliche Hardware-Erkennung liegt ausserhalb dieses Crates und
//! wird ueber den Trait [`GeraeteQuelle`] angebunden.

pub mod device;
pub mod error;

pub use device::{DeviceRegistry, GeraeteQuelle, StatischeGeraeteQuelle};
pub use error::{AudioError, AudioResult};
