/// Eidos core
///
/// - `calibration` - pure mapping from (archetype, iteration count) to filter parameters
/// - `state` - the local store for settings and captured photos
/// - `capture` - turns camera frames into stored payloads
/// - `config` - where durable state lives
pub mod calibration;
pub mod capture;
pub mod config;
pub mod error;
pub mod state;

pub use calibration::{compute_filter_parameters, Archetype, FilterParameters};
pub use error::{CalibrationError, CaptureError, StorageError, StoreError};
pub use state::{Photo, PhotoDraft, PhotoId, Settings, SettingsPatch, SharedStore, Store};
