/// State management module
///
/// This module handles everything the app persists:
/// - Photo records and their settings snapshot (data.rs)
/// - Calibration settings and partial updates (settings.rs)
/// - Key/value storage backends (storage.rs)
/// - The store that owns both records (store.rs)
pub mod data;
pub mod settings;
pub mod storage;
pub mod store;

pub use data::{ImageData, Photo, PhotoDraft, PhotoId};
pub use settings::{Settings, SettingsPatch};
pub use storage::{MemoryStorage, SqliteStorage, Storage};
pub use store::{SharedStore, Store};
