//! Whiteboard application layer: a facilitator session, the participants'
//! sticky-note contributions, and optional theme analysis, all persisted
//! through a [`KeyValueStore`](crate::storage::KeyValueStore).

pub mod analysis;
pub mod links;
pub mod placement;
pub mod records;
pub mod service;

pub use analysis::{analyze_themes, Classification, Classifier, HttpClassifier, ThemeAnalysis, ThemeGroup};
pub use records::{contributions_key, Contribution, Session, CURRENT_SESSION_KEY};
pub use service::WhiteboardService;
