use std::sync::Arc;

use chrono::Utc;
use rand::seq::SliceRandom;
use tracing::{info, warn};

use super::placement::{clamp_to_board, pick_position, random_rotation};
use super::records::{contributions_key, Contribution, Session, CURRENT_SESSION_KEY, NOTE_COLORS};
use crate::errors::ServiceError;
use crate::storage::KeyValueStore;

/// Session and contribution bookkeeping on top of any backend.
///
/// The contributions of a session live as one JSON array under one key and
/// every change rewrites the whole array, so two clients adding notes at the
/// same moment can lose one of them.
#[derive(Clone)]
pub struct WhiteboardService {
    store: Arc<dyn KeyValueStore>,
}

impl WhiteboardService {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> { &self.store }

    /// The facilitator's current session; unreadable records count as none.
    pub async fn load_session(&self) -> Option<Session> {
        let entry = match self.store.get(CURRENT_SESSION_KEY).await {
            Ok(entry) => entry?,
            Err(e) => {
                warn!(error = %e, "cannot read current session, starting fresh");
                return None;
            }
        };
        match serde_json::from_str(&entry.value) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "current session record is malformed, starting fresh");
                None
            }
        }
    }

    /// Create a session for `question` with an empty board.
    pub async fn start_session(&self, question: &str) -> Result<Session, ServiceError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ServiceError::Validation("question must not be empty".into()));
        }
        let session = Session {
            id: format!("session-{}", Utc::now().timestamp_millis()),
            question: question.to_string(),
        };
        let record = serde_json::to_string(&session).map_err(crate::StoreError::from)?;
        self.store.set(CURRENT_SESSION_KEY, &record).await?;
        self.save_contributions(&session.id, &[]).await?;
        info!(session = %session.id, "session started");
        Ok(session)
    }

    /// Notes of a session; unreadable or missing lists count as empty.
    pub async fn load_contributions(&self, session_id: &str) -> Vec<Contribution> {
        let key = contributions_key(session_id);
        match self.store.get(&key).await {
            Ok(Some(entry)) => serde_json::from_str(&entry.value).unwrap_or_else(|e| {
                warn!(session = session_id, error = %e, "contributions record is malformed");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(session = session_id, error = %e, "cannot read contributions");
                Vec::new()
            }
        }
    }

    /// Strict read for read-modify-write: a failed read or a malformed list is
    /// an error, so the caller never writes a truncated list back.
    async fn try_load_contributions(&self, session_id: &str) -> Result<Vec<Contribution>, ServiceError> {
        let key = contributions_key(session_id);
        match self.store.get(&key).await? {
            Some(entry) => Ok(serde_json::from_str(&entry.value).map_err(crate::StoreError::from)?),
            None => Ok(Vec::new()),
        }
    }

    /// Overwrite the whole list of a session.
    pub async fn save_contributions(
        &self,
        session_id: &str,
        contributions: &[Contribution],
    ) -> Result<(), ServiceError> {
        let value = serde_json::to_string(contributions).map_err(crate::StoreError::from)?;
        self.store.set(&contributions_key(session_id), &value).await?;
        Ok(())
    }

    /// Append a note with a random colour and tilt at a free spot on the board.
    pub async fn add_contribution(
        &self,
        session_id: &str,
        text: &str,
        category: Option<String>,
    ) -> Result<Contribution, ServiceError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ServiceError::Validation("contribution text must not be empty".into()));
        }

        let mut contributions = self.try_load_contributions(session_id).await?;
        let id = next_id(&contributions)?;
        let note = {
            let mut rng = rand::thread_rng();
            let occupied: Vec<(f64, f64)> = contributions.iter().map(|c| (c.x, c.y)).collect();
            let (x, y) = pick_position(&mut rng, &occupied);
            Contribution {
                id,
                text: text.to_string(),
                color: NOTE_COLORS
                    .choose(&mut rng)
                    .copied()
                    .unwrap_or(NOTE_COLORS[0])
                    .to_string(),
                x,
                y,
                rotation: random_rotation(&mut rng),
                category,
                ai_theme: None,
                ai_score: None,
            }
        };

        contributions.push(note.clone());
        self.save_contributions(session_id, &contributions).await?;
        info!(session = session_id, contribution = note.id, "contribution added");
        Ok(note)
    }

    /// Move a note after a drag. Returns `false` when no note has that id.
    pub async fn move_contribution(
        &self,
        session_id: &str,
        contribution_id: u64,
        x: f64,
        y: f64,
    ) -> Result<bool, ServiceError> {
        let mut contributions = self.try_load_contributions(session_id).await?;
        let Some(note) = contributions.iter_mut().find(|c| c.id == contribution_id) else {
            return Ok(false);
        };
        (note.x, note.y) = clamp_to_board(x, y);
        self.save_contributions(session_id, &contributions).await?;
        Ok(true)
    }

    /// Remove every note but keep the session.
    pub async fn clear_board(&self, session_id: &str) -> Result<(), ServiceError> {
        self.save_contributions(session_id, &[]).await?;
        info!(session = session_id, "board cleared");
        Ok(())
    }

    /// Forget the current session. Its contributions stay under their own key.
    pub async fn reset_session(&self) -> Result<(), ServiceError> {
        self.store.delete(CURRENT_SESSION_KEY).await?;
        info!("session reset");
        Ok(())
    }
}

/// Millisecond timestamp, bumped past the newest id so two notes added within
/// the same millisecond stay distinct.
fn next_id(existing: &[Contribution]) -> Result<u64, ServiceError> {
    let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
    match existing.iter().map(|c| c.id).max() {
        Some(max) if max >= now => max
            .checked_add(1)
            .ok_or_else(|| ServiceError::Validation("contribution ids exhausted".into())),
        _ => Ok(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::storage::{Entry, LocalStore};
    use async_trait::async_trait;

    fn service() -> (WhiteboardService, LocalStore) {
        let store = LocalStore::new();
        (WhiteboardService::new(Arc::new(store.clone())), store)
    }

    /// Every call fails like an unreachable backend.
    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<Entry>, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
        async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
        fn backend_name(&self) -> &'static str { "broken" }
    }

    #[tokio::test]
    async fn start_session_writes_session_and_empty_board() -> Result<(), anyhow::Error> {
        let (svc, store) = service();
        let session = svc.start_session("  Quels sont vos rêves ?  ").await?;

        assert!(session.id.starts_with("session-"));
        assert_eq!(session.question, "Quels sont vos rêves ?");
        assert_eq!(svc.load_session().await, Some(session.clone()));
        let raw = store.get(&contributions_key(&session.id)).await?.expect("board written");
        assert_eq!(raw.value, "[]");
        Ok(())
    }

    #[tokio::test]
    async fn blank_input_is_rejected() {
        let (svc, _) = service();
        assert!(matches!(svc.start_session("   ").await, Err(ServiceError::Validation(_))));
        assert!(matches!(
            svc.add_contribution("session-1", "\n", None).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn contributions_accumulate_with_unique_ids() -> Result<(), anyhow::Error> {
        let (svc, _) = service();
        let session = svc.start_session("Q").await?;

        let a = svc.add_contribution(&session.id, "Des parcs", Some("rêve".into())).await?;
        let b = svc.add_contribution(&session.id, "Moins de bruit", None).await?;
        assert_ne!(a.id, b.id);
        assert!(NOTE_COLORS.contains(&a.color.as_str()));
        assert!((-5.0..5.0).contains(&a.rotation));

        let notes = svc.load_contributions(&session.id).await;
        assert_eq!(notes, vec![a.clone(), b]);
        assert_eq!(notes[0].category.as_deref(), Some("rêve"));
        Ok(())
    }

    #[tokio::test]
    async fn move_clear_and_reset() -> Result<(), anyhow::Error> {
        let (svc, store) = service();
        let session = svc.start_session("Q").await?;
        let note = svc.add_contribution(&session.id, "note", None).await?;

        assert!(svc.move_contribution(&session.id, note.id, 120.0, 33.0).await?);
        let moved = &svc.load_contributions(&session.id).await[0];
        assert_eq!((moved.x, moved.y), (100.0, 33.0));
        assert!(!svc.move_contribution(&session.id, note.id + 1, 1.0, 1.0).await?);

        svc.clear_board(&session.id).await?;
        assert!(svc.load_contributions(&session.id).await.is_empty());

        svc.reset_session().await?;
        assert_eq!(svc.load_session().await, None);
        // reset twice is fine
        svc.reset_session().await?;
        assert!(store.get(&contributions_key(&session.id)).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_records_degrade_to_defaults() -> Result<(), anyhow::Error> {
        let (svc, store) = service();
        store.set(CURRENT_SESSION_KEY, "not json").await?;
        store.set(&contributions_key("s"), "{\"oops\":1}").await?;
        assert_eq!(svc.load_session().await, None);
        assert!(svc.load_contributions("s").await.is_empty());

        let broken = WhiteboardService::new(Arc::new(BrokenStore));
        assert_eq!(broken.load_session().await, None);
        assert!(broken.load_contributions("s").await.is_empty());
        assert!(matches!(broken.start_session("Q").await, Err(ServiceError::Store(StoreError::Backend(_)))));
        Ok(())
    }

    fn note_with_id(id: u64) -> Contribution {
        Contribution {
            id,
            text: String::new(),
            color: String::new(),
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            category: None,
            ai_theme: None,
            ai_score: None,
        }
    }

    #[test]
    fn next_id_never_repeats() {
        assert_eq!(next_id(&[note_with_id(u64::MAX - 1)]).ok(), Some(u64::MAX));
        assert!(matches!(next_id(&[note_with_id(u64::MAX)]), Err(ServiceError::Validation(_))));
        assert!(next_id(&[]).map(|id| id > 1_600_000_000_000).unwrap_or(false));
    }

    #[tokio::test]
    async fn exhausted_ids_reject_instead_of_panicking() -> Result<(), anyhow::Error> {
        let (svc, store) = service();
        let stored = serde_json::to_string(&[note_with_id(u64::MAX)])?;
        store.set(&contributions_key("s"), &stored).await?;

        let res = svc.add_contribution("s", "new", None).await;
        assert!(matches!(res, Err(ServiceError::Validation(_))));
        assert_eq!(store.get(&contributions_key("s")).await?.map(|e| e.value), Some(stored));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_list_is_never_overwritten() -> Result<(), anyhow::Error> {
        let (svc, store) = service();
        let key = contributions_key("s");
        // rotation written as a string by another client
        let foreign = r##"[{"id":1,"text":"old","color":"#FFE5B4","x":10,"y":10,"rotation":"0"}]"##;
        store.set(&key, foreign).await?;

        let added = svc.add_contribution("s", "new", None).await;
        assert!(matches!(added, Err(ServiceError::Store(StoreError::Serialization(_)))));
        let moved = svc.move_contribution("s", 1, 50.0, 50.0).await;
        assert!(matches!(moved, Err(ServiceError::Store(StoreError::Serialization(_)))));

        assert_eq!(store.get(&key).await?.map(|e| e.value).as_deref(), Some(foreign));
        // display reads still degrade
        assert!(svc.load_contributions("s").await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_backend_fails_writes_that_need_the_list() {
        let broken = WhiteboardService::new(Arc::new(BrokenStore));
        assert!(matches!(
            broken.add_contribution("s", "new", None).await,
            Err(ServiceError::Store(StoreError::Backend(_)))
        ));
        assert!(matches!(
            broken.move_contribution("s", 1, 1.0, 1.0).await,
            Err(ServiceError::Store(StoreError::Backend(_)))
        ));
    }
}
