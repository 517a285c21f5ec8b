#![forbid(unsafe_code)]

use boost_core::UserId;
use boost_core::analytics::{ANONYMOUS_USER, EventKind, EventRecord};
use boost_core::paths::CollectionPath;
use boost_storage::{DocumentStore, now_ms};
use serde_json::Value;
use std::rc::Rc;

/// Best-effort usage log in the shared `events` collection.
pub struct EventLog {
    store: Rc<dyn DocumentStore>,
    session_id: String,
    enabled: bool,
}

impl EventLog {
    pub fn new(store: Rc<dyn DocumentStore>) -> Self {
        Self {
            store,
            session_id: uuid::Uuid::new_v4().to_string(),
            enabled: true,
        }
    }

    pub fn disabled(store: Rc<dyn DocumentStore>) -> Self {
        Self {
            enabled: false,
            ..Self::new(store)
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn record(&self, user: Option<&UserId>, kind: EventKind, data: Value) {
        if !self.enabled {
            return;
        }
        let record = EventRecord {
            kind,
            user_id: user.map_or(ANONYMOUS_USER, UserId::as_str).to_string(),
            session_id: self.session_id.clone(),
            timestamp: now_ms(),
            data,
        };
        let fields = match serde_json::to_value(&record) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => return,
            Err(err) => {
                tracing::warn!(error = %err, "event encode failed");
                return;
            }
        };
        if let Err(err) = self.store.create_document(&CollectionPath::events(), fields) {
            tracing::warn!(event = ?kind, error = %err, "event not recorded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boost_storage::{MemoryStore, Operation};
    use serde_json::json;

    #[test]
    fn records_anonymous_and_signed_in_events() {
        let store = Rc::new(MemoryStore::new());
        let log = EventLog::new(store.clone());
        let user = UserId::try_new("u1").unwrap();

        log.record(None, EventKind::SessionStart, Value::Null);
        log.record(Some(&user), EventKind::NodeSubmit, json!({"type": "goals"}));

        let docs = store.documents(&CollectionPath::events());
        assert_eq!(docs.len(), 2);
        let first: EventRecord = serde_json::from_value(Value::Object(docs[0].fields.clone())).unwrap();
        assert_eq!(first.user_id, ANONYMOUS_USER);
        assert_eq!(first.session_id, log.session_id());
        assert_eq!(docs[1].fields.get("type"), Some(&json!("node_submitted")));
        assert_eq!(docs[1].fields.get("userId"), Some(&json!("u1")));
    }

    #[test]
    fn store_failures_are_swallowed() {
        let store = Rc::new(MemoryStore::new());
        store.fail_next(Operation::Create, 1);
        let log = EventLog::new(store.clone());
        log.record(None, EventKind::SessionStart, Value::Null);
        assert!(store.documents(&CollectionPath::events()).is_empty());
    }
}
