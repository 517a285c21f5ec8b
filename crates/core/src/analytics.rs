#![forbid(unsafe_code)]

//! Usage events and the aggregates shown on the admin dashboard.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use time::OffsetDateTime;

pub const ANONYMOUS_USER: &str = "anonymous";
pub const DASHBOARD_WINDOW_MS: i64 = 30 * DAY_MS;
pub const ACTIVE_WINDOW_MS: i64 = DAY_MS;
pub const RECENT_EVENTS: usize = 10;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionStart,
    SessionEnd,
    LoginSuccess,
    LogoutSuccess,
    #[serde(rename = "node_submitted")]
    NodeSubmit,
    #[serde(rename = "node_deleted")]
    NodeDelete,
    #[serde(rename = "node_moved")]
    NodeMove,
    TypeCreated,
    TypeDeleted,
    #[serde(other)]
    Other,
}

/// Stored fields of one event document (`events` collection).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub user_id: String,
    pub session_id: String,
    pub timestamp: i64,
    #[serde(default)]
    pub data: Value,
}

impl EventRecord {
    pub fn is_anonymous(&self) -> bool {
        self.user_id == ANONYMOUS_USER
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub total_users: usize,
    pub total_goals: usize,
    pub active_users: usize,
    pub anonymous_goals: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: String,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub metrics: Metrics,
    pub daily_goals: Vec<DailyCount>,
    pub recent: Vec<EventRecord>,
}

/// Aggregates events from the last 30 days relative to `now_ms`.
pub fn dashboard(events: &[EventRecord], now_ms: i64) -> Dashboard {
    let window_start = now_ms.saturating_sub(DASHBOARD_WINDOW_MS);
    let mut in_window: Vec<&EventRecord> = events
        .iter()
        .filter(|event| event.timestamp >= window_start)
        .collect();
    in_window.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    Dashboard {
        metrics: metrics(&in_window, now_ms),
        daily_goals: daily_goals(&in_window),
        recent: in_window
            .iter()
            .take(RECENT_EVENTS)
            .map(|event| (*event).clone())
            .collect(),
    }
}

fn metrics(events: &[&EventRecord], now_ms: i64) -> Metrics {
    let users: BTreeSet<&str> = events
        .iter()
        .filter(|event| !event.is_anonymous())
        .map(|event| event.user_id.as_str())
        .collect();
    let goals: Vec<&&EventRecord> = events
        .iter()
        .filter(|event| event.kind == EventKind::NodeSubmit)
        .collect();
    let active_since = now_ms.saturating_sub(ACTIVE_WINDOW_MS);
    // Anonymous visitors share one id and count as one active user.
    let active: BTreeSet<&str> = events
        .iter()
        .filter(|event| event.timestamp > active_since)
        .map(|event| event.user_id.as_str())
        .collect();

    Metrics {
        total_users: users.len(),
        total_goals: goals.len(),
        active_users: active.len(),
        anonymous_goals: goals.iter().filter(|event| event.is_anonymous()).count(),
    }
}

fn daily_goals(events: &[&EventRecord]) -> Vec<DailyCount> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for event in events.iter().filter(|e| e.kind == EventKind::NodeSubmit) {
        *counts.entry(utc_date(event.timestamp)).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(date, count)| DailyCount { date, count })
        .collect()
}

/// `YYYY-MM-DD` of a millisecond timestamp, in UTC.
pub fn utc_date(ts_ms: i64) -> String {
    let nanos = (ts_ms as i128) * 1_000_000i128;
    let date = OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
        .date();
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}
