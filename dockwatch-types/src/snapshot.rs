//! StatusSnapshot - the result of one poll cycle.

use crate::{ContainerState, ContainerStatus, ErrorInfo, SCHEMA_VERSION};

/// Immutable result of one poll cycle.
///
/// Items appear in watch-list order. `aggregate_healthy` is derived from the
/// items at construction and is always false when `error` is set, so the
/// fields are only reachable through accessors.
///
/// # Example
///
/// ```rust
/// use dockwatch_types::{ContainerState, StatusSnapshot};
///
/// let snapshot = StatusSnapshot::builder()
///     .timestamp_ms(1703160000000)
///     .item("web", ContainerState::Running, "running")
///     .item("db", ContainerState::Stopped, "exited")
///     .build();
///
/// assert_eq!(snapshot.len(), 2);
/// assert!(!snapshot.aggregate_healthy());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusSnapshot {
    /// [`SCHEMA_VERSION`] of the library that built the snapshot.
    schema: u32,

    /// Unix timestamp in milliseconds when the poll completed.
    timestamp_ms: u64,

    items: Vec<ContainerStatus>,

    aggregate_healthy: bool,

    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    error: Option<ErrorInfo>,
}

impl StatusSnapshot {
    /// Snapshot of a successful poll. Healthy iff every item is running.
    pub fn from_items(timestamp_ms: u64, items: Vec<ContainerStatus>) -> Self {
        let aggregate_healthy = items.iter().all(|item| item.state.is_running());
        Self {
            schema: SCHEMA_VERSION,
            timestamp_ms,
            items,
            aggregate_healthy,
            error: None,
        }
    }

    /// Snapshot of a failed poll. Carries no items and is never healthy.
    pub fn failed(timestamp_ms: u64, error: ErrorInfo) -> Self {
        Self {
            schema: SCHEMA_VERSION,
            timestamp_ms,
            items: Vec::new(),
            aggregate_healthy: false,
            error: Some(error),
        }
    }

    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new()
    }

    pub fn schema(&self) -> u32 {
        self.schema
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn items(&self) -> &[ContainerStatus] {
        &self.items
    }

    pub fn aggregate_healthy(&self) -> bool {
        self.aggregate_healthy
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Look up a container by exact name.
    pub fn get(&self, name: &str) -> Option<&ContainerStatus> {
        self.items.iter().find(|item| item.name == name)
    }

    /// Items that are not running, in watch-list order.
    pub fn unhealthy(&self) -> impl Iterator<Item = &ContainerStatus> {
        self.items.iter().filter(|item| !item.state.is_running())
    }
}

/// Builder for constructing `StatusSnapshot` instances by hand.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    timestamp_ms: Option<u64>,
    items: Vec<ContainerStatus>,
    error: Option<ErrorInfo>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a specific timestamp (milliseconds since Unix epoch).
    pub fn timestamp_ms(mut self, ts: u64) -> Self {
        self.timestamp_ms = Some(ts);
        self
    }

    pub fn item(
        mut self,
        name: impl Into<String>,
        state: ContainerState,
        raw_state: impl Into<String>,
    ) -> Self {
        self.items.push(ContainerStatus::new(name, state, raw_state));
        self
    }

    /// Mark the snapshot as failed. Any items added are discarded.
    pub fn error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    pub fn build(self) -> StatusSnapshot {
        let timestamp_ms = self.timestamp_ms.unwrap_or_else(current_timestamp_ms);
        match self.error {
            Some(error) => StatusSnapshot::failed(timestamp_ms, error),
            None => StatusSnapshot::from_items(timestamp_ms, self.items),
        }
    }
}

/// Current timestamp in milliseconds since Unix epoch.
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn healthy_only_when_all_running() {
        let healthy = StatusSnapshot::builder()
            .item("web", ContainerState::Running, "running")
            .item("db", ContainerState::Running, "running")
            .build();
        assert!(healthy.aggregate_healthy());

        let degraded = StatusSnapshot::builder()
            .item("web", ContainerState::Running, "running")
            .item("db", ContainerState::NotFound, "")
            .build();
        assert!(!degraded.aggregate_healthy());
        assert_eq!(degraded.unhealthy().count(), 1);
    }

    #[test]
    fn empty_watch_list_is_healthy() {
        let snapshot = StatusSnapshot::from_items(0, Vec::new());
        assert!(snapshot.aggregate_healthy());
        assert!(snapshot.is_empty());
    }

    #[test]
    fn error_snapshot_has_no_items_and_is_unhealthy() {
        let snapshot = StatusSnapshot::builder()
            .item("web", ContainerState::Running, "running")
            .error(ErrorInfo::new(ErrorKind::Timeout, "docker command timed out"))
            .build();

        assert!(snapshot.is_error());
        assert!(snapshot.is_empty());
        assert!(!snapshot.aggregate_healthy());
        assert_eq!(snapshot.error().map(|e| e.kind), Some(ErrorKind::Timeout));
    }

    #[test]
    fn get_finds_by_exact_name() {
        let snapshot = StatusSnapshot::builder()
            .item("Web", ContainerState::Running, "running")
            .build();
        assert!(snapshot.get("Web").is_some());
        assert!(snapshot.get("web").is_none());
    }

    #[test]
    fn builder_uses_current_time_by_default() {
        let before = current_timestamp_ms();
        let snapshot = StatusSnapshot::builder().build();
        assert!(snapshot.timestamp_ms() >= before);
        assert_eq!(snapshot.schema(), SCHEMA_VERSION);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_roundtrip() {
        let snapshot = StatusSnapshot::builder()
            .timestamp_ms(1703160000000)
            .item("web", ContainerState::Running, "running")
            .item("db", ContainerState::Stopped, "exited")
            .build();

        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: StatusSnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(snapshot, parsed);
        assert!(!json.contains("\"error\""));
    }
}
