//! Reconciliation of a parsed listing against the watch list.
//!
//! This is the only place that decides what a container's state means.

use dockwatch_types::{current_timestamp_ms, ContainerState, ContainerStatus, StatusSnapshot};

use crate::invoker::InvokeError;
use crate::parser::ParsedState;

/// The runtime's wording for a running container.
pub const RUNNING: &str = "running";

/// Classify one watched name against the listing.
///
/// Absent → `NotFound`, `"running"` → `Running`, anything else → `Stopped`.
pub fn classify(name: &str, parsed: &ParsedState) -> ContainerStatus {
    match parsed.get(name) {
        None => ContainerStatus::new(name, ContainerState::NotFound, ""),
        Some(RUNNING) => ContainerStatus::new(name, ContainerState::Running, RUNNING),
        Some(other) => ContainerStatus::new(name, ContainerState::Stopped, other),
    }
}

/// Build a snapshot with one item per watched name, in watch-list order.
///
/// # Example
///
/// ```
/// use dockwatch::parser::parse;
/// use dockwatch::reconcile::reconcile;
///
/// let watch_list = vec!["a".to_string(), "b".to_string()];
/// let snapshot = reconcile(&watch_list, &parse("a\trunning\n"));
///
/// assert_eq!(snapshot.len(), 2);
/// assert!(!snapshot.aggregate_healthy()); // b is not listed
/// ```
pub fn reconcile(watch_list: &[String], parsed: &ParsedState) -> StatusSnapshot {
    reconcile_at(current_timestamp_ms(), watch_list, parsed)
}

/// [`reconcile`] with an explicit timestamp. Identical inputs always yield
/// identical snapshots.
pub fn reconcile_at(timestamp_ms: u64, watch_list: &[String], parsed: &ParsedState) -> StatusSnapshot {
    let items = watch_list
        .iter()
        .map(|name| classify(name, parsed))
        .collect();
    StatusSnapshot::from_items(timestamp_ms, items)
}

/// Snapshot for a poll whose command failed: no items, never healthy.
pub fn error_snapshot(error: &InvokeError) -> StatusSnapshot {
    StatusSnapshot::failed(current_timestamp_ms(), error.to_error_info())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use dockwatch_types::ErrorKind;

    fn list(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn items_follow_watch_list_order_and_length() {
        let parsed = parse("c\trunning\na\texited\nz\trunning\n");
        let watch_list = list(&["a", "b", "c"]);

        let snapshot = reconcile(&watch_list, &parsed);

        let names: Vec<&str> = snapshot.items().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn classification_rules() {
        let parsed = parse("web\trunning\ndb\texited\ncache\tpaused\nbare\n");

        assert_eq!(classify("web", &parsed).state, ContainerState::Running);
        assert_eq!(classify("db", &parsed).state, ContainerState::Stopped);
        assert_eq!(classify("db", &parsed).raw_state, "exited");
        assert_eq!(classify("cache", &parsed).state, ContainerState::Stopped);
        assert_eq!(classify("bare", &parsed).state, ContainerState::Stopped);
        assert_eq!(classify("ghost", &parsed).state, ContainerState::NotFound);
    }

    #[test]
    fn running_match_is_exact() {
        let parsed = parse("web\tRunning\n");
        assert_eq!(classify("web", &parsed).state, ContainerState::Stopped);
    }

    #[test]
    fn missing_name_makes_aggregate_unhealthy() {
        let snapshot = reconcile(&list(&["a", "b"]), &parse("a\trunning\n"));

        assert!(!snapshot.aggregate_healthy());
        assert_eq!(snapshot.get("b").map(|i| i.state), Some(ContainerState::NotFound));
    }

    #[test]
    fn all_running_is_healthy() {
        let snapshot = reconcile(&list(&["web"]), &parse("web\trunning\n"));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.items()[0].name, "web");
        assert_eq!(snapshot.items()[0].state, ContainerState::Running);
        assert!(snapshot.aggregate_healthy());
        assert!(snapshot.error().is_none());
    }

    #[test]
    fn reconcile_is_deterministic() {
        let parsed = parse("web\trunning\ndb\texited\n");
        let watch_list = list(&["db", "web", "missing"]);

        assert_eq!(
            reconcile_at(42, &watch_list, &parsed),
            reconcile_at(42, &watch_list, &parsed)
        );
    }

    #[test]
    fn empty_watch_list_is_healthy() {
        let snapshot = reconcile(&[], &parse("web\texited\n"));
        assert!(snapshot.is_empty());
        assert!(snapshot.aggregate_healthy());
    }

    #[test]
    fn error_snapshot_is_empty_and_unhealthy() {
        let error = InvokeError::LaunchFailed {
            program: "docker".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
        };

        let snapshot = error_snapshot(&error);

        assert!(snapshot.is_empty());
        assert!(!snapshot.aggregate_healthy());
        let info = snapshot.error().unwrap();
        assert_eq!(info.kind, ErrorKind::LaunchFailed);
        assert!(info.message.contains("docker"));
    }
}
