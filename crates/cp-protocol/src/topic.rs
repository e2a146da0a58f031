//! Broker topic names.
//!
//! Destinations must match the server byte for byte.

use std::fmt;

/// Legacy multiplexed topic carrying every update kind.
pub const LEGACY_GROUP_UPDATES: &str = "/topic/group-updates";

/// Payload carried by a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKind {
    Checkpoint,
    GroupStatus,
    HelpQueue,
    /// Multiplexed by payload shape; delivered undecoded.
    Legacy,
}

/// A broker destination together with the kind of payload it carries.
///
/// Builders format ids verbatim. An empty id or one containing `/` yields a
/// destination that [`Topic::parse`] rejects; check with [`Topic::is_valid_id`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    destination: String,
    kind: TopicKind,
}

impl Topic {
    /// Whether `id` can be used as a lab or group id in a destination.
    pub fn is_valid_id(id: &str) -> bool {
        !id.is_empty() && !id.contains('/')
    }

    pub fn legacy() -> Self {
        Self::new(LEGACY_GROUP_UPDATES.to_string(), TopicKind::Legacy)
    }

    pub fn lab_checkpoints(lab_id: &str) -> Self {
        Self::new(format!("/topic/labs/{}/checkpoints", lab_id), TopicKind::Checkpoint)
    }

    pub fn lab_groups(lab_id: &str) -> Self {
        Self::new(format!("/topic/labs/{}/groups", lab_id), TopicKind::GroupStatus)
    }

    pub fn lab_help_queue(lab_id: &str) -> Self {
        Self::new(format!("/topic/labs/{}/help-queue", lab_id), TopicKind::HelpQueue)
    }

    pub fn group_checkpoints(group_id: &str) -> Self {
        Self::new(
            format!("/topic/groups/{}/checkpoints", group_id),
            TopicKind::Checkpoint,
        )
    }

    pub fn group_status(group_id: &str) -> Self {
        Self::new(format!("/topic/groups/{}/status", group_id), TopicKind::GroupStatus)
    }

    pub fn group_help_queue(group_id: &str) -> Self {
        Self::new(
            format!("/topic/groups/{}/help-queue", group_id),
            TopicKind::HelpQueue,
        )
    }

    /// The three lab-scoped topics: checkpoints, groups, help queue.
    pub fn lab(lab_id: &str) -> [Topic; 3] {
        [
            Self::lab_checkpoints(lab_id),
            Self::lab_groups(lab_id),
            Self::lab_help_queue(lab_id),
        ]
    }

    /// The three group-scoped topics: checkpoints, status, help queue.
    pub fn group(group_id: &str) -> [Topic; 3] {
        [
            Self::group_checkpoints(group_id),
            Self::group_status(group_id),
            Self::group_help_queue(group_id),
        ]
    }

    /// Recognize a known destination. Returns `None` for anything else,
    /// including empty or nested ids.
    pub fn parse(destination: &str) -> Option<Topic> {
        if destination == LEGACY_GROUP_UPDATES {
            return Some(Self::legacy());
        }
        let rest = destination.strip_prefix("/topic/")?;
        let mut parts = rest.split('/');
        let (scope, id, channel) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || !Self::is_valid_id(id) {
            return None;
        }
        match (scope, channel) {
            ("labs", "checkpoints") => Some(Self::lab_checkpoints(id)),
            ("labs", "groups") => Some(Self::lab_groups(id)),
            ("labs", "help-queue") => Some(Self::lab_help_queue(id)),
            ("groups", "checkpoints") => Some(Self::group_checkpoints(id)),
            ("groups", "status") => Some(Self::group_status(id)),
            ("groups", "help-queue") => Some(Self::group_help_queue(id)),
            _ => None,
        }
    }

    fn new(destination: String, kind: TopicKind) -> Self {
        Self { destination, kind }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn kind(&self) -> TopicKind {
        self.kind
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names() {
        let [cp, groups, help] = Topic::lab("L1");
        assert_eq!(cp.destination(), "/topic/labs/L1/checkpoints");
        assert_eq!(groups.destination(), "/topic/labs/L1/groups");
        assert_eq!(help.destination(), "/topic/labs/L1/help-queue");
        assert_eq!(groups.kind(), TopicKind::GroupStatus);

        let [cp, status, help] = Topic::group("g1");
        assert_eq!(cp.destination(), "/topic/groups/g1/checkpoints");
        assert_eq!(status.destination(), "/topic/groups/g1/status");
        assert_eq!(help.destination(), "/topic/groups/g1/help-queue");
        assert_eq!(help.kind(), TopicKind::HelpQueue);

        assert_eq!(Topic::legacy().destination(), "/topic/group-updates");
        assert_eq!(Topic::legacy().kind(), TopicKind::Legacy);
    }

    #[test]
    fn test_parse_known_destinations() {
        for topic in Topic::lab("abc").into_iter().chain(Topic::group("g-9")) {
            assert_eq!(Topic::parse(topic.destination()), Some(topic.clone()));
        }
        assert_eq!(Topic::parse("/topic/group-updates"), Some(Topic::legacy()));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(Topic::parse("/queue/labs/L1/checkpoints"), None);
        assert_eq!(Topic::parse("/topic/labs//checkpoints"), None);
        assert_eq!(Topic::parse("/topic/labs/L1/checkpoints/extra"), None);
        assert_eq!(Topic::parse("/topic/labs/L1/status"), None);
        assert_eq!(Topic::parse("/topic/groups/g1"), None);
    }

    #[test]
    fn test_nested_ids_do_not_round_trip() {
        assert!(Topic::is_valid_id("g-9"));
        assert!(!Topic::is_valid_id(""));
        assert!(!Topic::is_valid_id("a/b"));
        let nested = Topic::lab_checkpoints("a/b");
        assert_eq!(nested.destination(), "/topic/labs/a/b/checkpoints");
        assert_eq!(Topic::parse(nested.destination()), None);
    }
}
