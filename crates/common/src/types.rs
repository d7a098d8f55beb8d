//! Common types used across PeerMatch
//!
//! This module provides the fundamental domain types used by the
//! matchmaking core: users, their preferences, matches and the
//! per-user queue state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Longest accepted user id
pub const MAX_USER_ID_LEN: usize = 128;

/// Longest accepted topic name
pub const MAX_TOPIC_LEN: usize = 64;

// ============================================================================
// User Id
// ============================================================================

/// Identifier of a user waiting to be matched
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Parse and validate a user id received from outside the core
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidUserId("user id must not be empty".to_string()));
        }
        if trimmed.len() > MAX_USER_ID_LEN {
            return Err(Error::InvalidUserId(format!(
                "user id longer than {} characters",
                MAX_USER_ID_LEN
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Difficulty
// ============================================================================

/// Difficulty level a user wants to practise at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Difficulty {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(Error::InvalidDifficulty(s.to_string())),
        }
    }
}

// ============================================================================
// Topic Set
// ============================================================================

/// Validated, de-duplicated set of topic names
///
/// Topics are trimmed; blank or overlong names are rejected. Ordering is
/// lexicographic so the set serializes deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct TopicSet(BTreeSet<String>);

impl TopicSet {
    /// Build a topic set, validating every entry
    pub fn new<I, S>(topics: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for topic in topics {
            let raw: String = topic.into();
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(Error::invalid_topic(raw, "topic must not be blank"));
            }
            if trimmed.len() > MAX_TOPIC_LEN {
                return Err(Error::invalid_topic(
                    raw.clone(),
                    format!("topic longer than {} characters", MAX_TOPIC_LEN),
                ));
            }
            set.insert(trimmed.to_string());
        }
        Ok(Self(set))
    }

    /// Number of topics
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no topics are set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check membership
    pub fn contains(&self, topic: &str) -> bool {
        self.0.contains(topic)
    }

    /// Iterate topics in order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of topics shared with another set
    pub fn overlap(&self, other: &TopicSet) -> usize {
        self.0.intersection(&other.0).count()
    }

    /// Topics as an owned vector
    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl TryFrom<Vec<String>> for TopicSet {
    type Error = Error;

    fn try_from(topics: Vec<String>) -> Result<Self> {
        TopicSet::new(topics)
    }
}

impl From<TopicSet> for Vec<String> {
    fn from(set: TopicSet) -> Self {
        set.0.into_iter().collect()
    }
}

// ============================================================================
// User Preference
// ============================================================================

/// A user's matching preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreference {
    pub user_id: UserId,
    pub topics: TopicSet,
    pub difficulty: Difficulty,
}

impl UserPreference {
    /// Create a preference from already validated parts
    pub fn new(user_id: UserId, topics: TopicSet, difficulty: Difficulty) -> Self {
        Self {
            user_id,
            topics,
            difficulty,
        }
    }

    /// Whether two users may be paired.
    ///
    /// Only difficulty gates pairing; topics are informational.
    pub fn is_compatible_with(&self, other: &UserPreference) -> bool {
        self.difficulty == other.difficulty
    }

    /// Number of shared topics with another user
    pub fn topic_overlap(&self, other: &UserPreference) -> usize {
        self.topics.overlap(&other.topics)
    }
}

/// Loosely-typed preference update as received at the API boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceInput {
    #[serde(default)]
    pub topics: Vec<String>,
    pub difficulty: String,
}

impl PreferenceInput {
    /// Create a new input
    pub fn new<I, S>(topics: I, difficulty: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: topics.into_iter().map(Into::into).collect(),
            difficulty: difficulty.into(),
        }
    }

    /// Validate into a typed preference for the given user
    pub fn into_preference(self, user_id: UserId) -> Result<UserPreference> {
        let difficulty = self.difficulty.parse::<Difficulty>()?;
        let topics = TopicSet::new(self.topics)?;
        Ok(UserPreference::new(user_id, topics, difficulty))
    }
}

// ============================================================================
// Match
// ============================================================================

/// Lifecycle status of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Recorded durably, workspace not yet provisioned
    Pending,
    /// Workspace provisioned, users notified
    Active,
    /// Cleared or rolled back
    Cancelled,
}

impl MatchStatus {
    /// Parse from the stored representation
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(MatchStatus::Pending),
            "active" => Some(MatchStatus::Active),
            "cancelled" => Some(MatchStatus::Cancelled),
            _ => None,
        }
    }

    /// Stored representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
            MatchStatus::Active => "active",
            MatchStatus::Cancelled => "cancelled",
        }
    }

    /// Pending and active matches hold their users
    pub fn is_live(&self) -> bool {
        matches!(self, MatchStatus::Pending | MatchStatus::Active)
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pairing of two users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub match_id: Uuid,
    pub user1_id: UserId,
    pub user2_id: UserId,
    pub status: MatchStatus,
    /// Provisioned workspace id, set once the match is active
    #[serde(default)]
    pub workspace_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Match {
    /// Create a pending match for two users
    pub fn pending(match_id: Uuid, user1_id: UserId, user2_id: UserId) -> Self {
        Self {
            match_id,
            user1_id,
            user2_id,
            status: MatchStatus::Pending,
            workspace_ref: None,
            created_at: Utc::now(),
        }
    }

    /// Both members, in creation order
    pub fn users(&self) -> [&UserId; 2] {
        [&self.user1_id, &self.user2_id]
    }

    /// Check whether the user is a member
    pub fn involves(&self, user_id: &UserId) -> bool {
        &self.user1_id == user_id || &self.user2_id == user_id
    }

    /// The other member, if `user_id` is a member
    pub fn partner_of(&self, user_id: &UserId) -> Option<&UserId> {
        if &self.user1_id == user_id {
            Some(&self.user2_id)
        } else if &self.user2_id == user_id {
            Some(&self.user1_id)
        } else {
            None
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == MatchStatus::Active
    }
}

/// Reference used to clear matches: a single match or every match of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRef {
    Match(Uuid),
    User(UserId),
}

impl std::fmt::Display for MatchRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchRef::Match(id) => write!(f, "{}", id),
            MatchRef::User(user) => write!(f, "user:{}", user),
        }
    }
}

impl From<Uuid> for MatchRef {
    fn from(id: Uuid) -> Self {
        MatchRef::Match(id)
    }
}

impl From<UserId> for MatchRef {
    fn from(user: UserId) -> Self {
        MatchRef::User(user)
    }
}

// ============================================================================
// User State
// ============================================================================

/// Per-user matchmaking state kept alongside queue membership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    /// Not waiting and not matched
    #[default]
    Idle,
    /// Waiting in the queue
    Queued,
    /// Claimed by an in-flight match attempt
    Matching,
    /// Member of an active match
    Matched,
}

impl UserState {
    /// Users in this state may be proposed by a pairing pass
    pub fn is_pairable(&self) -> bool {
        matches!(self, UserState::Queued)
    }
}

impl std::fmt::Display for UserState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserState::Idle => write!(f, "idle"),
            UserState::Queued => write!(f, "queued"),
            UserState::Matching => write!(f, "matching"),
            UserState::Matched => write!(f, "matched"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_parse() {
        assert_eq!(UserId::parse("  user123 ").unwrap().as_str(), "user123");
        assert!(UserId::parse("   ").is_err());
        assert!(UserId::parse(&"x".repeat(MAX_USER_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_difficulty_from_str() {
        assert_eq!("easy".parse::<Difficulty>(), Ok(Difficulty::Easy));
        assert_eq!("Medium".parse::<Difficulty>(), Ok(Difficulty::Medium));
        assert_eq!(" HARD ".parse::<Difficulty>(), Ok(Difficulty::Hard));
        assert_eq!(
            "expert".parse::<Difficulty>(),
            Err(Error::InvalidDifficulty("expert".to_string()))
        );
    }

    #[test]
    fn test_difficulty_rejected_on_deserialize() {
        let json = r#"{"user_id":"u1","topics":["arrays"],"difficulty":"insane"}"#;
        assert!(serde_json::from_str::<UserPreference>(json).is_err());
    }

    #[test]
    fn test_topic_set_dedupes_and_trims() {
        let topics = TopicSet::new(["arrays", " arrays ", "strings"]).unwrap();
        assert_eq!(topics.len(), 2);
        assert!(topics.contains("arrays"));
        assert_eq!(topics.to_vec(), vec!["arrays".to_string(), "strings".to_string()]);
    }

    #[test]
    fn test_topic_set_rejects_blank() {
        assert!(TopicSet::new(["arrays", "  "]).is_err());
    }

    #[test]
    fn test_compatibility_ignores_topics() {
        let a = UserPreference::new(
            "a".into(),
            TopicSet::new(["graphs"]).unwrap(),
            Difficulty::Easy,
        );
        let b = UserPreference::new(
            "b".into(),
            TopicSet::new(["strings"]).unwrap(),
            Difficulty::Easy,
        );
        let c = UserPreference::new(
            "c".into(),
            TopicSet::new(["graphs"]).unwrap(),
            Difficulty::Hard,
        );

        assert!(a.is_compatible_with(&b));
        assert_eq!(a.topic_overlap(&b), 0);
        assert!(!a.is_compatible_with(&c));
        assert_eq!(a.topic_overlap(&c), 1);
    }

    #[test]
    fn test_preference_input_validation() {
        let pref = PreferenceInput::new(["graphs", "trees"], "hard")
            .into_preference("user123".into())
            .unwrap();
        assert_eq!(pref.difficulty, Difficulty::Hard);
        assert_eq!(pref.topics.len(), 2);

        let err = PreferenceInput::new(["graphs"], "legendary")
            .into_preference("user123".into())
            .unwrap_err();
        assert_eq!(err, Error::InvalidDifficulty("legendary".to_string()));
    }

    #[test]
    fn test_match_members() {
        let m = Match::pending(Uuid::new_v4(), "u1".into(), "u2".into());
        assert!(m.involves(&"u1".into()));
        assert!(!m.involves(&"u3".into()));
        assert_eq!(m.partner_of(&"u2".into()), Some(&UserId::from("u1")));
        assert!(m.status.is_live());
        assert!(!m.is_active());
    }

    #[test]
    fn test_match_status_parse() {
        assert_eq!(MatchStatus::parse("ACTIVE"), Some(MatchStatus::Active));
        assert_eq!(MatchStatus::parse("unknown"), None);
        assert!(!MatchStatus::Cancelled.is_live());
    }
}
