use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The generation of an artifact. Bumped whenever the shape of an event type or aggregate root
/// changes in a way the Runtime has to tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(u32);

impl Generation {
    pub const FIRST: Generation = Generation(1);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl Default for Generation {
    fn default() -> Self {
        Self::FIRST
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventTypeId(Uuid);

impl EventTypeId {
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for EventTypeId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for EventTypeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl fmt::Display for EventTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier of an aggregate root type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AggregateRootId(Uuid);

impl AggregateRootId {
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for AggregateRootId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for AggregateRootId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl fmt::Display for AggregateRootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An event type as known by the Runtime: its id, generation and an optional human readable alias.
///
/// Two event types are equal when id and generation match. The alias is informational only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventType {
    id: EventTypeId,
    generation: Generation,
    alias: Option<String>,
}

impl EventType {
    pub fn new(id: impl Into<EventTypeId>) -> Self {
        Self {
            id: id.into(),
            generation: Generation::FIRST,
            alias: None,
        }
    }

    pub fn with_generation(self, generation: Generation) -> Self {
        Self { generation, ..self }
    }

    pub fn with_alias(self, alias: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            ..self
        }
    }

    pub const fn id(&self) -> EventTypeId {
        self.id
    }

    pub const fn generation(&self) -> Generation {
        self.generation
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.generation == other.generation
    }
}

impl Eq for EventType {}

impl Hash for EventType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.generation.hash(state);
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} [{}:{}]", alias, self.id, self.generation),
            None => write!(f, "[{}:{}]", self.id, self.generation),
        }
    }
}

/// Names a class of aggregate roots for the Runtime.
///
/// Like [`EventType`], equality ignores the alias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateRootType {
    id: AggregateRootId,
    generation: Generation,
    alias: Option<String>,
}

impl AggregateRootType {
    pub fn new(id: impl Into<AggregateRootId>) -> Self {
        Self {
            id: id.into(),
            generation: Generation::FIRST,
            alias: None,
        }
    }

    pub fn with_generation(self, generation: Generation) -> Self {
        Self { generation, ..self }
    }

    pub fn with_alias(self, alias: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            ..self
        }
    }

    pub const fn id(&self) -> AggregateRootId {
        self.id
    }

    pub const fn generation(&self) -> Generation {
        self.generation
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }
}

impl PartialEq for AggregateRootType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.generation == other.generation
    }
}

impl Eq for AggregateRootType {}

impl Hash for AggregateRootType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.generation.hash(state);
    }
}

impl fmt::Display for AggregateRootType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} [{}:{}]", alias, self.id, self.generation),
            None => write!(f, "[{}:{}]", self.id, self.generation),
        }
    }
}

/// Identifies the entity whose event stream is being replayed, e.g. `customer-42`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventSourceId(String);

impl EventSourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh event source id backed by a random uuid.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EventSourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EventSourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<Uuid> for EventSourceId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for EventSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Number of events ever applied to an aggregate root instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AggregateRootVersion(u64);

impl AggregateRootVersion {
    pub const INITIAL: AggregateRootVersion = AggregateRootVersion(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// The version `count` events ago, or `None` if that would go below [`Self::INITIAL`].
    pub fn checked_rewind(&self, count: usize) -> Option<Self> {
        let count = u64::try_from(count).ok()?;
        self.0.checked_sub(count).map(Self)
    }
}

impl fmt::Display for AggregateRootVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a committed event in the Runtime's event log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventLogSequenceNumber(u64);

impl EventLogSequenceNumber {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventLogSequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
