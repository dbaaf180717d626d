use crate::optimizer::analysis::region_isolation::primitives::Element;
use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// The lattice position of an isolation.
/// Ordering matters: `merge` keeps the greater kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum IsolationKind {
    Unknown,
    Disconnected,
    Task,
    Actor,

    // Two actor isolations that disagree were merged together.
    // Absorbs everything and never matches any other isolation.
    Conflicting,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ActorIsolation {
    GlobalActor(String),
    ActorInstance(Element),
}

impl Display for ActorIsolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ActorIsolation::GlobalActor(name) => write!(f, "global actor '{name}'"),
            ActorIsolation::ActorInstance(element) => write!(f, "actor instance {element}"),
        }
    }
}

/// The concurrency domain of a value or an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IsolationInfo {
    kind: IsolationKind,

    // Only set for Actor isolation.
    // None means the value is derived from an actor, but which actor is not known.
    actor_isolation: Option<ActorIsolation>,

    // The value the isolation was derived from, when there is one
    isolated_value: Option<Element>,
}

impl Default for IsolationInfo {
    fn default() -> Self {
        IsolationInfo::unknown()
    }
}

impl IsolationInfo {
    fn with_kind(kind: IsolationKind) -> Self {
        IsolationInfo {
            kind,
            actor_isolation: None,
            isolated_value: None,
        }
    }

    pub fn unknown() -> Self {
        IsolationInfo::with_kind(IsolationKind::Unknown)
    }

    pub fn disconnected() -> Self {
        IsolationInfo::with_kind(IsolationKind::Disconnected)
    }

    pub fn task_isolated(isolated_value: Option<Element>) -> Self {
        IsolationInfo {
            kind: IsolationKind::Task,
            actor_isolation: None,
            isolated_value,
        }
    }

    pub fn actor_isolated(isolation: ActorIsolation, isolated_value: Option<Element>) -> Self {
        IsolationInfo {
            kind: IsolationKind::Actor,
            actor_isolation: Some(isolation),
            isolated_value,
        }
    }

    pub fn global_actor(name: impl Into<String>) -> Self {
        IsolationInfo::actor_isolated(ActorIsolation::GlobalActor(name.into()), None)
    }

    /// Isolation of a value that came out of an actor without a known descriptor.
    pub fn actor_derived(isolated_value: Element) -> Self {
        IsolationInfo {
            kind: IsolationKind::Actor,
            actor_isolation: None,
            isolated_value: Some(isolated_value),
        }
    }

    pub fn conflicting() -> Self {
        IsolationInfo::with_kind(IsolationKind::Conflicting)
    }

    pub fn kind(&self) -> IsolationKind {
        self.kind
    }

    pub fn actor_isolation(&self) -> Option<&ActorIsolation> {
        self.actor_isolation.as_ref()
    }

    pub fn isolated_value(&self) -> Option<Element> {
        self.isolated_value
    }

    pub fn is_known(&self) -> bool {
        self.kind != IsolationKind::Unknown
    }

    pub fn is_disconnected(&self) -> bool {
        self.kind == IsolationKind::Disconnected
    }

    pub fn is_task_isolated(&self) -> bool {
        self.kind == IsolationKind::Task
    }

    pub fn is_actor_isolated(&self) -> bool {
        self.kind == IsolationKind::Actor
    }

    pub fn is_conflicting(&self) -> bool {
        self.kind == IsolationKind::Conflicting
    }

    /// Join in the isolation lattice.
    /// `Unknown` is the identity, `Conflicting` absorbs everything,
    /// and two actor isolations that are not the same produce `Conflicting`.
    pub fn merge(&self, other: &IsolationInfo) -> IsolationInfo {
        if self.is_conflicting() || other.is_conflicting() {
            return IsolationInfo::conflicting();
        }

        if self.is_actor_isolated() && other.is_actor_isolated() && !self.has_same_isolation(other)
        {
            return IsolationInfo::conflicting();
        }

        if other.kind < self.kind {
            return self.clone();
        }

        other.clone()
    }

    /// Whether two isolations describe the same concurrency domain.
    /// Looser than `==`: the isolated value only matters for task isolation.
    pub fn has_same_isolation(&self, other: &IsolationInfo) -> bool {
        if self.kind != other.kind {
            return false;
        }

        match self.kind {
            IsolationKind::Unknown | IsolationKind::Disconnected => true,
            IsolationKind::Task => self.isolated_value == other.isolated_value,
            IsolationKind::Actor => match (&self.actor_isolation, &other.actor_isolation) {
                (Some(lhs), Some(rhs)) => lhs == rhs,
                _ => false,
            },
            IsolationKind::Conflicting => false,
        }
    }

    pub fn has_same_actor_isolation(&self, isolation: &ActorIsolation) -> bool {
        self.is_actor_isolated() && self.actor_isolation.as_ref() == Some(isolation)
    }

    pub fn describe_for_diagnostics(&self) -> String {
        match self.kind {
            IsolationKind::Unknown => String::from("unknown"),
            IsolationKind::Disconnected => String::from("disconnected"),
            IsolationKind::Task => String::from("task-isolated"),
            IsolationKind::Actor => match &self.actor_isolation {
                Some(ActorIsolation::GlobalActor(name)) => {
                    format!("global actor '{name}'-isolated")
                }
                Some(ActorIsolation::ActorInstance(_)) | None => String::from("actor-isolated"),
            },
            IsolationKind::Conflicting => String::from("conflicting isolation"),
        }
    }
}

impl Display for IsolationInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            IsolationKind::Unknown => write!(f, "unknown"),
            IsolationKind::Disconnected => write!(f, "disconnected"),
            IsolationKind::Task => match self.isolated_value {
                Some(value) => write!(f, "task-isolated ({value})"),
                None => write!(f, "task-isolated"),
            },
            IsolationKind::Actor => match &self.actor_isolation {
                Some(isolation) => write!(f, "actor-isolated to {isolation}"),
                None => write!(f, "actor-derived"),
            },
            IsolationKind::Conflicting => write!(f, "conflicting"),
        }
    }
}
