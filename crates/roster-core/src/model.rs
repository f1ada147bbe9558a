//! HR records and lookup identifiers as they appear on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

id_newtype!(
    /// Server-assigned employee identifier.
    EmployeeId
);
id_newtype!(
    /// Employee tag identifier. Each employee holds at most one tag.
    TagId
);
id_newtype!(
    /// Identifier of any lookup entity (business function, department, unit, status, ...).
    ReferenceId
);
id_newtype!(PositionId);

// ---------------------------------------------------------------------------
// Row traits
// ---------------------------------------------------------------------------

/// A collection row with a stable selection key.
pub trait Keyed {
    type Key: Ord + Clone + fmt::Debug + Send + Sync + 'static;

    fn key(&self) -> Self::Key;
}

/// A row that carries the single tag the server allows per employee.
pub trait Tagged {
    fn current_tag(&self) -> Option<TagId>;
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: EmployeeId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub business_function: Option<ReferenceId>,
    #[serde(default)]
    pub department: Option<ReferenceId>,
    #[serde(default)]
    pub unit: Option<ReferenceId>,
    #[serde(default)]
    pub job_function: Option<ReferenceId>,
    #[serde(default)]
    pub position_group: Option<ReferenceId>,
    #[serde(default)]
    pub status: Option<ReferenceId>,
    #[serde(default)]
    pub tag: Option<TagId>,
    #[serde(default)]
    pub line_manager: Option<EmployeeId>,
}

impl Employee {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Keyed for Employee {
    type Key = EmployeeId;

    fn key(&self) -> EmployeeId {
        self.id
    }
}

impl Tagged for Employee {
    fn current_tag(&self) -> Option<TagId> {
        self.tag
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VacantPosition {
    pub id: PositionId,
    pub title: String,
    #[serde(default)]
    pub business_function: Option<ReferenceId>,
    #[serde(default)]
    pub department: Option<ReferenceId>,
    #[serde(default)]
    pub unit: Option<ReferenceId>,
    #[serde(default)]
    pub job_function: Option<ReferenceId>,
    #[serde(default)]
    pub position_group: Option<ReferenceId>,
}

impl Keyed for VacantPosition {
    type Key = PositionId;

    fn key(&self) -> PositionId {
        self.id
    }
}

/// A soft-deleted employee listed in the archive, eligible for restore or
/// permanent deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedEmployee {
    #[serde(flatten)]
    pub employee: Employee,
    #[serde(default)]
    pub archived_reason: Option<String>,
}

impl Keyed for ArchivedEmployee {
    type Key = EmployeeId;

    fn key(&self) -> EmployeeId {
        self.employee.id
    }
}

impl Tagged for ArchivedEmployee {
    fn current_tag(&self) -> Option<TagId> {
        self.employee.tag
    }
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

/// The lookup lists a form can draw from.
///
/// `Department` depends on `BusinessFunction` and `Unit` depends on
/// `Department`; every other pool is a root pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    BusinessFunction,
    Department,
    Unit,
    JobFunction,
    PositionGroup,
    EmployeeStatus,
    EmployeeTag,
}

impl PoolKind {
    pub const ALL: [Self; 7] = [
        Self::BusinessFunction,
        Self::Department,
        Self::Unit,
        Self::JobFunction,
        Self::PositionGroup,
        Self::EmployeeStatus,
        Self::EmployeeTag,
    ];

    #[must_use]
    pub const fn parent_kind(self) -> Option<Self> {
        match self {
            Self::Department => Some(Self::BusinessFunction),
            Self::Unit => Some(Self::Department),
            _ => None,
        }
    }

    #[must_use]
    pub const fn child_kind(self) -> Option<Self> {
        match self {
            Self::BusinessFunction => Some(Self::Department),
            Self::Department => Some(Self::Unit),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_root(self) -> bool {
        self.parent_kind().is_none()
    }

    /// Path segment of the lookup endpoint serving this pool.
    #[must_use]
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::BusinessFunction => "business-functions",
            Self::Department => "departments",
            Self::Unit => "units",
            Self::JobFunction => "job-functions",
            Self::PositionGroup => "position-groups",
            Self::EmployeeStatus => "employee-statuses",
            Self::EmployeeTag => "employee-tags",
        }
    }

    /// Query parameter naming the parent for dependent pools.
    #[must_use]
    pub const fn parent_param(self) -> Option<&'static str> {
        match self {
            Self::Department => Some("business_function"),
            Self::Unit => Some("department"),
            _ => None,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::BusinessFunction => "business_function",
            Self::Department => "department",
            Self::Unit => "unit",
            Self::JobFunction => "job_function",
            Self::PositionGroup => "position_group",
            Self::EmployeeStatus => "employee_status",
            Self::EmployeeTag => "employee_tag",
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a lookup list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceNode {
    pub id: ReferenceId,
    #[serde(default)]
    pub parent_id: Option<ReferenceId>,
    pub name: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

const fn default_active() -> bool {
    true
}
