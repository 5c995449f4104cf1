use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum UserRole {
    Student,
    Teacher,
    Admin,
}

impl UserRole {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ContributorStatus {
    Pending,
    Accepted,
    Declined,
}

/// Whether an explanation actually took place, as marked by staff afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum CompletionStatus {
    #[default]
    #[serde(rename = "")]
    Unmarked,
    Explained,
    NotExplained,
}

impl CompletionStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Unmarked => "",
            Self::Explained => "explained",
            Self::NotExplained => "not_explained",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum ExplanationStatus {
    Upcoming,
    Finished,
}

impl ExplanationStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Upcoming => "Upcoming",
            Self::Finished => "Finished",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum PurgeTarget {
    All,
    Users,
    Schedules,
}

impl PurgeTarget {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Users => "users",
            Self::Schedules => "schedules",
        }
    }
}
