use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::models::{TeachingAssignment, UserProfile};
use crate::db::types::UserRole;
use crate::services::accounts::{ProfileChanges, Registration};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SignupRequest {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub(crate) name: String,
    #[validate(email(message = "Invalid email address"))]
    pub(crate) email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters long"))]
    pub(crate) password: String,
    #[serde(default = "default_user_role")]
    pub(crate) role: UserRole,
    #[validate(length(min = 1, message = "school must not be empty"))]
    pub(crate) school: String,
    #[serde(default)]
    pub(crate) grade: Option<String>,
    #[serde(default)]
    pub(crate) class: Option<String>,
    #[serde(default)]
    pub(crate) assignments: Vec<TeachingAssignment>,
}

impl SignupRequest {
    pub(crate) fn into_registration(self) -> Registration {
        Registration {
            name: self.name,
            email: self.email,
            password: self.password,
            role: self.role,
            school: self.school,
            grade: self.grade,
            class: self.class,
            assignments: self.assignments,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AdminSignupRequest {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub(crate) name: String,
    #[validate(email(message = "Invalid email address"))]
    pub(crate) email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters long"))]
    pub(crate) password: String,
    #[serde(alias = "adminSecret")]
    pub(crate) admin_secret: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub(crate) email: String,
    #[validate(length(min = 1, message = "password must not be empty"))]
    pub(crate) password: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct ProfileUpdate {
    #[serde(default)]
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) school: Option<String>,
    #[serde(default)]
    pub(crate) grade: Option<String>,
    #[serde(default)]
    pub(crate) class: Option<String>,
    #[serde(default)]
    pub(crate) assignments: Option<Vec<TeachingAssignment>>,
}

impl From<ProfileUpdate> for ProfileChanges {
    fn from(update: ProfileUpdate) -> Self {
        Self {
            name: update.name,
            school: update.school,
            grade: update.grade,
            class: update.class,
            assignments: update.assignments,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserListQuery {
    #[serde(default)]
    pub(crate) role: Option<UserRole>,
    #[serde(default)]
    pub(crate) search: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UserResponse {
    pub(crate) uid: String,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) role: UserRole,
    pub(crate) school: String,
    pub(crate) grade: Option<String>,
    pub(crate) class: Option<String>,
    pub(crate) classroom_id: Option<String>,
    pub(crate) assignments: Vec<TeachingAssignment>,
}

impl UserResponse {
    pub(crate) fn from_profile(profile: UserProfile) -> Self {
        Self {
            classroom_id: profile.classroom_id(),
            uid: profile.uid,
            name: profile.name,
            email: profile.email,
            role: profile.role,
            school: profile.school,
            grade: profile.grade,
            class: profile.class,
            assignments: profile.assignments,
        }
    }
}

fn default_user_role() -> UserRole {
    UserRole::Student
}
