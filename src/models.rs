use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Roles ---

/// Role
///
/// The closed set of access levels. Each variant carries a distinct power-of-two
/// value which is the encoding used on the wire (JSON integer) and in the
/// `users.role_id` column. Values are only ever compared for equality or
/// membership in an allow-list; no two roles are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
#[repr(i32)]
pub enum Role {
    #[default]
    None = 0,
    Admin = 1 << 0,
    SubAdmin = 1 << 1,
    TrustedHelper = 1 << 2,
    LimitedHelper = 1 << 3,
    Applicant = 1 << 4,
}

/// Returned when a stored or submitted role value is not one of the known bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown role value {0}")]
pub struct UnknownRole(pub i32);

impl Role {
    pub const ALL: [Role; 6] = [
        Role::None,
        Role::Admin,
        Role::SubAdmin,
        Role::TrustedHelper,
        Role::LimitedHelper,
        Role::Applicant,
    ];

    /// The encoded bit value of this role.
    pub const fn bits(self) -> i32 {
        self as i32
    }

    pub fn from_bits(bits: i32) -> Option<Role> {
        Role::ALL.into_iter().find(|role| role.bits() == bits)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::None => "none",
            Role::Admin => "admin",
            Role::SubAdmin => "subAdmin",
            Role::TrustedHelper => "trustedHelper",
            Role::LimitedHelper => "limitedHelper",
            Role::Applicant => "applicant",
        }
    }
}

impl From<Role> for i32 {
    fn from(role: Role) -> i32 {
        role.bits()
    }
}

impl TryFrom<i32> for Role {
    type Error = UnknownRole;

    fn try_from(bits: i32) -> Result<Self, Self::Error> {
        Role::from_bits(bits).ok_or(UnknownRole(bits))
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Application workflow vocabularies ---

/// ApplicationStatus
///
/// The review states an application moves through. Stored as text in
/// `applications.status`; new applications start as `Received`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplicationStatus {
    #[default]
    Received,
    Confirmed,
    InVerification,
    Verified,
    WaitingForResponse,
    Rejected,
    Accepted,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 7] = [
        ApplicationStatus::Received,
        ApplicationStatus::Confirmed,
        ApplicationStatus::InVerification,
        ApplicationStatus::Verified,
        ApplicationStatus::WaitingForResponse,
        ApplicationStatus::Rejected,
        ApplicationStatus::Accepted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::Received => "received",
            ApplicationStatus::Confirmed => "confirmed",
            ApplicationStatus::InVerification => "inVerification",
            ApplicationStatus::Verified => "verified",
            ApplicationStatus::WaitingForResponse => "waitingForResponse",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Accepted => "accepted",
        }
    }

    pub fn parse(value: &str) -> Option<ApplicationStatus> {
        ApplicationStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
    }
}

/// Education levels by id, as accepted in `educationLevel`.
pub const EDUCATION_LEVELS: [&str; 5] = ["none", "elementary", "secondary", "associate", "bachelor"];

pub fn education_level_name(id: i32) -> Option<&'static str> {
    usize::try_from(id)
        .ok()
        .and_then(|index| EDUCATION_LEVELS.get(index).copied())
}

// --- Core records (persistence side) ---

/// User
///
/// The canonical account record. It holds the password hash and is therefore
/// never serialized; outbound responses use [`PublicUser`].
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub role: Role,
}

impl User {
    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            created_at: self.created_at,
            role: self.role,
        }
    }
}

/// A user that has not been assigned an id yet.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub role: Role,
}

/// Token
///
/// An opaque session handle. `value` is unique among live tokens; a token whose
/// `expires` has passed is treated as absent by the authenticator even while it
/// is still stored.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Token {
    pub user_id: i64,
    pub value: String,
    pub expires: DateTime<Utc>,
}

/// Application
///
/// One applicant's submission, as stored. Each user owns at most one.
#[derive(Debug, Clone, PartialEq, FromRow, Default)]
pub struct Application {
    pub id: i64,
    pub user_id: i64,
    pub birthday: Option<NaiveDate>,
    pub phone: String,
    pub nationality: String,
    pub country: String,
    pub city: String,
    pub zip: String,
    pub address: String,
    pub address_extra: String,
    pub survey_data: String,
    pub gender: String,
    pub education_level: i32,
    pub status: String,
    pub blocked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub edited_at: DateTime<Utc>,
}

/// An application that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewApplication {
    pub user_id: i64,
    pub birthday: Option<NaiveDate>,
    pub phone: String,
    pub nationality: String,
    pub country: String,
    pub city: String,
    pub zip: String,
    pub address: String,
    pub address_extra: String,
    pub survey_data: String,
    pub gender: String,
    pub education_level: i32,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
}

/// Comment
///
/// A reviewer (or applicant) note attached to an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    pub application_id: i64,
    pub user_id: i64,
    pub contents: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub application_id: i64,
    pub user_id: i64,
    pub contents: String,
    pub created_at: DateTime<Utc>,
}

// --- Request payloads ---

/// LoginRequest
///
/// Missing fields deserialize as empty strings so the handler can answer with
/// a 400 validation error rather than a body-parsing rejection.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(default)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// CreateUserRequest
///
/// Public registration payload (POST /users). Accounts created this way are
/// always applicants.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(default, rename_all = "camelCase")]
#[ts(export)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// AdminCreateUserRequest
///
/// Administrative account creation (POST /admin/users) with an explicit role.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AdminCreateUserRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[ts(type = "number")]
    #[schema(value_type = i32)]
    pub role: Role,
}

impl AdminCreateUserRequest {
    pub fn into_parts(self) -> (CreateUserRequest, Role) {
        let request = CreateUserRequest {
            email: self.email,
            password: self.password,
            first_name: self.first_name,
            last_name: self.last_name,
        };
        (request, self.role)
    }
}

/// CreateApplicationRequest
///
/// Payload for POST /users/{user_id}/application.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(default, rename_all = "camelCase")]
#[ts(export)]
pub struct CreateApplicationRequest {
    #[ts(type = "string | null")]
    pub birthday: Option<NaiveDate>,
    pub phone: String,
    pub nationality: String,
    pub address: String,
    pub address_extra: String,
    pub zip: String,
    pub city: String,
    pub country: String,
    pub survey_data: String,
    pub gender: String,
    pub education_level: i32,
}

impl CreateApplicationRequest {
    pub fn into_new_application(self, user_id: i64, now: DateTime<Utc>) -> NewApplication {
        NewApplication {
            user_id,
            birthday: self.birthday,
            phone: self.phone,
            nationality: self.nationality,
            country: self.country,
            city: self.city,
            zip: self.zip,
            address: self.address,
            address_extra: self.address_extra,
            survey_data: self.survey_data,
            gender: self.gender,
            education_level: self.education_level,
            status: ApplicationStatus::Received,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub contents: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateStatusRequest {
    #[serde(default)]
    pub status: String,
}

// --- Response payloads ---

/// PublicUser
///
/// The outbound projection of a [`User`]. It has no password hash field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PublicUser {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "number")]
    #[schema(value_type = i32)]
    pub role: Role,
}

/// LoginResult
///
/// The identity summary returned alongside a fresh token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LoginResult {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[ts(type = "number")]
    #[schema(value_type = i32)]
    pub role: Role,
}

impl From<&User> for LoginResult {
    fn from(user: &User) -> Self {
        LoginResult {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub token_expiry_seconds: i64,
    pub result: LoginResult,
}

/// ApplicationView
///
/// The outbound projection of an [`Application`], enriched with the owner's
/// name. This is the record the redactor operates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ApplicationView {
    pub id: i64,
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    #[ts(type = "string | null")]
    pub birthday: Option<NaiveDate>,
    pub phone: String,
    pub nationality: String,
    pub address: String,
    pub address_extra: String,
    pub zip: String,
    pub city: String,
    pub country: String,
    pub survey_data: String,
    pub gender: String,
    pub education_level: i32,
    pub status: String,
    #[ts(type = "string | null")]
    pub blocked_until: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub edited_at: DateTime<Utc>,
}

impl ApplicationView {
    /// Builds the view from the stored record and its owner. An application
    /// whose owner can no longer be resolved keeps empty name fields.
    pub fn new(application: Application, owner: Option<&User>) -> Self {
        let (first_name, last_name) = owner
            .map(|user| (user.first_name.clone(), user.last_name.clone()))
            .unwrap_or_default();

        ApplicationView {
            id: application.id,
            user_id: application.user_id,
            first_name,
            last_name,
            birthday: application.birthday,
            phone: application.phone,
            nationality: application.nationality,
            address: application.address,
            address_extra: application.address_extra,
            zip: application.zip,
            city: application.city,
            country: application.country,
            survey_data: application.survey_data,
            gender: application.gender,
            education_level: application.education_level,
            status: application.status,
            blocked_until: application.blocked_until,
            created_at: application.created_at,
            edited_at: application.edited_at,
        }
    }
}
