use std::io::Write;

use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Integer;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Coarse outcome bucket for a contact attempt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Integer)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum CanvassResultCategory {
    Successful = 1,
    Unavailable = 2,
    Unreachable = 3,
}

impl CanvassResultCategory {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Result<Self, AppError> {
        match code {
            1 => Ok(Self::Successful),
            2 => Ok(Self::Unavailable),
            3 => Ok(Self::Unreachable),
            other => Err(AppError::validation(format!(
                "unknown canvass result category code: {other}"
            ))),
        }
    }
}

/// Fine-grained contact outcome. Codes match the VAN canvass result codes the
/// campaign syncs against, so they must not be renumbered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Integer)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum CanvassResult {
    UnavailableCallBack = 17,
    UnavailableLeftMessage = 19,
    UnavailableBusy = 18,
    UnreachableWrongNumber = 20,
    UnreachableDisconnected = 25,
    UnreachableRefused = 2,
    UnreachableMoved = 5,
    UnreachableDeceased = 4,
    SuccessfulCanvassed = 14,
}

impl CanvassResult {
    pub const ALL: [CanvassResult; 9] = [
        Self::UnavailableCallBack,
        Self::UnavailableLeftMessage,
        Self::UnavailableBusy,
        Self::UnreachableWrongNumber,
        Self::UnreachableDisconnected,
        Self::UnreachableRefused,
        Self::UnreachableMoved,
        Self::UnreachableDeceased,
        Self::SuccessfulCanvassed,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Result<Self, AppError> {
        Self::ALL
            .into_iter()
            .find(|result| result.code() == code)
            .ok_or_else(|| AppError::validation(format!("unknown canvass result code: {code}")))
    }

    /// Maps this result to its coarse category. Total: every result has
    /// exactly one category.
    pub fn category(self) -> CanvassResultCategory {
        match self {
            Self::UnavailableCallBack | Self::UnavailableLeftMessage | Self::UnavailableBusy => {
                CanvassResultCategory::Unavailable
            }
            Self::UnreachableWrongNumber
            | Self::UnreachableDisconnected
            | Self::UnreachableRefused
            | Self::UnreachableMoved
            | Self::UnreachableDeceased => CanvassResultCategory::Unreachable,
            Self::SuccessfulCanvassed => CanvassResultCategory::Successful,
        }
    }
}

/// Derived assignment status. Never stored; recomputed from suppression state
/// and the latest contact event on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Assigned,
    ContactedSuccessful,
    ContactedUnavailable,
    ContactedUnreachable,
    Skipped,
}

impl AssignmentStatus {
    pub fn derive(
        suppressed: bool,
        prospect_suppressed: bool,
        latest_category: Option<CanvassResultCategory>,
    ) -> Self {
        let Some(category) = latest_category else {
            return if suppressed {
                Self::Skipped
            } else {
                Self::Assigned
            };
        };

        // Assignment-level suppression without person-level suppression is a
        // manual skip, even after a non-terminal contact.
        if suppressed && !prospect_suppressed {
            return Self::Skipped;
        }

        match category {
            CanvassResultCategory::Successful => Self::ContactedSuccessful,
            CanvassResultCategory::Unavailable => Self::ContactedUnavailable,
            CanvassResultCategory::Unreachable => Self::ContactedUnreachable,
        }
    }

    pub fn is_suppressed(self) -> bool {
        matches!(self, Self::ContactedUnreachable | Self::Skipped)
    }

    pub fn result_category(self) -> Option<CanvassResultCategory> {
        match self {
            Self::Assigned | Self::Skipped => None,
            Self::ContactedSuccessful => Some(CanvassResultCategory::Successful),
            Self::ContactedUnavailable => Some(CanvassResultCategory::Unavailable),
            Self::ContactedUnreachable => Some(CanvassResultCategory::Unreachable),
        }
    }
}

impl ToSql<Integer, Pg> for CanvassResult {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(&self.code().to_be_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Integer, Pg> for CanvassResult {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let code = <i32 as FromSql<Integer, Pg>>::from_sql(bytes)?;
        Self::from_code(code).map_err(Into::into)
    }
}

impl ToSql<Integer, Pg> for CanvassResultCategory {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(&self.code().to_be_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Integer, Pg> for CanvassResultCategory {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let code = <i32 as FromSql<Integer, Pg>>::from_sql(bytes)?;
        Self::from_code(code).map_err(Into::into)
    }
}
