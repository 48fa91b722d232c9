use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::product::ProductId;
use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InteractionId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    View,
    Click,
    Search,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Click => "click",
            Self::Search => "search",
        }
    }
}

impl std::str::FromStr for InteractionKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "view" => Ok(Self::View),
            "click" => Ok(Self::Click),
            "search" => Ok(Self::Search),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown interaction kind `{other}`"
            ))),
        }
    }
}

/// Append-only behavioral event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: InteractionId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub kind: InteractionKind,
    pub occurred_at: DateTime<Utc>,
}

impl Interaction {
    pub fn new(user_id: UserId, product_id: ProductId, kind: InteractionKind) -> Self {
        Self {
            id: InteractionId(Uuid::new_v4().to_string()),
            user_id,
            product_id,
            kind,
            occurred_at: Utc::now(),
        }
    }
}
