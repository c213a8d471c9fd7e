//! The global announcement banner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

pub const MIN_CONTENT_LEN: usize = 10;
pub const MAX_CONTENT_LEN: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub id: Uuid,
    pub content: String,
    pub is_visible: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Announcement {
    /// Text to show on the dashboard, if any.
    pub fn banner(&self) -> Option<&str> {
        let content = self.content.trim();
        if self.is_visible && !content.is_empty() {
            Some(content)
        } else {
            None
        }
    }
}

/// Validated announcement contents, ready to be saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementDraft {
    content: String,
    is_visible: bool,
}

impl AnnouncementDraft {
    pub fn new(content: &str, is_visible: bool) -> Result<Self> {
        let content = content.trim();
        let len = content.chars().count();
        if len < MIN_CONTENT_LEN {
            return Err(Error::InvalidArgument(format!(
                "announcement must be at least {MIN_CONTENT_LEN} characters"
            )));
        }
        if len > MAX_CONTENT_LEN {
            return Err(Error::InvalidArgument(format!(
                "announcement must not exceed {MAX_CONTENT_LEN} characters"
            )));
        }
        Ok(Self {
            content: content.to_string(),
            is_visible,
        })
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_visible(&self) -> bool {
        self.is_visible
    }

    /// Merge into the existing row, keeping its id and creation time.
    pub fn apply(self, existing: Option<&Announcement>, now: DateTime<Utc>) -> Announcement {
        match existing {
            Some(current) => Announcement {
                id: current.id,
                content: self.content,
                is_visible: self.is_visible,
                created_at: current.created_at,
                updated_at: now,
            },
            None => Announcement {
                id: Uuid::new_v4(),
                content: self.content,
                is_visible: self.is_visible,
                created_at: now,
                updated_at: now,
            },
        }
    }
}
