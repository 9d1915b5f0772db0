//! ResumeCatalog port - read access to resume ownership.
//!
//! Resumes are owned by the editor service; billing only needs to know
//! who owns one and whether it has been bought.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ResumeId, UserId};

/// The slice of a resume that billing cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeRecord {
    pub id: ResumeId,
    pub owner: UserId,
    pub purchased: bool,
}

impl ResumeRecord {
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.owner == user_id
    }
}

#[async_trait]
pub trait ResumeCatalog: Send + Sync {
    async fn find(&self, id: &ResumeId) -> Result<Option<ResumeRecord>, DomainError>;
}
