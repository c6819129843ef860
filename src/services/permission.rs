//! Permission service

use crate::db::repositories::PermissionRepository;
use crate::models::{FieldError, Permission, PermissionInput};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum PermissionServiceError {
    #[error("Invalid input data")]
    Validation(Vec<FieldError>),

    #[error("Permission '{0}' already exists.")]
    NameTaken(String),

    #[error("Permission not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub struct PermissionService {
    repo: Arc<dyn PermissionRepository>,
}

impl PermissionService {
    pub fn new(repo: Arc<dyn PermissionRepository>) -> Self {
        Self { repo }
    }

    pub async fn create(&self, input: PermissionInput) -> Result<Permission, PermissionServiceError> {
        input.validate().map_err(PermissionServiceError::Validation)?;
        let name = input.name.trim();
        if self.repo.get_by_name(name).await?.is_some() {
            return Err(PermissionServiceError::NameTaken(name.to_string()));
        }
        Ok(self.repo.create(&input).await?)
    }

    pub async fn list(&self) -> Result<Vec<Permission>, PermissionServiceError> {
        Ok(self.repo.list().await?)
    }

    pub async fn get(&self, id: i64) -> Result<Permission, PermissionServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or(PermissionServiceError::NotFound)
    }

    pub async fn update(
        &self,
        id: i64,
        input: PermissionInput,
    ) -> Result<Permission, PermissionServiceError> {
        input.validate().map_err(PermissionServiceError::Validation)?;
        let name = input.name.trim();
        if let Some(existing) = self.repo.get_by_name(name).await? {
            if existing.id != id {
                return Err(PermissionServiceError::NameTaken(name.to_string()));
            }
        }
        self.repo
            .update(id, &input)
            .await?
            .ok_or(PermissionServiceError::NotFound)
    }

    pub async fn delete(&self, id: i64) -> Result<(), PermissionServiceError> {
        if self.repo.delete(id).await? {
            Ok(())
        } else {
            Err(PermissionServiceError::NotFound)
        }
    }

    pub async fn count(&self) -> Result<i64, PermissionServiceError> {
        Ok(self.repo.count().await?)
    }
}
