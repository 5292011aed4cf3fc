//! In-memory project repository.

use std::collections::HashMap;

use async_trait::async_trait;
use domain::models::Project;
use domain::repositories::ProjectRepository;
use domain::StoreError;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::metrics::StoreTimer;

#[derive(Default)]
pub struct InMemoryProjectRepository {
    projects: RwLock<HashMap<Uuid, Project>>,
}

impl InMemoryProjectRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, project: Project) {
        self.projects.write().await.insert(project.id, project);
    }
}

#[async_trait]
impl ProjectRepository for InMemoryProjectRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        let timer = StoreTimer::new("find_project_by_id");
        let project = self.projects.read().await.get(&id).cloned();
        timer.record();
        Ok(project)
    }
}
