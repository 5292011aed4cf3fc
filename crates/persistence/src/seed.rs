//! Fixture seeding for local runs.

use std::path::Path;

use domain::models::{Endpoint, Project};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::repositories::{InMemoryEndpointRepository, InMemoryProjectRepository};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse seed file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("endpoint {endpoint} references unknown project {project}")]
    UnknownProject {
        endpoint: uuid::Uuid,
        project: uuid::Uuid,
    },
}

/// Projects and endpoints to preload.
#[derive(Debug, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl SeedData {
    pub fn from_json(json: &str) -> Result<Self, SeedError> {
        let data: SeedData = serde_json::from_str(json)?;
        data.check_references()?;
        Ok(data)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    fn check_references(&self) -> Result<(), SeedError> {
        for endpoint in &self.endpoints {
            if !self.projects.iter().any(|p| p.id == endpoint.project_id) {
                return Err(SeedError::UnknownProject {
                    endpoint: endpoint.id,
                    project: endpoint.project_id,
                });
            }
        }
        Ok(())
    }

    /// Loads every record into the given repositories.
    pub async fn apply(
        self,
        projects: &InMemoryProjectRepository,
        endpoints: &InMemoryEndpointRepository,
    ) {
        let (project_count, endpoint_count) = (self.projects.len(), self.endpoints.len());
        for project in self.projects {
            projects.insert(project).await;
        }
        for endpoint in self.endpoints {
            endpoints.insert(endpoint).await;
        }
        info!(projects = project_count, endpoints = endpoint_count, "Seed data loaded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::EndpointStatus;
    use domain::repositories::{EndpointRepository, ProjectRepository};
    use uuid::Uuid;

    fn fixture(project_id: Uuid, endpoint_project: Uuid) -> String {
        serde_json::json!({
            "projects": [{
                "id": project_id,
                "name": "acme",
                "config": { "retry": { "strategy": "linear", "retry_count": 3, "duration": 10 } },
                "created_at": "2024-01-01T00:00:00Z"
            }],
            "endpoints": [{
                "id": Uuid::new_v4(),
                "project_id": endpoint_project,
                "url": "https://example.com/hook",
                "name": "main",
                "status": "active",
                "event_types": ["*"],
                "created_at": "2024-01-01T00:00:00Z",
                "updated_at": "2024-01-01T00:00:00Z"
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_seed_applies_records() {
        let project_id = Uuid::new_v4();
        let data = SeedData::from_json(&fixture(project_id, project_id)).unwrap();

        let projects = InMemoryProjectRepository::new();
        let endpoints = InMemoryEndpointRepository::new();
        data.apply(&projects, &endpoints).await;

        let project = projects.find_by_id(project_id).await.unwrap().unwrap();
        assert!(project.retry_config().is_ok());
        let seeded = endpoints.find_by_project(project_id).await.unwrap();
        assert_eq!(seeded.len(), 1);
        assert_eq!(seeded[0].status, EndpointStatus::Active);
    }

    #[test]
    fn test_seed_rejects_dangling_endpoint() {
        let result = SeedData::from_json(&fixture(Uuid::new_v4(), Uuid::new_v4()));
        assert!(matches!(result, Err(SeedError::UnknownProject { .. })));
    }

    #[test]
    fn test_seed_missing_file() {
        let result = SeedData::from_file("/nonexistent/seed.json");
        assert!(matches!(result, Err(SeedError::Io { .. })));
    }
}
