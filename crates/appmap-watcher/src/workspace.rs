//! Per-folder service fan-out.
//!
//! A [`WorkspaceService`] knows how to create one instance of itself for a
//! workspace folder. [`WorkspaceServices`] keeps the list of enrolled
//! services and open folders and makes sure every service has exactly one
//! instance per folder: enrolling a service creates instances for the folders
//! already open, adding a folder creates an instance of every service, and
//! removing a folder disposes and forgets all of its instances.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::WatcherError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WorkspaceFolder {
    pub name: String,
    pub path: PathBuf,
}

impl WorkspaceFolder {
    /// Folder named after the last component of `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { name, path }
    }
}

#[async_trait]
pub trait WorkspaceService: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create(
        &self,
        folder: &WorkspaceFolder,
    ) -> Result<Box<dyn WorkspaceServiceInstance>, WatcherError>;
}

pub trait WorkspaceServiceInstance: Send + Sync {
    fn folder(&self) -> &WorkspaceFolder;

    /// Release everything the instance holds. Called once, before the
    /// instance is dropped.
    fn dispose(&mut self);
}

struct Enrolled {
    service: &'static str,
    instance: Box<dyn WorkspaceServiceInstance>,
}

#[derive(Default)]
pub struct WorkspaceServices {
    services: Vec<Arc<dyn WorkspaceService>>,
    folders: Vec<WorkspaceFolder>,
    instances: HashMap<PathBuf, Vec<Enrolled>>,
}

impl WorkspaceServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn folders(&self) -> &[WorkspaceFolder] {
        &self.folders
    }

    /// Names of the services with a live instance for `folder`, in
    /// enrollment order.
    pub fn instances(&self, folder: &Path) -> Vec<&'static str> {
        self.instances
            .get(folder)
            .map(|list| list.iter().map(|e| e.service).collect())
            .unwrap_or_default()
    }

    /// Add `service` and create its instance for every open folder. Returns
    /// how many instances were created; failures are logged and skipped.
    pub async fn enroll(&mut self, service: Arc<dyn WorkspaceService>) -> usize {
        let folders = self.folders.clone();
        let mut created = 0;
        for folder in &folders {
            if self.create_instance(service.as_ref(), folder).await {
                created += 1;
            }
        }
        self.services.push(service);
        created
    }

    /// Open `folder` and create an instance of every enrolled service for it.
    pub async fn folder_added(&mut self, folder: WorkspaceFolder) {
        if self.folders.iter().any(|f| f.path == folder.path) {
            tracing::debug!(folder = %folder.path.display(), "folder already open");
            return;
        }
        self.folders.push(folder.clone());
        let services = self.services.clone();
        for service in &services {
            self.create_instance(service.as_ref(), &folder).await;
        }
    }

    /// Close the folder at `path`, disposing every instance created for it.
    pub fn folder_removed(&mut self, path: &Path) {
        self.folders.retain(|f| f.path != path);
        let Some(instances) = self.instances.remove(path) else {
            return;
        };
        for mut enrolled in instances {
            tracing::debug!(folder = %path.display(), service = enrolled.service, "disposing service instance");
            enrolled.instance.dispose();
        }
    }

    /// Dispose every instance of every folder.
    pub fn dispose(&mut self) {
        let paths: Vec<PathBuf> = self.folders.iter().map(|f| f.path.clone()).collect();
        for path in paths {
            self.folder_removed(&path);
        }
        self.services.clear();
    }

    async fn create_instance(&mut self, service: &dyn WorkspaceService, folder: &WorkspaceFolder) -> bool {
        match service.create(folder).await {
            Ok(instance) => {
                self.instances
                    .entry(folder.path.clone())
                    .or_default()
                    .push(Enrolled {
                        service: service.name(),
                        instance,
                    });
                true
            }
            Err(e) => {
                tracing::warn!(
                    folder = %folder.path.display(),
                    service = service.name(),
                    "failed to start service: {e}"
                );
                false
            }
        }
    }
}

impl Drop for WorkspaceServices {
    fn drop(&mut self) {
        self.dispose();
    }
}
