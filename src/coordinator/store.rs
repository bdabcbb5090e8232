use std::collections::HashMap;

use super::application::{AllocationRequest, Application};

/// Applications keyed by id, in the order the backend first listed them
///
/// The full list and the per-repo views are derived from the same map,
/// so patching one application updates every view it appears in.
#[derive(Debug, Default)]
pub struct ApplicationStore {
    by_id: HashMap<String, Application>,
    order: Vec<String>,
}

impl ApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a single application; other entries are untouched
    pub fn upsert(&mut self, application: Application) {
        if !self.by_id.contains_key(&application.id) {
            self.order.push(application.id.clone());
        }
        self.by_id.insert(application.id.clone(), application);
    }

    pub fn replace_all(&mut self, applications: Vec<Application>) {
        self.by_id.clear();
        self.order.clear();
        for app in applications {
            self.upsert(app);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Application> {
        self.by_id.get(id)
    }

    pub fn all(&self) -> Vec<&Application> {
        self.order.iter().filter_map(|id| self.by_id.get(id)).collect()
    }

    pub fn by_repo(&self, owner: &str, repo: &str) -> Vec<&Application> {
        self.all()
            .into_iter()
            .filter(|app| app.owner == owner && app.repo == repo)
            .collect()
    }

    pub fn active_request(&self, id: &str) -> Option<&AllocationRequest> {
        self.get(id).and_then(Application::active_request)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
