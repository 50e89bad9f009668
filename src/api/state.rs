use std::ops::Deref;

use derive_new::new;

use crate::database::Store;
use crate::service::ProgressService;

/// Shared handler state.
#[derive(Debug, Clone, new)]
pub struct App<S> {
    pub progress: ProgressService<S>,
}

impl<S> Deref for App<S> {
    type Target = ProgressService<S>;

    fn deref(&self) -> &Self::Target {
        &self.progress
    }
}

pub fn create_app<S: Store>(store: S) -> App<S> {
    App::new(ProgressService::new(store))
}
