use super::{ComponentState, SortcamOrchestrator};
use std::collections::HashMap;
use tracing::debug;

impl SortcamOrchestrator {
    pub async fn set_component_state(&self, component: &str, state: ComponentState) {
        let mut states = self.component_states.lock().await;
        states.insert(component.to_string(), state);
        debug!("Component '{}' state changed to: {:?}", component, state);
    }

    pub async fn get_component_state(&self, component: &str) -> Option<ComponentState> {
        let states = self.component_states.lock().await;
        states.get(component).copied()
    }

    pub async fn get_all_component_states(&self) -> HashMap<String, ComponentState> {
        let states = self.component_states.lock().await;
        states.clone()
    }
}
