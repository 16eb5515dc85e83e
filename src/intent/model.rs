//! External model capability for intents no rule understands
//!
//! The model receives the raw text plus a description of the module catalog
//! and answers with free text that should contain a JSON array of steps.

use async_trait::async_trait;
use serde_json::Deserializer;
use tracing::debug;

use crate::intent::rules::{ActionPlan, ActionStep};

/// Maps free text plus a catalog description to a raw response
#[async_trait]
pub trait IntentModel: Send + Sync {
    async fn complete(&self, text: &str, catalog_description: &str) -> anyhow::Result<String>;
}

/// Extract the first well-formed JSON array of steps from a model response
///
/// Each `[` is tried in turn as the start of an array; text around the
/// array (prose, code fences) is ignored. Returns `None` when no candidate
/// parses as a list of steps.
pub fn parse_action_list(response: &str) -> Option<ActionPlan> {
    for (start, _) in response.match_indices('[') {
        let mut stream = Deserializer::from_str(&response[start..]).into_iter::<Vec<ActionStep>>();
        match stream.next() {
            Some(Ok(steps)) => return Some(steps),
            Some(Err(e)) => debug!("No action list at offset {}: {}", start, e),
            None => {}
        }
    }
    None
}
