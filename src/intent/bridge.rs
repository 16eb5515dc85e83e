//! Intent bridge: free text to executed action plans
//!
//! Rules are tried most specific first; the first rule whose plan only
//! targets registered modules wins. Without one, an optional external model
//! is consulted. Plans execute strictly in order through
//! [`ModuleManager::call`], so every step is permission-checked and audited.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::IntentConfig;
use crate::intent::model::{parse_action_list, IntentModel};
use crate::intent::rules::{default_rules, sort_rules, ActionPlan, ActionStep, CatalogView, IntentRule};
use crate::module::api::events::EventType;
use crate::module::manager::ModuleManager;
use crate::module::traits::ORCHESTRATOR_IDENTITY;

const EVENT_SOURCE: &str = "intent-bridge";

/// Outcome of turning text into a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResult {
    pub success: bool,
    pub plan: ActionPlan,
    /// Step-by-step description on success, the reason on failure
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_response: Option<String>,
}

/// Outcome of one executed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub step_id: usize,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Turns free text into call sequences against a [`ModuleManager`]
pub struct IntentBridge {
    manager: Arc<ModuleManager>,
    rules: RwLock<Vec<IntentRule>>,
    model: Option<Arc<dyn IntentModel>>,
    model_fallback: bool,
    caller: String,
}

impl IntentBridge {
    /// Bridge with the built-in rules, calling as the orchestrator
    pub fn new(manager: Arc<ModuleManager>) -> Self {
        Self {
            manager,
            rules: RwLock::new(default_rules()),
            model: None,
            model_fallback: true,
            caller: ORCHESTRATOR_IDENTITY.to_string(),
        }
    }

    pub fn with_config(manager: Arc<ModuleManager>, config: &IntentConfig) -> Self {
        let mut bridge = Self::new(manager);
        bridge.model_fallback = config.model_fallback;
        bridge
    }

    /// Consult `model` when no rule yields a plan
    pub fn with_model(mut self, model: Arc<dyn IntentModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Issue plan calls under `caller` instead of the orchestrator identity
    pub fn with_caller(mut self, caller: &str) -> Self {
        self.caller = caller.to_string();
        self
    }

    pub fn add_rule(&self, rule: IntentRule) {
        let mut rules = self.rules.write().unwrap_or_else(|e| e.into_inner());
        rules.push(rule);
        sort_rules(&mut rules);
    }

    pub fn clear_rules(&self) {
        self.rules.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Patterns in evaluation order
    pub fn rules(&self) -> Vec<String> {
        self.rules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|r| r.pattern().to_string())
            .collect()
    }

    /// Turn `text` into a plan without executing it
    pub async fn process_intent(&self, text: &str) -> IntentResult {
        let catalog = CatalogView::from_manifests(self.manager.manifests().await);
        let rules = self.rules.read().unwrap_or_else(|e| e.into_inner()).clone();

        for rule in &rules {
            let Some(plan) = rule.apply(text, &catalog) else {
                continue;
            };
            if plan.is_empty() {
                debug!("Rule {} produced an empty plan", rule.pattern());
                continue;
            }
            if let Some(step) = plan.iter().find(|s| !catalog.has_module(&s.module)) {
                debug!(
                    "Rule {} targets unregistered module {}",
                    rule.pattern(),
                    step.module
                );
                continue;
            }
            info!("Intent matched rule {}", rule.pattern());
            return Self::accepted(plan);
        }

        if let Some(plan) = self.ask_model(text, &catalog).await {
            info!("Intent planned by external model ({} steps)", plan.len());
            return Self::accepted(plan);
        }

        let names = catalog.module_names();
        let available = if names.is_empty() {
            "none".to_string()
        } else {
            names.join(", ")
        };
        warn!("No plan for intent: {}", text);
        IntentResult {
            success: false,
            plan: Vec::new(),
            explanation: format!(
                "Could not map \"{}\" to any action. Available modules: {}",
                text, available
            ),
            suggested_response: Some(
                "Sorry, I didn't understand that. Try something like \"open order 123\"."
                    .to_string(),
            ),
        }
    }

    async fn ask_model(&self, text: &str, catalog: &CatalogView) -> Option<ActionPlan> {
        if !self.model_fallback {
            return None;
        }
        let model = self.model.as_ref()?;
        match model.complete(text, &catalog.describe()).await {
            Ok(response) => parse_action_list(&response).filter(|plan| !plan.is_empty()),
            Err(e) => {
                warn!("External model failed: {}", e);
                None
            }
        }
    }

    fn accepted(mut plan: ActionPlan) -> IntentResult {
        for (index, step) in plan.iter_mut().enumerate() {
            step.id = index + 1;
        }
        let explanation = describe_plan(&plan);
        let suggested_response = Some(match plan.as_slice() {
            [only] if !only.description.is_empty() => format!("{}.", only.description),
            _ => format!("Running {} steps.", plan.len()),
        });
        IntentResult {
            success: true,
            plan,
            explanation,
            suggested_response,
        }
    }

    /// Execute steps in order; stops after a failed `wait_for` step
    pub async fn execute_plan(&self, plan: &[ActionStep]) -> Vec<ActionResult> {
        let events = self.manager.events();
        events.emit(
            EventType::PlanStart,
            EVENT_SOURCE,
            json!({ "steps": plan.len(), "caller": self.caller }),
        );

        let mut results = Vec::with_capacity(plan.len());
        for step in plan {
            let started = Instant::now();
            let outcome = self
                .manager
                .call(&step.module, &step.method, step.args.clone(), Some(&self.caller))
                .await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let result = match outcome {
                Ok(value) => ActionResult {
                    step_id: step.id,
                    success: true,
                    result: Some(value),
                    error: None,
                    duration_ms,
                },
                Err(e) => ActionResult {
                    step_id: step.id,
                    success: false,
                    result: None,
                    error: Some(e.to_string()),
                    duration_ms,
                },
            };
            debug!(
                "Step {} {} -> {}",
                step.id,
                step.call_signature(),
                if result.success { "ok" } else { "failed" }
            );
            events.emit(
                EventType::PlanStep,
                EVENT_SOURCE,
                serde_json::to_value(&result).unwrap_or(Value::Null),
            );

            let halt = !result.success && step.wait_for;
            let error = result.error.clone();
            results.push(result);
            if halt {
                warn!("Plan halted at step {}: {:?}", step.id, error);
                events.emit(
                    EventType::PlanError,
                    EVENT_SOURCE,
                    json!({ "stepId": step.id, "error": error }),
                );
                return results;
            }
        }

        events.emit(
            EventType::PlanComplete,
            EVENT_SOURCE,
            json!({
                "steps": results.len(),
                "failed": results.iter().filter(|r| !r.success).count(),
            }),
        );
        results
    }

    /// Plan and execute `text`; empty when no plan could be made
    pub async fn execute_intent(&self, text: &str) -> Vec<ActionResult> {
        let intent = self.process_intent(text).await;
        if !intent.success || intent.plan.is_empty() {
            return Vec::new();
        }
        self.execute_plan(&intent.plan).await
    }
}

/// Numbered, human-readable plan description
pub fn describe_plan(plan: &[ActionStep]) -> String {
    plan.iter()
        .map(|step| {
            let mut line = format!("{}. {}", step.id, step.call_signature());
            if !step.description.is_empty() {
                line.push_str(" - ");
                line.push_str(&step.description);
            }
            if step.wait_for {
                line.push_str(" (required)");
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
