//! Intent rules: case-insensitive patterns mapped to action plans

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::error;

use crate::module::registry::manifest::{MethodSignature, ModuleManifest};

/// One call in an action plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStep {
    /// Position within the plan, starting at 1
    #[serde(default)]
    pub id: usize,
    pub module: String,
    pub method: String,
    #[serde(default, alias = "params")]
    pub args: Vec<Value>,
    /// Abort the remaining plan if this step fails
    #[serde(default)]
    pub wait_for: bool,
    #[serde(default)]
    pub description: String,
}

impl ActionStep {
    pub fn new(module: &str, method: &str, args: Vec<Value>) -> Self {
        Self {
            id: 0,
            module: module.to_string(),
            method: method.to_string(),
            args,
            wait_for: false,
            description: String::new(),
        }
    }

    pub fn wait_for(mut self) -> Self {
        self.wait_for = true;
        self
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// `module.method(arg, ...)`
    pub fn call_signature(&self) -> String {
        let args: Vec<String> = self.args.iter().map(Value::to_string).collect();
        format!("{}.{}({})", self.module, self.method, args.join(", "))
    }
}

/// Ordered list of steps
pub type ActionPlan = Vec<ActionStep>;

/// Read-only view of the registered module catalog
#[derive(Debug, Clone, Default)]
pub struct CatalogView {
    modules: BTreeMap<String, ModuleManifest>,
}

impl CatalogView {
    pub fn from_manifests<I: IntoIterator<Item = ModuleManifest>>(manifests: I) -> Self {
        Self {
            modules: manifests
                .into_iter()
                .map(|m| (m.name.clone(), m))
                .collect(),
        }
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn api(&self, module: &str) -> Option<&BTreeMap<String, MethodSignature>> {
        self.modules.get(module).map(|m| &m.api)
    }

    pub fn has_method(&self, module: &str, method: &str) -> bool {
        self.api(module).is_some_and(|api| api.contains_key(method))
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Catalog description handed to an external model
    pub fn describe(&self) -> String {
        let mut out = String::from("You control these modules:\n");
        for manifest in self.modules.values() {
            out.push_str(&format!("- {}@{}\n", manifest.name, manifest.version));
            for (method, signature) in &manifest.api {
                let returns = if signature.returns.is_empty() {
                    "void"
                } else {
                    signature.returns.as_str()
                };
                out.push_str(&format!(
                    "    {}({}) -> {}\n",
                    method,
                    signature.params.join(", "),
                    returns
                ));
            }
        }
        out.push_str(
            "\nReply with a JSON array of steps, each \
             {\"module\": string, \"method\": string, \"args\": array, \
             \"waitFor\": bool, \"description\": string}.",
        );
        out
    }
}

/// Builds a plan from a rule match
pub type RuleHandler = Arc<dyn Fn(&Captures<'_>, &CatalogView) -> ActionPlan + Send + Sync>;

/// Pattern plus plan builder
#[derive(Clone)]
pub struct IntentRule {
    pattern: Regex,
    handler: RuleHandler,
}

impl IntentRule {
    /// Compile `pattern` case-insensitively
    pub fn new<F>(pattern: &str, handler: F) -> Result<Self, regex::Error>
    where
        F: Fn(&Captures<'_>, &CatalogView) -> ActionPlan + Send + Sync + 'static,
    {
        Ok(Self {
            pattern: Regex::new(&format!("(?i){}", pattern))?,
            handler: Arc::new(handler),
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Longer patterns are considered more specific
    pub fn specificity(&self) -> usize {
        self.pattern.as_str().len()
    }

    /// Run the handler if the pattern matches
    pub fn apply(&self, text: &str, catalog: &CatalogView) -> Option<ActionPlan> {
        let captures = self.pattern.captures(text)?;
        Some((self.handler)(&captures, catalog))
    }
}

impl fmt::Debug for IntentRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntentRule")
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

/// Order rules most specific first; ties keep insertion order
pub fn sort_rules(rules: &mut [IntentRule]) {
    rules.sort_by(|a, b| b.specificity().cmp(&a.specificity()));
}

fn capture<'t>(caps: &Captures<'t>, index: usize) -> Option<&'t str> {
    caps.get(index).map(|m| m.as_str())
}

/// Numeric ids become JSON numbers, anything else a string
fn order_id(raw: &str) -> Value {
    raw.parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(raw))
}

/// Authentication step prepended when an `auth` module is registered
fn auth_preamble(catalog: &CatalogView) -> ActionPlan {
    if catalog.has_module("auth") {
        vec![ActionStep::new("auth", "ensureAuthenticated", vec![])
            .wait_for()
            .describe("Make sure the user is signed in")]
    } else {
        Vec::new()
    }
}

fn open_order(id: &str) -> ActionStep {
    ActionStep::new("orders", "openOrder", vec![order_id(id)])
        .describe(&format!("Open order {}", id))
}

fn set_status(status: &str) -> ActionStep {
    let status = status.to_lowercase();
    ActionStep::new("orders", "setStatus", vec![json!(status)])
        .describe(&format!("Mark the order as {}", status))
}

fn builtin<F>(rules: &mut Vec<IntentRule>, pattern: &str, handler: F)
where
    F: Fn(&Captures<'_>, &CatalogView) -> ActionPlan + Send + Sync + 'static,
{
    match IntentRule::new(pattern, handler) {
        Ok(rule) => rules.push(rule),
        Err(e) => error!("Invalid built-in intent pattern {}: {}", pattern, e),
    }
}

/// Built-in rules for the auth, orders and analytics modules
pub fn default_rules() -> Vec<IntentRule> {
    let mut rules = Vec::new();

    builtin(
        &mut rules,
        r"\bopen\s+order\s+#?([\w-]+)\s+(?:and\s+)?(?:mark|set)\s+(?:it\s+)?(?:as\s+|to\s+)?(\w+)",
        |caps, catalog| {
            let mut plan = auth_preamble(catalog);
            if let (Some(id), Some(status)) = (capture(caps, 1), capture(caps, 2)) {
                plan.push(open_order(id).wait_for());
                plan.push(set_status(status));
            }
            plan
        },
    );
    builtin(
        &mut rules,
        r"\b(?:mark|set)\s+order\s+#?([\w-]+)\s+(?:as\s+|to\s+)?(\w+)",
        |caps, catalog| {
            let mut plan = auth_preamble(catalog);
            if let (Some(id), Some(status)) = (capture(caps, 1), capture(caps, 2)) {
                plan.push(open_order(id).wait_for());
                plan.push(set_status(status));
            }
            plan
        },
    );
    builtin(
        &mut rules,
        r"\b(?:open|show|view)\s+order\s+#?([\w-]+)",
        |caps, catalog| {
            let mut plan = auth_preamble(catalog);
            if let Some(id) = capture(caps, 1) {
                plan.push(open_order(id));
            }
            plan
        },
    );
    builtin(
        &mut rules,
        r"\b(?:list|show)\s+(?:all\s+|my\s+)?orders\b",
        |_, catalog| {
            let mut plan = auth_preamble(catalog);
            plan.push(ActionStep::new("orders", "listOrders", vec![]).describe("List orders"));
            plan
        },
    );
    builtin(
        &mut rules,
        r"\b(?:log|sign)\s*in\b(?:\s+as\s+(\w+))?",
        |caps, _| {
            let args = capture(caps, 1).map(|u| vec![json!(u)]).unwrap_or_default();
            vec![ActionStep::new("auth", "login", args)
                .wait_for()
                .describe("Sign in")]
        },
    );
    builtin(
        &mut rules,
        r"\b(?:log|sign)\s*out\b",
        |_, _| vec![ActionStep::new("auth", "logout", vec![]).describe("Sign out")],
    );
    builtin(
        &mut rules,
        r"\b(?:show|open|view)\s+(?:the\s+)?(?:analytics|dashboard|stats)\b",
        |_, _| {
            vec![ActionStep::new("analytics", "showDashboard", vec![])
                .describe("Show the analytics dashboard")]
        },
    );
    builtin(
        &mut rules,
        r#"\btrack\s+(?:event\s+)?["']?([\w:.-]+)"#,
        |caps, _| {
            let name = capture(caps, 1).unwrap_or_default();
            vec![ActionStep::new("analytics", "trackEvent", vec![json!(name)])
                .describe(&format!("Track event {}", name))]
        },
    );

    sort_rules(&mut rules);
    rules
}
