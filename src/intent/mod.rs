//! Natural-language intent bridge
//!
//! Converts free-text commands into ordered cross-module call plans and
//! executes them through the module manager.

pub mod bridge;
pub mod model;
pub mod rules;

pub use bridge::{describe_plan, ActionResult, IntentBridge, IntentResult};
pub use model::{parse_action_list, IntentModel};
pub use rules::{default_rules, ActionPlan, ActionStep, CatalogView, IntentRule, RuleHandler};
