//! 服务模块

pub mod handlers;
pub mod intent;
pub mod resolver;
pub mod session;

pub use handlers::{CalendarConverter, SpecialHandler, SpecialRouter};
pub use intent::{
    FieldHint, Intent, IntentClassifier, IntentDecision, LlmIntentClassifier,
    create_intent_classifier, heuristic_classify,
};
pub use resolver::{HybridContextResolver, ResolvedContext, create_context_resolver};
pub use session::{SessionRegistry, SessionState, spawn_idle_sweeper};
