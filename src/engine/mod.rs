//! The two engines that sit between the worker and the rendering surface.
//!
//! Both live on the assembly's foreground loop and are never shared across
//! threads; everything reaches them as loop events.

mod processing;
mod visualization;

pub use processing::{ProcessingEngine, Route};
pub use visualization::{PromptPhase, Resolver, Subscriber, SubscriptionId, VisualizationEngine};
