//! Rule abstractions.
//!
//! An activity rule maps a node's context to its next activity. Rules are
//! shared (`&self`) so the activity pass can fan out across threads; a rule
//! that keeps hidden state says so through [`ActivityRule::is_stateless`], and
//! the driver refuses to run it under any strategy other than the plain
//! sequential pass.

use std::fmt;

use crate::context::{ConnectivityContext, NodeContext, PerturbationContext};
use crate::error::EngineResult;
use crate::topology::ConnectivityMap;

/// A per-node activity update.
pub trait ActivityRule<A, I>: Send + Sync {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> &str {
        "activity_rule"
    }

    /// Whether the rule is a pure function of its context.
    ///
    /// Rules returning `false` depend on being visited in the sequential
    /// order and cannot be used with shuffled or parallel execution.
    fn is_stateless(&self) -> bool {
        true
    }

    /// Compute the next activity of the context's node.
    fn apply(&self, ctx: &mut NodeContext<'_, A, I>) -> EngineResult<A>;
}

/// Adapter turning a closure into an [`ActivityRule`].
pub struct FnRule<F> {
    name: String,
    f: F,
}

impl<F> FnRule<F> {
    /// Wrap a closure under a name.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<A, I, F> ActivityRule<A, I> for FnRule<F>
where
    F: Fn(&mut NodeContext<'_, A, I>) -> EngineResult<A> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, ctx: &mut NodeContext<'_, A, I>) -> EngineResult<A> {
        (self.f)(ctx)
    }
}

impl<F> fmt::Debug for FnRule<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRule").field("name", &self.name).finish()
    }
}

/// Wrap a closure as an activity rule.
pub fn activity_fn<A, I, F>(f: F) -> FnRule<F>
where
    F: Fn(&mut NodeContext<'_, A, I>) -> EngineResult<A> + Send + Sync,
{
    FnRule::new("activity_fn", f)
}

/// Rewrites the topology once per timestep; the update order places it before
/// or after the activity pass.
pub type ConnectivityRule<A> =
    Box<dyn for<'a> FnMut(ConnectivityContext<'a, A>) -> EngineResult<ConnectivityMap> + Send>;

/// Adjusts a freshly computed activity.
pub type Perturbation<A, I> =
    Box<dyn for<'a> FnMut(PerturbationContext<'a, A, I>) -> EngineResult<A> + Send>;

/// Leaves every activity unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityRule;

impl<A: Clone, I> ActivityRule<A, I> for IdentityRule {
    fn name(&self) -> &str {
        "identity"
    }

    fn apply(&self, ctx: &mut NodeContext<'_, A, I>) -> EngineResult<A> {
        Ok(ctx.current_activity().clone())
    }
}
