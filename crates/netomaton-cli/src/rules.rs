//! Built-in activity rules used by the CLI models.

use std::fmt;
use std::str::FromStr;

use netomaton_engine::{
    activity_fn, ActivityRule, EngineError, EngineResult, NodeContext, NodeLabel,
};

/// One Collatz step, `None` when `3n + 1` does not fit in a `u64`.
pub fn collatz_step(n: u64) -> Option<u64> {
    if n % 2 == 0 {
        Some(n / 2)
    } else {
        n.checked_mul(3).and_then(|m| m.checked_add(1))
    }
}

/// Next value of an elementary CA cell given its (left, centre, right) bits.
pub fn eca_bit(rule: u8, left: u8, centre: u8, right: u8) -> u8 {
    let pattern = ((left & 1) << 2) | ((centre & 1) << 1) | (right & 1);
    (rule >> pattern) & 1
}

/// Labels of the left and right ring neighbours of an integer-labelled cell.
fn ring_neighbours<A, I>(ctx: &NodeContext<'_, A, I>) -> EngineResult<(NodeLabel, NodeLabel)> {
    let n = ctx.activities().len() as u64;
    let i = ctx
        .node_label()
        .index()
        .ok_or_else(|| EngineError::rule(ctx.timestep(), "ring cells need integer labels"))?;
    Ok((
        NodeLabel::Index((i + n - 1) % n),
        NodeLabel::Index((i + 1) % n),
    ))
}

/// Elementary cellular automaton over `u8` cells on a ring.
pub fn elementary(rule: u8) -> impl ActivityRule<u8, ()> {
    activity_fn(move |ctx: &mut NodeContext<'_, u8, ()>| {
        let (left, right) = ring_neighbours(ctx)?;
        Ok(eca_bit(
            rule,
            *ctx.activity_of(&left)?,
            *ctx.current_activity(),
            *ctx.activity_of(&right)?,
        ))
    })
}

/// Rules selectable by name for `ntm run`, over numeric activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinRule {
    /// Keep the current activity.
    Identity,
    /// Most common neighbourhood activity; ties keep the current activity.
    Majority,
    /// `r * x * (1 - x)` with `r` the weight of the self-connection.
    Logistic,
    /// One Collatz step.
    Collatz,
    /// Elementary CA on a ring, cells read as `0` or `1`.
    Eca(u8),
}

impl FromStr for BuiltinRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identity" => Ok(Self::Identity),
            "majority" => Ok(Self::Majority),
            "logistic" => Ok(Self::Logistic),
            "collatz" => Ok(Self::Collatz),
            other => match other.strip_prefix("eca:") {
                Some(number) => number
                    .parse()
                    .map(Self::Eca)
                    .map_err(|_| format!("ECA rule number must be 0-255, got '{number}'")),
                None => Err(format!(
                    "unknown rule '{other}' (expected identity, majority, logistic, collatz or eca:<n>)"
                )),
            },
        }
    }
}

impl fmt::Display for BuiltinRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => f.write_str("identity"),
            Self::Majority => f.write_str("majority"),
            Self::Logistic => f.write_str("logistic"),
            Self::Collatz => f.write_str("collatz"),
            Self::Eca(n) => write!(f, "eca:{n}"),
        }
    }
}

fn majority(current: f64, neighbourhood: &[&f64]) -> f64 {
    let mut counts: Vec<(f64, usize)> = Vec::new();
    for value in neighbourhood {
        match counts.iter_mut().find(|(v, _)| v == *value) {
            Some((_, count)) => *count += 1,
            None => counts.push((**value, 1)),
        }
    }

    let Some(best) = counts.iter().map(|(_, c)| *c).max() else {
        return current;
    };
    let mut winners = counts.iter().filter(|(_, c)| *c == best);
    match (winners.next(), winners.next()) {
        (Some((value, _)), None) => *value,
        _ => current,
    }
}

impl<I> ActivityRule<f64, I> for BuiltinRule {
    fn name(&self) -> &str {
        match self {
            Self::Identity => "identity",
            Self::Majority => "majority",
            Self::Logistic => "logistic",
            Self::Collatz => "collatz",
            Self::Eca(_) => "eca",
        }
    }

    fn apply(&self, ctx: &mut NodeContext<'_, f64, I>) -> EngineResult<f64> {
        let current = *ctx.current_activity();
        match self {
            Self::Identity => Ok(current),
            Self::Majority => Ok(majority(current, ctx.neighbourhood_activities())),
            Self::Logistic => {
                let rate = ctx
                    .connection_states()
                    .get(ctx.node_label())
                    .and_then(|records| records.first())
                    .and_then(|record| record.weight())
                    .ok_or_else(|| {
                        EngineError::rule_at(
                            ctx.node_label().clone(),
                            ctx.timestep(),
                            "logistic rule needs a weighted self-connection",
                        )
                    })?;
                Ok(rate * current * (1.0 - current))
            }
            Self::Collatz => {
                if current < 1.0 || current.fract() != 0.0 {
                    return Err(EngineError::rule_at(
                        ctx.node_label().clone(),
                        ctx.timestep(),
                        format!("collatz rule needs a positive integer, got {current}"),
                    ));
                }
                collatz_step(current as u64)
                    .map(|next| next as f64)
                    .ok_or_else(|| {
                        EngineError::rule_at(
                            ctx.node_label().clone(),
                            ctx.timestep(),
                            format!("collatz step from {current} overflows"),
                        )
                    })
            }
            Self::Eca(rule) => {
                let bit = |v: f64| u8::from(v != 0.0);
                let (left, right) = ring_neighbours(ctx)?;
                let next = eca_bit(
                    *rule,
                    bit(*ctx.activity_of(&left)?),
                    bit(current),
                    bit(*ctx.activity_of(&right)?),
                );
                Ok(f64::from(next))
            }
        }
    }
}
