//! Bracket-fold evaluation of a flat condition list
//!
//! # Algorithm
//!
//! One left-to-right pass with a stack of frames, one per open bracket
//! (the bottom frame is the top-level expression). For each condition:
//!
//! 1. Close brackets: pop frames above `depth - opens`, folding each into
//!    its parent with the connective it opened under
//! 2. Open brackets: push `opens` frames; the outermost takes the
//!    condition's connective, the rest AND
//! 3. Skip the predicate when the frame is already decided under the
//!    incoming connective (AND with false, OR with true)
//! 4. Evaluate and combine left to right; there is no AND-over-OR precedence
//!
//! Remaining frames fold down at the end. No conditions means everything.
//!
//! The same pass runs over booleans for exact filtering and over candidate
//! sets for preselection; [`Fold`] supplies the accumulator semantics.

use std::fmt;

use super::ast::{Condition, Conditions};
use super::errors::ComparatorResult;

/// Boolean connective between adjacent elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

impl fmt::Display for Connective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connective::And => write!(f, "AND"),
            Connective::Or => write!(f, "OR"),
        }
    }
}

/// Accumulator semantics for one evaluation mode
pub trait Fold<R> {
    type Acc;
    type Error;

    /// Value of an empty expression
    fn everything(&self) -> Self::Acc;

    /// Evaluates one condition's predicate, negation included
    fn eval(&mut self, condition: &Condition<R>) -> Result<Self::Acc, Self::Error>;

    fn combine(&self, left: Self::Acc, connective: Connective, right: Self::Acc) -> Self::Acc;

    /// True when no right operand can change `acc` under `connective`
    fn decides(&self, acc: &Self::Acc, connective: Connective) -> bool;
}

struct Frame<A> {
    acc: Option<A>,
    connective: Connective,
    skip: bool,
}

impl<A> Frame<A> {
    fn root() -> Self {
        Self {
            acc: None,
            connective: Connective::And,
            skip: false,
        }
    }
}

fn merge<R, F: Fold<R>>(
    fold: &F,
    acc: Option<F::Acc>,
    connective: Connective,
    value: F::Acc,
) -> F::Acc {
    match acc {
        None => value,
        Some(left) => fold.combine(left, connective, value),
    }
}

fn close<R, F: Fold<R>>(fold: &F, stack: &mut Vec<Frame<F::Acc>>) {
    let Some(child) = stack.pop() else {
        return;
    };
    let Some(parent) = stack.last_mut() else {
        return;
    };
    if child.skip {
        return;
    }
    if let Some(value) = child.acc {
        parent.acc = Some(merge::<R, F>(fold, parent.acc.take(), child.connective, value));
    }
}

/// Folds `conditions` under `fold`
pub fn evaluate<R, F: Fold<R>>(
    conditions: &Conditions<R>,
    fold: &mut F,
) -> Result<F::Acc, F::Error> {
    let mut stack: Vec<Frame<F::Acc>> = vec![Frame::root()];

    for condition in conditions {
        let base = condition.depth.saturating_sub(condition.opens).max(1);
        while stack.len() > base {
            close::<R, F>(fold, &mut stack);
        }

        let mut connective = condition.connective();
        for k in 0..condition.opens {
            let opened = if k == 0 { connective } else { Connective::And };
            let skip = stack.last().is_some_and(|parent| {
                parent.skip
                    || parent
                        .acc
                        .as_ref()
                        .is_some_and(|acc| fold.decides(acc, opened))
            });
            stack.push(Frame {
                acc: None,
                connective: opened,
                skip,
            });
            connective = Connective::And;
        }

        let Some(frame) = stack.last_mut() else {
            break;
        };
        if frame.skip {
            continue;
        }
        if let Some(acc) = &frame.acc {
            if fold.decides(acc, connective) {
                continue;
            }
        }

        let value = fold.eval(condition)?;
        frame.acc = Some(merge::<R, F>(fold, frame.acc.take(), connective, value));
    }

    while stack.len() > 1 {
        close::<R, F>(fold, &mut stack);
    }

    Ok(stack
        .pop()
        .and_then(|frame| frame.acc)
        .unwrap_or_else(|| fold.everything()))
}

/// Exact boolean evaluation against one record
pub struct ExactFold<'a, R> {
    record: &'a R,
}

impl<'a, R> ExactFold<'a, R> {
    pub fn new(record: &'a R) -> Self {
        Self { record }
    }
}

impl<'a, R> Fold<R> for ExactFold<'a, R> {
    type Acc = bool;
    type Error = super::errors::ComparatorError;

    fn everything(&self) -> bool {
        true
    }

    fn eval(&mut self, condition: &Condition<R>) -> ComparatorResult<bool> {
        let matched = condition.comparator.compare(self.record)?;
        Ok(condition.negate ^ matched)
    }

    fn combine(&self, left: bool, connective: Connective, right: bool) -> bool {
        match connective {
            Connective::And => left && right,
            Connective::Or => left || right,
        }
    }

    fn decides(&self, acc: &bool, connective: Connective) -> bool {
        match connective {
            Connective::And => !*acc,
            Connective::Or => *acc,
        }
    }
}

/// True when `record` satisfies every condition
pub fn matches<R>(conditions: &Conditions<R>, record: &R) -> ComparatorResult<bool> {
    evaluate(conditions, &mut ExactFold::new(record))
}
