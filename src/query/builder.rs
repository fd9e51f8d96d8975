//! Fluent query construction
//!
//! Mistakes are collected rather than short-circuited, so one `build()`
//! reports every error in the chain.

use std::sync::Arc;

use super::ast::{Condition, Conditions, OnIteration, Query, SortKey};
use super::comparator::FieldComparator;
use super::errors::{BuildError, BuildErrors};

/// Builds a [`Query`]
pub struct QueryBuilder<R> {
    conditions: Vec<Condition<R>>,
    /// One entry per open bracket: true while it holds nothing
    brackets: Vec<bool>,
    pending_or: bool,
    pending_not: bool,
    pending_opens: usize,
    /// A condition or closed bracket directly precedes the cursor
    after_element: bool,
    sort: Vec<SortKey<R>>,
    limit: Option<usize>,
    offset: usize,
    on_iteration: Option<OnIteration<R>>,
    errors: Vec<BuildError>,
}

impl<R: 'static> Default for QueryBuilder<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: 'static> QueryBuilder<R> {
    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
            brackets: Vec::new(),
            pending_or: false,
            pending_not: false,
            pending_opens: 0,
            after_element: false,
            sort: Vec::new(),
            limit: None,
            offset: 0,
            on_iteration: None,
            errors: Vec::new(),
        }
    }

    /// Adds a condition, joined by AND unless `or()` preceded it
    pub fn filter<C: FieldComparator<R> + 'static>(self, comparator: C) -> Self {
        self.filter_shared(Arc::new(comparator))
    }

    /// Adds an already shared comparator
    pub fn filter_shared(mut self, comparator: Arc<dyn FieldComparator<R>>) -> Self {
        self.conditions.push(Condition {
            comparator,
            negate: self.pending_not,
            or: self.pending_or,
            depth: self.brackets.len() + 1,
            opens: self.pending_opens,
        });
        for empty in self.brackets.iter_mut() {
            *empty = false;
        }
        self.pending_not = false;
        self.pending_or = false;
        self.pending_opens = 0;
        self.after_element = true;
        self
    }

    /// Same as `filter`; reads better mid-chain
    pub fn and<C: FieldComparator<R> + 'static>(self, comparator: C) -> Self {
        self.filter(comparator)
    }

    /// Joins the next condition or bracket by OR
    pub fn or(mut self) -> Self {
        if !self.after_element {
            self.errors.push(BuildError::OrWithoutPrecedingCondition);
        }
        self.pending_or = true;
        self.after_element = false;
        self
    }

    /// Negates the next condition
    pub fn not(mut self) -> Self {
        self.pending_not = true;
        self
    }

    pub fn open_bracket(mut self) -> Self {
        if self.pending_not {
            self.errors.push(BuildError::NotBeforeOpenBracket);
            self.pending_not = false;
        }
        self.brackets.push(true);
        self.pending_opens += 1;
        self.after_element = false;
        self
    }

    pub fn close_bracket(mut self) -> Self {
        let Some(empty) = self.brackets.pop() else {
            self.errors.push(BuildError::UnbalancedCloseBracket);
            return self;
        };

        if self.pending_or {
            self.errors.push(BuildError::DanglingOr);
            self.pending_or = false;
        }
        if self.pending_not {
            self.errors.push(BuildError::DanglingNot);
            self.pending_not = false;
        }
        if empty {
            self.errors.push(BuildError::EmptyBrackets);
            self.pending_opens = self.pending_opens.saturating_sub(1);
        }
        self.after_element = true;
        self
    }

    /// Appends a sort key; earlier keys take precedence
    pub fn sort(mut self, key: SortKey<R>) -> Self {
        self.sort.push(key);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Invoked once for every matching record, before pagination
    pub fn on_iteration(mut self, callback: impl Fn(&R) + Send + Sync + 'static) -> Self {
        self.on_iteration = Some(Arc::new(callback));
        self
    }

    /// Runs a domain-specific building step
    pub fn apply(self, step: impl FnOnce(Self) -> Self) -> Self {
        step(self)
    }

    pub fn build(mut self) -> Query<R> {
        if self.pending_or {
            self.errors.push(BuildError::DanglingOr);
        }
        if self.pending_not {
            self.errors.push(BuildError::DanglingNot);
        }
        if !self.brackets.is_empty() {
            self.errors
                .push(BuildError::UnclosedBrackets(self.brackets.len()));
        }

        let error = if self.errors.is_empty() {
            None
        } else {
            Some(BuildErrors::new(self.errors))
        };

        Query {
            conditions: Arc::new(Conditions::new(self.conditions)),
            sort: self.sort.into(),
            limit: self.limit,
            offset: self.offset,
            on_iteration: self.on_iteration,
            error,
        }
    }
}

impl<R: 'static> Query<R> {
    pub fn builder() -> QueryBuilder<R> {
        QueryBuilder::new()
    }

    /// Matches every record, no sort, no pagination
    pub fn all() -> Self {
        QueryBuilder::new().build()
    }
}
