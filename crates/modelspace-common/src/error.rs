//! Error taxonomy of the engine.
//!
//! - **`ModelError`** : one variant per failure condition, with payload
//! - **`ErrorKind`**  : the fieldless discriminant, handy for matching
//!
//! Entities inside errors are rendered labels (`Space1.foo(1, 2)`) rather
//! than identifiers, so an error stays meaningful after the entity it names
//! has been deleted.

use thiserror::Error;

/// Fieldless classification of a [`ModelError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    CircularReference,
    FormulaExecution,
    NoneReturned,
    DeepReference,
    NameNotFound,
    InheritanceConflict,
    OverriddenInput,
    UnhashableArgument,
    DeletedObject,
    Raised,
    InvalidArguments,
    ReadOnlySpace,
    DuplicateName,
    DerivedMember,
    CyclicInheritance,
    Persistence,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// A node was requested while already being evaluated. `cycle` lists the
    /// call stack from the repeated node to the top.
    #[error("circular reference detected: {}", .cycle.join(" -> "))]
    CircularReference { cycle: Vec<String> },

    /// A formula body failed. `trace` is the call stack, outermost first, at
    /// the point of failure.
    #[error("error in formula: {cause}\nformula traceback:\n{}", render_trace(.trace))]
    FormulaExecution {
        #[source]
        cause: Box<ModelError>,
        trace: Vec<String>,
    },

    #[error("{node} returned None")]
    NoneReturned { node: String },

    #[error("formula chain too deep: depth {depth} exceeds the limit of {max}")]
    DeepReference { depth: usize, max: usize },

    #[error("name '{name}' is not defined in {scope}")]
    NameNotFound { name: String, scope: String },

    #[error("cannot inherit '{name}' into {space}: {reason}")]
    InheritanceConflict {
        name: String,
        space: String,
        reason: String,
    },

    #[error("{node} is an input and cannot be overwritten by a computed value")]
    OverriddenInput { node: String },

    #[error("unhashable argument: {detail}")]
    UnhashableArgument { detail: String },

    #[error("{what} has been deleted")]
    DeletedObject { what: String },

    /// A failure raised from inside a formula body.
    #[error("{message}")]
    Raised { message: String },

    #[error("invalid arguments for {target}: {detail}")]
    InvalidArguments { target: String, detail: String },

    #[error("{space} is a dynamic space and cannot be modified")]
    ReadOnlySpace { space: String },

    #[error("'{name}' already exists in {space}")]
    DuplicateName { name: String, space: String },

    #[error("'{name}' in {space} is inherited and cannot be changed this way")]
    DerivedMember { name: String, space: String },

    #[error("making {base} a base of {space} would create an inheritance cycle")]
    CyclicInheritance { space: String, base: String },

    #[error("snapshot error: {detail}")]
    Persistence { detail: String },
}

fn render_trace(trace: &[String]) -> String {
    trace
        .iter()
        .enumerate()
        .map(|(depth, frame)| format!("{depth}: {frame}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl ModelError {
    /// Failure raised by a formula body; the evaluator wraps it into
    /// [`ModelError::FormulaExecution`] together with the call stack.
    pub fn raised<S: Into<String>>(message: S) -> Self {
        ModelError::Raised {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::CircularReference { .. } => ErrorKind::CircularReference,
            ModelError::FormulaExecution { .. } => ErrorKind::FormulaExecution,
            ModelError::NoneReturned { .. } => ErrorKind::NoneReturned,
            ModelError::DeepReference { .. } => ErrorKind::DeepReference,
            ModelError::NameNotFound { .. } => ErrorKind::NameNotFound,
            ModelError::InheritanceConflict { .. } => ErrorKind::InheritanceConflict,
            ModelError::OverriddenInput { .. } => ErrorKind::OverriddenInput,
            ModelError::UnhashableArgument { .. } => ErrorKind::UnhashableArgument,
            ModelError::DeletedObject { .. } => ErrorKind::DeletedObject,
            ModelError::Raised { .. } => ErrorKind::Raised,
            ModelError::InvalidArguments { .. } => ErrorKind::InvalidArguments,
            ModelError::ReadOnlySpace { .. } => ErrorKind::ReadOnlySpace,
            ModelError::DuplicateName { .. } => ErrorKind::DuplicateName,
            ModelError::DerivedMember { .. } => ErrorKind::DerivedMember,
            ModelError::CyclicInheritance { .. } => ErrorKind::CyclicInheritance,
            ModelError::Persistence { .. } => ErrorKind::Persistence,
        }
    }

    /// The innermost failure, looking through formula-execution wrappers.
    pub fn root_cause(&self) -> &ModelError {
        match self {
            ModelError::FormulaExecution { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Errors that unwind the call stack unchanged instead of being wrapped
    /// at every formula boundary.
    pub fn passes_through_formulas(&self) -> bool {
        matches!(
            self,
            ModelError::CircularReference { .. }
                | ModelError::FormulaExecution { .. }
                | ModelError::DeepReference { .. }
                | ModelError::NoneReturned { .. }
        )
    }
}
