use std::fmt;

use quarry_core::{Dialect, SqlError};
use thiserror::Error;

use crate::field_expression::FieldExpressionError;
use crate::relation::RelationExpressionError;

/// Where an `undefined` argument was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndefinedKind {
    /// A top level argument
    Argument,
    /// An item of an array argument
    Item,
    /// A property of an object argument
    Property,
}

impl fmt::Display for UndefinedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UndefinedKind::Argument => "argument",
            UndefinedKind::Item => "an item in argument",
            UndefinedKind::Property => "a property in argument",
        })
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    /// The SQL builder rejected a call
    #[error(transparent)]
    Sql(#[from] SqlError),

    /// Malformed `table.column:json.path` reference
    #[error(transparent)]
    FieldExpression(#[from] FieldExpressionError),

    /// Malformed or duplicate relation expression
    #[error(transparent)]
    RelationExpression(#[from] RelationExpressionError),

    #[error("unknown relation \"{relation}\" in a relation expression")]
    RelationDoesNotExist { relation: String },

    #[error("could not find a model class for table \"{table}\"")]
    ModelNotFound { table: String },

    #[error("invalid relation reference \"{reference}\"")]
    InvalidReference { reference: String },

    #[error(
        "undefined passed as {kind} #{index} for '{operation}' operation. Call skip_undefined() method to ignore the undefined values."
    )]
    UndefinedArgument {
        operation: String,
        index: usize,
        kind: UndefinedKind,
    },

    #[error("undefined was passed to {operation}")]
    UndefinedId { operation: String },

    #[error("batch insert only works with Postgresql and SQL Server (dialect is {dialect})")]
    BatchInsertUnsupported { dialect: Dialect },

    #[error("both cols and values must have same dimensions")]
    CompositeDimensions,

    #[error("invalid number of arguments {count}")]
    InvalidArgumentCount { count: usize },

    #[error("sqlite doesn't support multi-column where in clauses")]
    SqliteMultiColumnWhereIn,

    #[error("merge method can only be chained right after on_conflict method")]
    MergeWithoutOnConflict,

    #[error("invalid delegate: expected {expected}, got {found}")]
    InvalidDelegate {
        expected: &'static str,
        found: String,
    },

    #[error("one of the tables in {tables} must be the query's model class's table")]
    FromTableMismatch { tables: String },

    /// Postgres JSON operators got a right hand side they cannot use
    #[error("{0}")]
    JsonOperand(&'static str),

    #[error("cannot create a {table} model from {found}")]
    NotAModel { table: String, found: String },

    #[error("trying to set an invalid identifier for a {table} model")]
    InvalidId { table: String },

    /// The query has no connection to run on
    #[error("query for table \"{table}\" has no connection")]
    NoConnection { table: String },

    /// Raised by a model lifecycle hook
    #[error("hook error: {0}")]
    Hook(String),

    /// Raised by a connection implementation
    #[error("driver error: {0}")]
    Driver(String),

    #[cfg(feature = "rusqlite")]
    #[error(transparent)]
    Rusqlite(#[from] rusqlite::Error),
}

impl QueryError {
    pub(crate) fn undefined(operation: &str, index: usize, kind: UndefinedKind) -> Self {
        Self::UndefinedArgument {
            operation: operation.to_string(),
            index,
            kind,
        }
    }

    /// A copy of the error. Driver errors that cannot be cloned keep their
    /// message only.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Self::Sql(e) => Self::Sql(e.clone()),
            Self::FieldExpression(e) => Self::FieldExpression(e.clone()),
            Self::RelationExpression(e) => Self::RelationExpression(e.clone()),
            Self::RelationDoesNotExist { relation } => Self::RelationDoesNotExist {
                relation: relation.clone(),
            },
            Self::ModelNotFound { table } => Self::ModelNotFound {
                table: table.clone(),
            },
            Self::InvalidReference { reference } => Self::InvalidReference {
                reference: reference.clone(),
            },
            Self::UndefinedArgument {
                operation,
                index,
                kind,
            } => Self::UndefinedArgument {
                operation: operation.clone(),
                index: *index,
                kind: *kind,
            },
            Self::UndefinedId { operation } => Self::UndefinedId {
                operation: operation.clone(),
            },
            Self::BatchInsertUnsupported { dialect } => {
                Self::BatchInsertUnsupported { dialect: *dialect }
            }
            Self::CompositeDimensions => Self::CompositeDimensions,
            Self::InvalidArgumentCount { count } => Self::InvalidArgumentCount { count: *count },
            Self::SqliteMultiColumnWhereIn => Self::SqliteMultiColumnWhereIn,
            Self::MergeWithoutOnConflict => Self::MergeWithoutOnConflict,
            Self::InvalidDelegate { expected, found } => Self::InvalidDelegate {
                expected,
                found: found.clone(),
            },
            Self::FromTableMismatch { tables } => Self::FromTableMismatch {
                tables: tables.clone(),
            },
            Self::JsonOperand(message) => Self::JsonOperand(message),
            Self::NotAModel { table, found } => Self::NotAModel {
                table: table.clone(),
                found: found.clone(),
            },
            Self::InvalidId { table } => Self::InvalidId {
                table: table.clone(),
            },
            Self::NoConnection { table } => Self::NoConnection {
                table: table.clone(),
            },
            Self::Hook(message) => Self::Hook(message.clone()),
            Self::Driver(message) => Self::Driver(message.clone()),
            #[cfg(feature = "rusqlite")]
            Self::Rusqlite(e) => Self::Driver(e.to_string()),
        }
    }
}

/// Result type for ORM level operations
pub type Result<T> = std::result::Result<T, QueryError>;
