//! Error taxonomy shared by the API wrapper, the handlers and the dispatcher
//!
//! The display form of [`HandlerError`] is what CloudFormation shows as the
//! FAILED reason, so every variant starts with a stable kind label.

use crate::organizations::ApiError;
use std::fmt;
use thiserror::Error;

/// Internal classification of provider faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    DependencyViolation,
    InvalidInput,
    Throttled,
    Unknown,
}

impl ErrorKind {
    /// Classify an AWS Organizations error code
    pub fn from_code(code: &str) -> Self {
        match code {
            "PolicyNotFoundException"
            | "OrganizationalUnitNotFoundException"
            | "TargetNotFoundException"
            | "AccountNotFoundException"
            | "ParentNotFoundException"
            | "ChildNotFoundException"
            | "RootNotFoundException"
            | "PolicyNotAttachedException"
            | "SourceParentNotFoundException"
            | "DestinationParentNotFoundException" => ErrorKind::NotFound,

            "DuplicatePolicyAttachmentException"
            | "DuplicatePolicyException"
            | "DuplicateOrganizationalUnitException"
            | "DuplicateAccountException" => ErrorKind::AlreadyExists,

            "OrganizationalUnitNotEmptyException" | "PolicyInUseException" => {
                ErrorKind::DependencyViolation
            }

            "InvalidInputException"
            | "MalformedPolicyDocumentException"
            | "ConstraintViolationException"
            | "PolicyTypeNotEnabledException"
            | "PolicyTypeNotAvailableForOrganizationException"
            | "PolicyChangesInProgressException" => ErrorKind::InvalidInput,

            "TooManyRequestsException"
            | "ThrottlingException"
            | "ConcurrentModificationException"
            | "ServiceException" => ErrorKind::Throttled,

            _ => ErrorKind::Unknown,
        }
    }

    /// Label used as the prefix of FAILED reasons
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::AlreadyExists => "AlreadyExistsError",
            ErrorKind::DependencyViolation => "DependencyViolation",
            ErrorKind::InvalidInput => "InvalidInputError",
            ErrorKind::Throttled => "ThrottledError",
            ErrorKind::Unknown => "UnknownError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Failure of a resource handler; converted into a FAILED response by the dispatcher
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Missing or malformed event field or resource property
    #[error("ValidationError: {0}")]
    Validation(String),

    /// Live dependants block the operation (e.g. accounts inside an OU)
    #[error("DependencyViolation: {0}")]
    DependencyViolation(String),

    #[error("{}: {}", .0.kind, .0)]
    Api(#[from] ApiError),

    /// Anything the handlers did not anticipate
    #[error("UnknownError: {0}")]
    Unknown(String),
}

impl HandlerError {
    pub fn validation(message: impl Into<String>) -> Self {
        HandlerError::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            HandlerError::Validation(_) => ErrorKind::InvalidInput,
            HandlerError::DependencyViolation(_) => ErrorKind::DependencyViolation,
            HandlerError::Api(err) => err.kind,
            HandlerError::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        HandlerError::Unknown(format!("{:#}", err))
    }
}
