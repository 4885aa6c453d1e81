//! Sync Error Taxonomy
//!
//! Two-tier error model driving all engine control flow: [`Fatal`] errors
//! abort the current run, [`NonFatal`] errors are accumulated and only ever
//! narrow the remaining plan. Transport failures are normalized by HTTP
//! status before classification.

use bridge_traits::api::ApiError;
use bridge_traits::data::LibraryIdentifier;
use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Diagnostic payload attached to errors: the affected keys and library,
/// used for logging and for building retry scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorData {
    pub item_keys: Option<Vec<String>>,
    pub library_id: Option<LibraryIdentifier>,
}

impl ErrorData {
    pub fn for_library(library_id: LibraryIdentifier) -> Self {
        Self {
            item_keys: None,
            library_id: Some(library_id),
        }
    }

    pub fn for_keys(library_id: LibraryIdentifier, keys: Vec<String>) -> Self {
        Self {
            item_keys: Some(keys),
            library_id: Some(library_id),
        }
    }
}

/// Errors that abort the current run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Fatal {
    #[error("no internet connection")]
    NoInternetConnection,

    #[error("API error: {message}")]
    ApiError { message: String, data: ErrorData },

    #[error("database error: {0}")]
    DbError(String),

    #[error("group sync failed")]
    GroupSyncFailed,

    #[error("could not load library data")]
    AllLibrariesFetchFailed,

    #[error("could not load key permissions")]
    PermissionLoadingFailed,

    #[error("missing permissions for group")]
    MissingGroupPermissions,

    #[error("write submission conflicted with remote object state")]
    UploadObjectConflict(ErrorData),

    #[error("attachment item not submitted")]
    CantSubmitAttachmentItem(ErrorData),

    #[error("access forbidden")]
    Forbidden,

    #[error("service unavailable")]
    ServiceUnavailable,

    #[error("cancelled")]
    Cancelled,
}

/// Errors that are recorded while the run continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NonFatal {
    #[error("version mismatch for {0}")]
    VersionMismatch(LibraryIdentifier),

    #[error("precondition failed for {0}")]
    PreconditionFailed(LibraryIdentifier),

    #[error("remote data unchanged")]
    Unchanged,

    #[error("storage quota reached for {0}")]
    QuotaLimit(LibraryIdentifier),

    #[error("insufficient storage space")]
    InsufficientSpace { library_id: Option<LibraryIdentifier> },

    #[error("schema error: {0}")]
    SchemaError(String),

    #[error("parsing error: {message}")]
    ParsingError {
        message: String,
        library_id: Option<LibraryIdentifier>,
    },

    #[error("attachment file missing for {key}")]
    AttachmentMissing {
        key: String,
        library_id: LibraryIdentifier,
        title: String,
    },

    #[error("annotation was split during submission")]
    AnnotationDidSplit {
        keys: Vec<String>,
        library_id: LibraryIdentifier,
    },

    #[error("deleted {count} files from WebDAV storage")]
    WebDavDeletion { count: usize, library: String },

    #[error("WebDAV deletion failed: {error}")]
    WebDavDeletionFailed { error: String, library: String },

    #[error("API error: {message}")]
    ApiError { message: String, data: ErrorData },

    #[error("unknown error: {message}")]
    Unknown { message: String, data: ErrorData },
}

impl NonFatal {
    /// Library this error narrows the plan for, when it has one.
    pub fn library_id(&self) -> Option<LibraryIdentifier> {
        match self {
            Self::VersionMismatch(id) | Self::PreconditionFailed(id) | Self::QuotaLimit(id) => {
                Some(*id)
            }
            Self::AttachmentMissing { library_id, .. }
            | Self::AnnotationDidSplit { library_id, .. } => Some(*library_id),
            Self::InsufficientSpace { library_id } => *library_id,
            Self::ParsingError { library_id, .. } => *library_id,
            Self::ApiError { data, .. } | Self::Unknown { data, .. } => data.library_id,
            _ => None,
        }
    }

    /// Whether this error makes the remaining plan for its library stale.
    pub fn invalidates_library_plan(&self) -> bool {
        matches!(self, Self::VersionMismatch(_) | Self::PreconditionFailed(_))
    }
}

/// Two-tier sync error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error(transparent)]
    Fatal(#[from] Fatal),

    #[error(transparent)]
    NonFatal(#[from] NonFatal),
}

impl SyncError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Normalize a transport failure by HTTP status.
    ///
    /// 304 unchanged, 403 forbidden, 412 precondition failed, 413 quota
    /// limit, 503 service unavailable, 507 insufficient space; remaining
    /// 4xx are fatal API errors, anything else is a non-fatal API error.
    pub fn from_api_error(
        error: &ApiError,
        library_id: Option<LibraryIdentifier>,
        data: ErrorData,
    ) -> Self {
        match error {
            ApiError::NoNetwork => Fatal::NoInternetConnection.into(),
            ApiError::Status { code, response } => match (*code, library_id) {
                (304, _) => NonFatal::Unchanged.into(),
                (403, _) => Fatal::Forbidden.into(),
                (412, Some(id)) => NonFatal::PreconditionFailed(id).into(),
                (413, Some(id)) => NonFatal::QuotaLimit(id).into(),
                (503, _) => Fatal::ServiceUnavailable.into(),
                (507, id) => NonFatal::InsufficientSpace { library_id: id }.into(),
                (code, _) if (400..500).contains(&code) => Fatal::ApiError {
                    message: format!("status {}: {}", code, response),
                    data,
                }
                .into(),
                (code, _) => NonFatal::ApiError {
                    message: format!("status {}: {}", code, response),
                    data,
                }
                .into(),
            },
            ApiError::Transport(message) | ApiError::UnexpectedResponse(message) => {
                NonFatal::ApiError {
                    message: message.clone(),
                    data,
                }
                .into()
            }
        }
    }
}

impl From<BridgeError> for SyncError {
    fn from(error: BridgeError) -> Self {
        Fatal::DbError(error.to_string()).into()
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ApiError {
        ApiError::Status {
            code,
            response: String::new(),
        }
    }

    #[test]
    fn test_no_network_is_fatal() {
        let err = SyncError::from_api_error(&ApiError::NoNetwork, None, ErrorData::default());
        assert_eq!(err, SyncError::Fatal(Fatal::NoInternetConnection));
    }

    #[test]
    fn test_status_classification() {
        let lib = LibraryIdentifier::Group(9);
        let data = ErrorData::default();

        assert_eq!(
            SyncError::from_api_error(&status(304), Some(lib), data.clone()),
            SyncError::NonFatal(NonFatal::Unchanged)
        );
        assert_eq!(
            SyncError::from_api_error(&status(403), Some(lib), data.clone()),
            SyncError::Fatal(Fatal::Forbidden)
        );
        assert_eq!(
            SyncError::from_api_error(&status(412), Some(lib), data.clone()),
            SyncError::NonFatal(NonFatal::PreconditionFailed(lib))
        );
        assert_eq!(
            SyncError::from_api_error(&status(413), Some(lib), data.clone()),
            SyncError::NonFatal(NonFatal::QuotaLimit(lib))
        );
        assert_eq!(
            SyncError::from_api_error(&status(503), Some(lib), data.clone()),
            SyncError::Fatal(Fatal::ServiceUnavailable)
        );
        assert_eq!(
            SyncError::from_api_error(&status(507), Some(lib), data.clone()),
            SyncError::NonFatal(NonFatal::InsufficientSpace {
                library_id: Some(lib)
            })
        );

        // Remaining 4xx are fatal, other statuses are non-fatal.
        assert!(SyncError::from_api_error(&status(404), Some(lib), data.clone()).is_fatal());
        assert!(!SyncError::from_api_error(&status(500), Some(lib), data).is_fatal());
    }

    #[test]
    fn test_transport_error_is_non_fatal() {
        let err = SyncError::from_api_error(
            &ApiError::Transport("connection reset".to_string()),
            None,
            ErrorData::default(),
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_non_fatal_library_scope() {
        let lib = LibraryIdentifier::Custom;
        assert_eq!(NonFatal::VersionMismatch(lib).library_id(), Some(lib));
        assert_eq!(NonFatal::PreconditionFailed(lib).library_id(), Some(lib));
        assert_eq!(NonFatal::Unchanged.library_id(), None);

        assert!(NonFatal::VersionMismatch(lib).invalidates_library_plan());
        assert!(NonFatal::PreconditionFailed(lib).invalidates_library_plan());
        assert!(!NonFatal::QuotaLimit(lib).invalidates_library_plan());
    }

    #[test]
    fn test_bridge_error_maps_to_db_fatal() {
        let err: SyncError = BridgeError::StoreError("disk full".to_string()).into();
        assert!(matches!(err, SyncError::Fatal(Fatal::DbError(_))));
    }
}
