//! Translation of adapter failures into domain errors.
//!
//! Connection failures surface as `service_unavailable`; every other adapter
//! fault is an `internal_error`.

use super::Error;
use super::ports::{
    AccessRepositoryError, DirectoryError, IssueRepositoryError,
    NotificationPreferencesRepositoryError, NotificationRepositoryError, WatcherRepositoryError,
};

pub(crate) fn map_access_error(error: AccessRepositoryError) -> Error {
    match error {
        AccessRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("access repository unavailable: {message}"))
        }
        AccessRepositoryError::Query { message } => {
            Error::internal(format!("access repository error: {message}"))
        }
    }
}

pub(crate) fn map_issue_error(error: IssueRepositoryError) -> Error {
    match error {
        IssueRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("issue repository unavailable: {message}"))
        }
        IssueRepositoryError::Query { message } | IssueRepositoryError::Missing { message } => {
            Error::internal(format!("issue repository error: {message}"))
        }
    }
}

pub(crate) fn map_directory_error(error: DirectoryError) -> Error {
    match error {
        DirectoryError::Connection { message } => {
            Error::service_unavailable(format!("directory unavailable: {message}"))
        }
        DirectoryError::Query { message } => Error::internal(format!("directory error: {message}")),
    }
}

pub(crate) fn map_watcher_error(error: WatcherRepositoryError) -> Error {
    match error {
        WatcherRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("watcher repository unavailable: {message}"))
        }
        WatcherRepositoryError::Query { message } => {
            Error::internal(format!("watcher repository error: {message}"))
        }
    }
}

pub(crate) fn map_preferences_error(error: NotificationPreferencesRepositoryError) -> Error {
    match error {
        NotificationPreferencesRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("preferences repository unavailable: {message}"))
        }
        NotificationPreferencesRepositoryError::Query { message } => {
            Error::internal(format!("preferences repository error: {message}"))
        }
    }
}

pub(crate) fn map_notification_error(error: NotificationRepositoryError) -> Error {
    match error {
        NotificationRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("notification repository unavailable: {message}"))
        }
        NotificationRepositoryError::Query { message } => {
            Error::internal(format!("notification repository error: {message}"))
        }
    }
}
