//! Ports onto the external machine catalogue and user directory.

use async_trait::async_trait;

use crate::domain::{Machine, MachineId, OrganizationId, UserContact, UserId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by catalogue and directory adapters.
    pub enum DirectoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "directory connection failed: {message}",
        /// Query failed during execution.
        Query { message: String } =>
            "directory query failed: {message}",
    }
}

/// Read access to machines, scoped by organization.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MachineRepository: Send + Sync {
    /// Machine `machine_id` within `organization_id`, if any.
    async fn find(
        &self,
        organization_id: &OrganizationId,
        machine_id: &MachineId,
    ) -> Result<Option<Machine>, DirectoryError>;
}

/// Read access to global user contact details.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Contacts for the given ids; unknown ids are omitted.
    async fn find_contacts(&self, user_ids: &[UserId]) -> Result<Vec<UserContact>, DirectoryError>;
}
