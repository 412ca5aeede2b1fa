//! Admin command seam
//!
//! Every user-management operation is a single command document run
//! against the admin database. [`MongoAdmin`] sends it to a server;
//! [`InMemoryAdmin`] answers it from a simulated catalog.

mod memory;
mod mongo;

use async_trait::async_trait;
use bson::Document;

use crate::error::Result;

pub use memory::{is_builtin_role, InMemoryAdmin, BUILTIN_ROLES};
pub use mongo::MongoAdmin;

/// Runs admin commands against one database
#[async_trait]
pub trait AdminCommands: Send + Sync {
    /// The database commands run against (bare role names resolve here)
    fn database(&self) -> &str;

    /// Run one command. Server-side failures surface as
    /// [`ProvisionError::Command`](crate::error::ProvisionError::Command).
    async fn run_command(&self, command: Document) -> Result<Document>;
}

#[async_trait]
impl<T: AdminCommands + ?Sized> AdminCommands for std::sync::Arc<T> {
    fn database(&self) -> &str {
        (**self).database()
    }

    async fn run_command(&self, command: Document) -> Result<Document> {
        (**self).run_command(command).await
    }
}
