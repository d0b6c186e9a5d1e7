//! Domain records persisted by the repository layer.

mod account;
mod credential;
mod outbox;

pub use account::{Account, AccountChanges, NewAccount, Role, RoleParseError};
pub use credential::{Credential, CredentialChange, SaltedHash};
pub use outbox::{ACCOUNT_AGGREGATE, AccountEvent, AccountPayload, OutboxEvent, TraceContext};
