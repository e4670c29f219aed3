pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub mod prelude {
    pub use crate::db::models::audit::AuditLogEntry;
    pub use crate::db::models::member::{CardKind, Member, MemberId, ResetScope};
    pub use crate::db::models::speaker::{DailySelection, SpeakerHistoryEntry};

    pub use crate::db::memory::MemStore;
    pub use crate::db::postgres::PgStore;
    pub use crate::db::store::{Store, StoreError, StoreResult};
}
