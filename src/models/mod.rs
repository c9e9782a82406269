pub mod history;
pub mod process;
pub mod quota;

pub use history::{
    ChangeLog, CreditChange, CreditKind, Delta, HistoryEntry, ModelChange, ModelDelta,
    ModelRecord, QuotaSnapshot,
};
pub use process::{Connection, ProcessHandle, ProcessRecord};
pub use quota::{ModelQuota, UserInfo};
