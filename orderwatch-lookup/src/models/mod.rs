//! Data models for the lookup pipeline

pub mod lookup_session;
pub mod order_record;
pub mod query;
pub mod result_set;

pub use lookup_session::{
    BatchFailure, FailureKind, LookupProgress, LookupSession, LookupState, StateTransition,
};
pub use order_record::{OrderRecord, RawRecord, ORDER_NUMBER, REMARK, STATUS_INTERFACED, SYSTEM_REF_ID};
pub use query::{FilterSpec, QueryRequest, SortDirection, SortSpec};
pub use result_set::ResultSet;
