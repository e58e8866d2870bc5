pub mod sql;
pub mod tenant;

pub use sql::Record;
pub use tenant::Tenant;
