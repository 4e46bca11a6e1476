//! Domain model (cells, header, status, tokens, errors).

pub mod cell;
pub mod errors;
pub mod header;
pub mod ids;
pub mod status;
pub mod task;
pub mod token;

pub use cell::{CellRef, RangeSpec};
pub use errors::{ClaimError, StoreError};
pub use header::{HeaderError, HeaderLayout};
pub use ids::NodeId;
pub use status::Status;
pub use task::{ClaimedTask, NodeRole, TaskConfig};
pub use token::{Token, TokenError};
