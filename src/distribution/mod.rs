pub mod engine;
pub mod input;

pub use engine::{total_amount, DisbursementConfig, DisbursementEngine};
pub use input::{load_transfer_list, parse_transfer_list};
