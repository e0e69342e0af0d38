pub mod core;
pub mod exchanges;
pub mod utils;

// 选择性导出，避免命名冲突
pub use crate::core::{config::*, error::*, exchange::*, types::*};
pub use exchanges::{create_exchange, create_exchange_from_config};
pub use utils::symbol::{SymbolRegistry, SymbolStyle};
