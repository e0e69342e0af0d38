// 工具模块 - 签名和交易对转换
pub mod signature;
pub mod symbol;

pub use signature::*;
pub use symbol::*;
