pub mod book;
pub mod slippage;
pub mod types;
