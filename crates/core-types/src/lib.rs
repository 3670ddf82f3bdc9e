pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{
    AlgoId, AlgoRunStatus, OrderSide, OrderStatus, OrderType, PositionStatus, TickSource,
    TradeMode,
};
pub use error::CoreError;
pub use structs::{
    AlgoDayState, EventSeverity, Execution, MarketTick, Order, OrderRequest, Position,
    RiskLimits, SystemEvent, TradeIntent, Wallet,
};
