//! 可达状态空间的探索：模型查询、消失标识处理、状态登记与生成主循环。
pub mod explorer;
pub mod explorer_utils;
pub mod registry;
pub mod state;
pub mod vanishing;

pub use explorer::{
    AbortFlag, ExplorationError, ExplorationMode, ExplorationStats, StateSpaceExplorer,
};
pub use explorer_utils::{
    CachingExplorerUtilities, ExplorerUtilities, ModelQueryError, NetExplorerUtilities, Successor,
};
pub use registry::{Discovery, StateRegistry};
pub use state::{ClassifiedState, Record, StateKind};
pub use vanishing::{
    EscapeDistribution, OnTheFlyVanishingExplorer, SimpleVanishingExplorer, VanishingExplorer,
    VanishingPolicy,
};
