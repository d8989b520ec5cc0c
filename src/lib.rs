//! 随机 Petri 网（GSPN）可达状态空间生成器。
//!
//! 从初始标识出发枚举全部可达标识，按瞬时变迁是否使能将其分为有形 / 消失两类，
//! 为每个状态输出一条聚合速率的后继记录，并以紧凑二进制流持久化。
pub mod analysis;
pub mod config;
pub mod net;
pub mod options;
pub mod state_io;
