//! # 广义随机 Petri 网（GSPN）核心定义
//!
//! 设库所集合 `P` 与迁移集合 `T`，输入/输出映射 `Pre, Post ∈ ℕ^{|P|×|T|}`，
//! 抑制弧阈值 `Inh ∈ ℕ^{|P|×|T|}`（0 表示无弧）。每个迁移为瞬时迁移（带权重）
//! 或计时迁移（带指数速率）。
//!
//! 该模块即状态空间探索所消费的宿主模型：可激发集、发生、标识分类。
//!
//! ## 示例
//!
//! ```rust
//! use pn_statespace::net::*;
//!
//! let mut net = Net::empty();
//! let p0 = net.add_place(Place::new("p0", 1));
//! let p1 = net.add_place(Place::new("p1", 0));
//! let t0 = net.add_transition(Transition::timed("t0", 2.0));
//!
//! net.set_input_weight(p0, t0, 1);
//! net.set_output_weight(p1, t0, 1);
//!
//! let marking = net.initial_marking();
//! assert_eq!(net.enabled_transitions(&marking), vec![t0]);
//! let next = net.fire_transition(&marking, t0).unwrap();
//! assert_eq!(next.tokens(p0), 0);
//! assert_eq!(next.tokens(p1), 1);
//! ```

pub mod core;
pub mod ids;
pub mod incidence;
pub mod index_vec;
pub mod io;
pub mod structure;

pub use core::{DiagnosticReport, FireError, InvalidRate, Net};
pub use ids::{PlaceId, StateId, TransitionId};
pub use incidence::Incidence;
pub use index_vec::{Idx, IndexVec};
pub use structure::{Marking, Place, Transition, TransitionKind, Weight};
