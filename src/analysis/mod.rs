//! Control flow analysis over IR functions.
//!
//! - [`CfgView`] - adapts a [`crate::ir::Function`] to the generic graph traits
//! - [`LoopForest`] / [`LoopInfo`] - natural loops with preheaders, latches and exits
//! - [`detect_loops`] - back-edge based loop discovery on any rooted graph
//!
//! Analyses are snapshots: they borrow nothing from the function after construction and
//! must be recomputed once a pass changes the CFG.

pub mod cfg;

pub use cfg::{detect_loops, CfgView, LoopExit, LoopForest, LoopInfo, LoopType};
