mod datatype;
pub use datatype::*;

mod event;
pub use event::*;

mod entity;
pub use entity::*;

pub mod trigger;
pub use trigger::{
    BinaryOp, Image, LogicalOp, Trigger, TriggerError, TriggerExpr, TriggerSpec, UnaryOp,
};

mod consumer;
pub use consumer::*;

mod registry;
pub use registry::*;

mod unit_of_work;
pub use unit_of_work::*;

mod dispatch;
pub use dispatch::*;

mod poller;
pub use poller::*;

mod utils;
