pub mod invoker;
pub mod limiter;
pub mod model;
