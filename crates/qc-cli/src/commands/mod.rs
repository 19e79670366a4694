pub mod check;
pub mod coordinate;
pub mod dispatch;
pub mod gate;
pub mod preprocess;
pub mod schedule;
pub mod schema;
pub mod shared;
