pub mod planner;
pub mod validator;

pub use planner::{OrderGroupPlan, OrderGroupPlanner};
pub use validator::{validate, ValidationError};
