pub mod assessment;
pub mod query;
pub mod test_type;
