pub mod dashboard;
pub mod edit;
pub mod history;
pub mod overview;
pub mod projection;
pub mod rules;
pub mod signing;
pub mod status;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;
