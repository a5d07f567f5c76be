/// Policy checks run in front of every operation
pub mod gateway;
/// Bitfield role model
pub mod roles;
/// Composable field validators
pub mod validator;
