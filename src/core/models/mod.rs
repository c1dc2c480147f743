pub mod cost;
pub mod instance;
pub mod rates;
pub mod status;
