pub mod analyst;
pub mod company;
pub mod ratio;
