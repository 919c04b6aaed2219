pub mod region;
pub mod shapes;
